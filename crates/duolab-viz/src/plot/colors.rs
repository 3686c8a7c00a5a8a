//! Palette used by the comparison figure.

use image::Rgb;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
pub const BLACK: Rgb<u8> = Rgb([0, 0, 0]);
pub const GRAY: Rgb<u8> = Rgb([128, 128, 128]);
pub const LIGHT_GRAY: Rgb<u8> = Rgb([204, 204, 204]);
pub const GREEN: Rgb<u8> = Rgb([0, 128, 0]);

/// Ends of the RdBu colormap, used for class markers.
pub const RDBU_LOW: Rgb<u8> = Rgb([103, 0, 31]);
pub const RDBU_HIGH: Rgb<u8> = Rgb([5, 48, 97]);

/// Lighter RdBu stops, used for filled decision regions.
pub const RDBU_RED: Rgb<u8> = Rgb([178, 24, 43]);
pub const RDBU_BLUE: Rgb<u8> = Rgb([33, 102, 172]);

/// `alpha * src + (1 - alpha) * dst` per channel.
pub fn blend(dst: Rgb<u8>, src: Rgb<u8>, alpha: f32) -> Rgb<u8> {
    let a = alpha.clamp(0.0, 1.0);
    let mix = |d: u8, s: u8| (a * s as f32 + (1.0 - a) * d as f32).round() as u8;
    Rgb([
        mix(dst.0[0], src.0[0]),
        mix(dst.0[1], src.0[1]),
        mix(dst.0[2], src.0[2]),
    ])
}
