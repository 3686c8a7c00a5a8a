//! Pixel-level drawing on an RGB image.

use image::{Rgb, RgbImage};

use super::colors::blend;
use super::font::{GLYPH_SPACING, GLYPH_WIDTH, glyph};

/// Pixel rectangle; `x`, `y` is the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i64 {
        self.x + self.width - 1
    }

    pub fn bottom(&self) -> i64 {
        self.y + self.height - 1
    }

    pub fn contains(&self, x: i64, y: i64) -> bool {
        x >= self.x && x <= self.right() && y >= self.y && y <= self.bottom()
    }
}

pub struct Canvas {
    img: RgbImage,
    clip: Option<Rect>,
}

impl Canvas {
    pub fn new(width: u32, height: u32, background: Rgb<u8>) -> Self {
        Self {
            img: RgbImage::from_pixel(width, height, background),
            clip: None,
        }
    }

    pub fn width(&self) -> u32 {
        self.img.width()
    }

    pub fn height(&self) -> u32 {
        self.img.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.img
    }

    pub fn into_image(self) -> RgbImage {
        self.img
    }

    /// Restricts drawing to `clip` until reset with `None`.
    pub fn set_clip(&mut self, clip: Option<Rect>) {
        self.clip = clip;
    }

    pub fn pixel(&self, x: u32, y: u32) -> Rgb<u8> {
        *self.img.get_pixel(x, y)
    }

    /// Alpha-blends `color` onto one pixel; out-of-bounds writes are dropped.
    pub fn blend_pixel(&mut self, x: i64, y: i64, color: Rgb<u8>, alpha: f32) {
        if x < 0 || y < 0 || x >= self.img.width() as i64 || y >= self.img.height() as i64 {
            return;
        }
        if let Some(clip) = self.clip {
            if !clip.contains(x, y) {
                return;
            }
        }
        let (x, y) = (x as u32, y as u32);
        let dst = *self.img.get_pixel(x, y);
        self.img.put_pixel(x, y, blend(dst, color, alpha));
    }

    pub fn put_pixel(&mut self, x: i64, y: i64, color: Rgb<u8>) {
        self.blend_pixel(x, y, color, 1.0);
    }

    pub fn fill_rect(&mut self, rect: Rect, color: Rgb<u8>, alpha: f32) {
        for y in rect.y..rect.y + rect.height {
            for x in rect.x..rect.x + rect.width {
                self.blend_pixel(x, y, color, alpha);
            }
        }
    }

    pub fn hline(&mut self, y: i64, x0: i64, x1: i64, color: Rgb<u8>) {
        let (start, end) = if x0 <= x1 { (x0, x1) } else { (x1, x0) };
        for x in start..=end {
            self.put_pixel(x, y, color);
        }
    }

    pub fn vline(&mut self, x: i64, y0: i64, y1: i64, color: Rgb<u8>) {
        let (start, end) = if y0 <= y1 { (y0, y1) } else { (y1, y0) };
        for y in start..=end {
            self.put_pixel(x, y, color);
        }
    }

    pub fn stroke_rect(&mut self, rect: Rect, color: Rgb<u8>) {
        self.hline(rect.y, rect.x, rect.right(), color);
        self.hline(rect.bottom(), rect.x, rect.right(), color);
        self.vline(rect.x, rect.y, rect.bottom(), color);
        self.vline(rect.right(), rect.y, rect.bottom(), color);
    }

    /// Bresenham line, `thickness` pixels wide.
    pub fn line(&mut self, from: (i64, i64), to: (i64, i64), color: Rgb<u8>, alpha: f32, thickness: i64) {
        let (mut x, mut y) = from;
        let dx = (to.0 - x).abs();
        let dy = -(to.1 - y).abs();
        let sx = if x < to.0 { 1 } else { -1 };
        let sy = if y < to.1 { 1 } else { -1 };
        let mut err = dx + dy;
        let half = thickness.max(1) / 2;
        let extra = (thickness.max(1) - 1) - half;

        loop {
            for oy in -half..=extra {
                for ox in -half..=extra {
                    self.blend_pixel(x + ox, y + oy, color, alpha);
                }
            }
            if x == to.0 && y == to.1 {
                break;
            }
            let e2 = 2 * err;
            if e2 >= dy {
                err += dy;
                x += sx;
            }
            if e2 <= dx {
                err += dx;
                y += sy;
            }
        }
    }

    /// Filled disc centered on a sub-pixel position.
    pub fn fill_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgb<u8>, alpha: f32) {
        let r2 = radius * radius;
        let (x0, x1) = ((cx - radius).floor() as i64, (cx + radius).ceil() as i64);
        let (y0, y1) = ((cy - radius).floor() as i64, (cy + radius).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
                if px * px + py * py <= r2 {
                    self.blend_pixel(x, y, color, alpha);
                }
            }
        }
    }

    /// One-pixel ring of the given radius.
    pub fn stroke_circle(&mut self, cx: f64, cy: f64, radius: f64, color: Rgb<u8>) {
        let (x0, x1) = ((cx - radius - 1.0).floor() as i64, (cx + radius + 1.0).ceil() as i64);
        let (y0, y1) = ((cy - radius - 1.0).floor() as i64, (cy + radius + 1.0).ceil() as i64);
        for y in y0..=y1 {
            for x in x0..=x1 {
                let (px, py) = (x as f64 + 0.5 - cx, y as f64 + 0.5 - cy);
                let d = (px * px + py * py).sqrt();
                if (d - radius).abs() <= 0.5 {
                    self.put_pixel(x, y, color);
                }
            }
        }
    }

    /// Draws `text` with its top-left corner at `(x, y)`.
    pub fn draw_text(&mut self, x: i64, y: i64, text: &str, scale: u32, color: Rgb<u8>) {
        let scale = scale.max(1) as i64;
        let advance = (GLYPH_WIDTH + GLYPH_SPACING) as i64 * scale;
        for (i, c) in text.chars().enumerate() {
            let gx = x + i as i64 * advance;
            for (row, bits) in glyph(c).iter().enumerate() {
                for col in 0..GLYPH_WIDTH as i64 {
                    if bits & (0x10 >> col) == 0 {
                        continue;
                    }
                    let px = gx + col * scale;
                    let py = y + row as i64 * scale;
                    self.fill_rect(Rect::new(px, py, scale, scale), color, 1.0);
                }
            }
        }
    }
}
