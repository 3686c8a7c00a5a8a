//! A single plotting panel mapping data coordinates onto a pixel rectangle.

use image::Rgb;
use ndarray::{Array2, ArrayView2};

use super::PlotError;
use super::canvas::{Canvas, Rect};
use super::colors::{BLACK, LIGHT_GRAY, WHITE};
use super::font::{text_height, text_width};
use crate::grid::Grid;

const TICK_LEN: i64 = 4;
const TARGET_TICKS: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    Circle,
    Cross,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerStyle {
    pub marker: Marker,
    /// Radius in pixels (half the arm length for crosses).
    pub size: f64,
    pub alpha: f32,
    /// Outline color, drawn opaque. Circles only.
    pub edge: Option<Rgb<u8>>,
}

impl Default for MarkerStyle {
    fn default() -> Self {
        Self {
            marker: Marker::Circle,
            size: 3.5,
            alpha: 1.0,
            edge: None,
        }
    }
}

pub struct Axes<'a> {
    canvas: &'a mut Canvas,
    rect: Rect,
    x_range: (f64, f64),
    y_range: (f64, f64),
}

impl<'a> Axes<'a> {
    pub(crate) fn new(canvas: &'a mut Canvas, rect: Rect, x_range: (f64, f64), y_range: (f64, f64)) -> Self {
        Self {
            canvas,
            rect,
            x_range,
            y_range,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }

    pub fn x_range(&self) -> (f64, f64) {
        self.x_range
    }

    pub fn y_range(&self) -> (f64, f64) {
        self.y_range
    }

    /// Data coordinates to (sub-)pixel coordinates; y grows upwards.
    pub fn to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        let w = (self.rect.width - 1) as f64;
        let h = (self.rect.height - 1) as f64;
        let px = self.rect.x as f64 + (x - x0) / (x1 - x0) * w;
        let py = self.rect.y as f64 + h - (y - y0) / (y1 - y0) * h;
        (px, py)
    }

    /// Pixel coordinates back to data coordinates.
    pub fn from_pixel(&self, px: i64, py: i64) -> (f64, f64) {
        let (x0, x1) = self.x_range;
        let (y0, y1) = self.y_range;
        let w = (self.rect.width - 1).max(1) as f64;
        let h = (self.rect.height - 1).max(1) as f64;
        let x = x0 + (px - self.rect.x) as f64 / w * (x1 - x0);
        let y = y0 + (self.rect.bottom() - py) as f64 / h * (y1 - y0);
        (x, y)
    }

    pub fn set_title(&mut self, title: &str) {
        let scale = 2;
        let width = text_width(title, scale) as i64;
        let x = self.rect.x + (self.rect.width - width) / 2;
        let y = self.rect.y - text_height(scale) as i64 - 10;
        self.canvas.draw_text(x, y, title, scale, BLACK);
    }

    /// Fills the axes with the class of the nearest grid cell, blended at
    /// `alpha`. Pixels outside the grid's extent are left untouched.
    pub fn contourf(
        &mut self,
        grid: &Grid,
        classes: &Array2<usize>,
        palette: &[Rgb<u8>],
        alpha: f32,
    ) -> Result<(), PlotError> {
        let (rows, cols) = grid.shape();
        if classes.dim() != (rows, cols) {
            return Err(PlotError::ShapeMismatch {
                expected: (rows, cols),
                got: classes.dim(),
            });
        }
        if palette.is_empty() {
            return Err(PlotError::ColorCount { expected: 1, got: 0 });
        }
        let (gx0, gx1) = grid.x_range();
        let (gy0, gy1) = grid.y_range();
        let col_of = |x: f64| ((x - gx0) / (gx1 - gx0) * (cols - 1) as f64).round();
        let row_of = |y: f64| ((y - gy0) / (gy1 - gy0) * (rows - 1) as f64).round();

        for py in self.rect.y..=self.rect.bottom() {
            for px in self.rect.x..=self.rect.right() {
                let (x, y) = self.from_pixel(px, py);
                let (c, r) = (col_of(x), row_of(y));
                if c < 0.0 || r < 0.0 || c > (cols - 1) as f64 || r > (rows - 1) as f64 {
                    continue;
                }
                let class = classes[[r as usize, c as usize]];
                self.canvas.blend_pixel(px, py, palette[class % palette.len()], alpha);
            }
        }
        Ok(())
    }

    /// Draws one marker per row of `points` (`[n, 2]`). `colors` holds either
    /// a single color or one per point.
    pub fn scatter(&mut self, points: ArrayView2<f64>, colors: &[Rgb<u8>], style: MarkerStyle) -> Result<(), PlotError> {
        if points.ncols() != 2 {
            return Err(PlotError::NotTwoDimensional(points.ncols()));
        }
        let n = points.nrows();
        if colors.len() != 1 && colors.len() != n {
            return Err(PlotError::ColorCount {
                expected: n,
                got: colors.len(),
            });
        }

        self.canvas.set_clip(Some(self.rect));
        for (i, row) in points.rows().into_iter().enumerate() {
            let color = if colors.len() == 1 { colors[0] } else { colors[i] };
            let (px, py) = self.to_pixel(row[0], row[1]);
            draw_marker(self.canvas, px, py, color, &style);
        }
        self.canvas.set_clip(None);
        Ok(())
    }

    /// Boxed legend in the upper-right corner of the axes.
    pub fn legend(&mut self, entries: &[(&str, Rgb<u8>, MarkerStyle)]) {
        if entries.is_empty() {
            return;
        }
        let scale = 2;
        let pad = 8;
        let swatch = 20;
        let line_h = text_height(scale) as i64 + 10;
        let label_w = entries
            .iter()
            .map(|(label, _, _)| text_width(label, scale) as i64)
            .max()
            .unwrap_or(0);

        let width = pad * 3 + swatch + label_w;
        let height = pad * 2 + line_h * entries.len() as i64 - 10;
        let frame = Rect::new(self.rect.right() - width - 10, self.rect.y + 10, width, height);
        self.canvas.fill_rect(frame, WHITE, 0.8);
        self.canvas.stroke_rect(frame, LIGHT_GRAY);

        for (i, (label, color, style)) in entries.iter().enumerate() {
            let top = frame.y + pad + i as i64 * line_h;
            let cy = top as f64 + text_height(scale) as f64 / 2.0;
            let cx = (frame.x + pad) as f64 + swatch as f64 / 2.0;
            draw_marker(self.canvas, cx, cy, *color, style);
            self.canvas.draw_text(frame.x + pad * 2 + swatch, top, label, scale, BLACK);
        }
    }

    /// Axes frame with tick marks and numeric labels on both axes.
    pub fn draw_frame(&mut self) {
        let rect = self.rect;
        self.canvas.stroke_rect(rect, BLACK);

        for tick in nice_ticks(self.x_range.0, self.x_range.1, TARGET_TICKS) {
            let (px, _) = self.to_pixel(tick, self.y_range.0);
            let px = px.round() as i64;
            self.canvas.vline(px, rect.bottom(), rect.bottom() + TICK_LEN, BLACK);
            let label = format_tick(tick, self.x_range);
            let w = text_width(&label, 1) as i64;
            self.canvas.draw_text(px - w / 2, rect.bottom() + TICK_LEN + 4, &label, 1, BLACK);
        }
        for tick in nice_ticks(self.y_range.0, self.y_range.1, TARGET_TICKS) {
            let (_, py) = self.to_pixel(self.x_range.0, tick);
            let py = py.round() as i64;
            self.canvas.hline(py, rect.x - TICK_LEN, rect.x, BLACK);
            let label = format_tick(tick, self.y_range);
            let w = text_width(&label, 1) as i64;
            let h = text_height(1) as i64;
            self.canvas.draw_text(rect.x - TICK_LEN - 4 - w, py - h / 2, &label, 1, BLACK);
        }
    }
}

fn draw_marker(canvas: &mut Canvas, px: f64, py: f64, color: Rgb<u8>, style: &MarkerStyle) {
    match style.marker {
        Marker::Circle => {
            canvas.fill_circle(px, py, style.size, color, style.alpha);
            if let Some(edge) = style.edge {
                canvas.stroke_circle(px, py, style.size, edge);
            }
        }
        Marker::Cross => {
            let (cx, cy) = (px.round() as i64, py.round() as i64);
            let arm = style.size.round() as i64;
            canvas.line((cx - arm, cy - arm), (cx + arm, cy + arm), color, style.alpha, 2);
            canvas.line((cx - arm, cy + arm), (cx + arm, cy - arm), color, style.alpha, 2);
        }
    }
}

fn tick_step(lo: f64, hi: f64, target: usize) -> f64 {
    let raw = (hi - lo) / target.max(1) as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let norm = raw / magnitude;
    let nice = if norm < 1.5 {
        1.0
    } else if norm < 3.0 {
        2.0
    } else if norm < 7.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

/// Round-numbered tick positions (steps of 1, 2 or 5 times a power of ten)
/// inside `[lo, hi]`.
pub fn nice_ticks(lo: f64, hi: f64, target: usize) -> Vec<f64> {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return Vec::new();
    }
    let step = tick_step(lo, hi, target);
    let eps = step * 1e-9;
    let mut ticks = Vec::new();
    let mut k = (lo / step).ceil();
    loop {
        let v = k * step;
        if v > hi + eps {
            break;
        }
        // Snap away float noise and negative zero.
        ticks.push((v / step).round() * step + 0.0);
        k += 1.0;
    }
    ticks
}

fn format_tick(value: f64, range: (f64, f64)) -> String {
    let step = tick_step(range.0, range.1, TARGET_TICKS);
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10()).ceil() as usize
    };
    let s = format!("{:.*}", decimals, value);
    if s.starts_with('-') && s[1..].chars().all(|c| c == '0' || c == '.') {
        s[1..].to_string()
    } else {
        s
    }
}
