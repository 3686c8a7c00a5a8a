use std::path::Path;

use image::{ImageFormat, RgbImage};
use log::debug;

use super::PlotError;
use super::axes::Axes;
use super::canvas::{Canvas, Rect};
use super::colors::WHITE;

const MARGIN_LEFT: i64 = 60;
const MARGIN_RIGHT: i64 = 20;
const MARGIN_TOP: i64 = 50;
const MARGIN_BOTTOM: i64 = 45;

/// A white raster figure sized in inches at a given DPI, holding a single
/// row of subplots.
pub struct Figure {
    canvas: Canvas,
}

impl Figure {
    pub fn new(width_in: f64, height_in: f64, dpi: f64) -> Result<Self, PlotError> {
        let width = (width_in * dpi).round();
        let height = (height_in * dpi).round();
        let min_w = (MARGIN_LEFT + MARGIN_RIGHT + 2) as f64;
        let min_h = (MARGIN_TOP + MARGIN_BOTTOM + 2) as f64;
        if !(width.is_finite() && height.is_finite()) || width < min_w || height < min_h || width > u32::MAX as f64
            || height > u32::MAX as f64
        {
            return Err(PlotError::InvalidFigure { width, height });
        }
        debug!("Creating {}x{} px figure", width, height);
        Ok(Self {
            canvas: Canvas::new(width as u32, height as u32, WHITE),
        })
    }

    pub fn width(&self) -> u32 {
        self.canvas.width()
    }

    pub fn height(&self) -> u32 {
        self.canvas.height()
    }

    /// Axes for panel `index` of `ncols` equally wide columns.
    pub fn subplot(
        &mut self,
        ncols: usize,
        index: usize,
        x_range: (f64, f64),
        y_range: (f64, f64),
    ) -> Result<Axes<'_>, PlotError> {
        if ncols == 0 || index >= ncols {
            return Err(PlotError::BadSubplot { index, ncols });
        }
        check_range("x", x_range)?;
        check_range("y", y_range)?;

        let panel_w = self.canvas.width() as i64 / ncols as i64;
        let rect = Rect::new(
            panel_w * index as i64 + MARGIN_LEFT,
            MARGIN_TOP,
            panel_w - MARGIN_LEFT - MARGIN_RIGHT,
            self.canvas.height() as i64 - MARGIN_TOP - MARGIN_BOTTOM,
        );
        if rect.width < 2 {
            return Err(PlotError::BadSubplot { index, ncols });
        }
        Ok(Axes::new(&mut self.canvas, rect, x_range, y_range))
    }

    pub fn image(&self) -> &RgbImage {
        self.canvas.image()
    }

    pub fn into_image(self) -> RgbImage {
        self.canvas.into_image()
    }

    /// Writes the figure as PNG.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PlotError> {
        let path = path.as_ref();
        self.canvas
            .image()
            .save_with_format(path, ImageFormat::Png)
            .map_err(|source| PlotError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

fn check_range(axis: &'static str, (lo, hi): (f64, f64)) -> Result<(), PlotError> {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return Err(PlotError::DegenerateRange { axis, lo, hi });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_size_from_inches() {
        let fig = Figure::new(12.0, 5.0, 100.0).unwrap();
        assert_eq!((fig.width(), fig.height()), (1200, 500));
    }

    #[test]
    fn test_invalid_sizes() {
        assert!(matches!(Figure::new(0.0, 5.0, 100.0), Err(PlotError::InvalidFigure { .. })));
        assert!(matches!(Figure::new(f64::NAN, 5.0, 100.0), Err(PlotError::InvalidFigure { .. })));
    }

    #[test]
    fn test_subplot_layout() {
        let mut fig = Figure::new(12.0, 5.0, 100.0).unwrap();
        let right = fig.subplot(2, 1, (0.0, 1.0), (0.0, 1.0)).unwrap().rect();
        assert_eq!(right, Rect::new(660, 50, 520, 405));
    }

    #[test]
    fn test_subplot_errors() {
        let mut fig = Figure::new(12.0, 5.0, 100.0).unwrap();
        assert!(matches!(
            fig.subplot(2, 2, (0.0, 1.0), (0.0, 1.0)),
            Err(PlotError::BadSubplot { index: 2, ncols: 2 })
        ));
        assert!(matches!(
            fig.subplot(2, 0, (1.0, 1.0), (0.0, 1.0)),
            Err(PlotError::DegenerateRange { axis: "x", .. })
        ));
    }

    #[test]
    fn test_save_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fig.png");
        let fig = Figure::new(2.0, 2.0, 100.0).unwrap();
        fig.save(&path).unwrap();
        let loaded = image::open(&path).unwrap().to_rgb8();
        assert_eq!(loaded.dimensions(), (200, 200));
    }

    #[test]
    fn test_save_to_missing_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let fig = Figure::new(2.0, 2.0, 100.0).unwrap();
        let err = fig.save(dir.path().join("nope").join("fig.png")).unwrap_err();
        assert!(matches!(err, PlotError::Write { .. }));
    }
}
