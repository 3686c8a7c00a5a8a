//! Minimal raster plotting: a figure of side-by-side axes with filled
//! decision regions, scatter markers, titles and a legend.

pub mod colors;
pub mod font;

mod axes;
mod canvas;
mod figure;

use std::path::PathBuf;

use thiserror::Error;

pub use axes::{Axes, Marker, MarkerStyle, nice_ticks};
pub use canvas::{Canvas, Rect};
pub use figure::Figure;

#[derive(Debug, Error)]
pub enum PlotError {
    #[error("Invalid figure size {width}x{height} px")]
    InvalidFigure { width: f64, height: f64 },

    #[error("Degenerate {axis} range [{lo}, {hi}]")]
    DegenerateRange { axis: &'static str, lo: f64, hi: f64 },

    #[error("Subplot index {index} out of range for {ncols} columns")]
    BadSubplot { index: usize, ncols: usize },

    #[error("Expected 1 or {expected} colors, got {got}")]
    ColorCount { expected: usize, got: usize },

    #[error("Expected {expected:?} class grid, got {got:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },

    #[error("Scatter points must have 2 columns, got {0}")]
    NotTwoDimensional(usize),

    #[error("Failed to write {}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
}
