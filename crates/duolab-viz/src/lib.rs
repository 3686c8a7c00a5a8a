//! Discriminative vs generative modeling on synthetic 2D data.
//!
//! Generates two-class blobs, fits a logistic regression (learns `P(y | x)`)
//! and a Gaussian mixture (learns `P(x)`), samples new points from the
//! mixture and renders both side by side into a PNG.
//!
//! # Modules
//!
//! - [`datasets`] - seeded blob generator
//! - [`grid`] - meshgrid and parallel grid prediction
//! - [`linear`] - logistic regression
//! - [`mixture`] - Gaussian mixture fitted by EM
//! - [`plot`] - raster figure with axes, scatter, filled regions and legend
//! - [`comparison`] - the end-to-end pipeline

pub mod comparison;
pub mod datasets;
pub mod grid;
pub mod linear;
pub mod mixture;
pub mod plot;

pub use comparison::{ComparisonConfig, ComparisonReport, run_comparison};
pub use datasets::{Blobs, BlobsConfig, make_blobs};
pub use linear::{LogisticRegression, LogisticRegressionError};
pub use mixture::{GaussianMixture, MixtureError};
pub use plot::{Figure, PlotError};
