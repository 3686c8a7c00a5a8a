//! End-to-end discriminative vs generative comparison figure.

use std::path::PathBuf;

use anyhow::{Context, Result};
use image::Rgb;
use log::{debug, info};
use ndarray::{Array2, Axis, concatenate};

use crate::datasets::{BlobsConfig, make_blobs};
use crate::grid::{Grid, predict_grid};
use crate::linear::LogisticRegression;
use crate::mixture::GaussianMixture;
use crate::plot::colors::{BLACK, GRAY, GREEN, RDBU_BLUE, RDBU_HIGH, RDBU_LOW, RDBU_RED};
use crate::plot::{Figure, Marker, MarkerStyle};

pub const LEFT_TITLE: &str = "Discriminative: Finding the Boundary";
pub const RIGHT_TITLE: &str = "Generative: Creating New Data";

const FIG_WIDTH_IN: f64 = 12.0;
const FIG_HEIGHT_IN: f64 = 5.0;
const DPI: f64 = 100.0;
const GRID_PADDING: f64 = 1.0;
const REGION_ALPHA: f32 = 0.3;
const AUTOSCALE_MARGIN: f64 = 0.05;

#[derive(Debug, Clone)]
pub struct ComparisonConfig {
    pub n_samples: usize,
    pub centers: usize,
    pub cluster_std: f64,
    /// Seed of the synthetic data.
    pub data_seed: u64,
    pub n_generated: usize,
    /// Seed of the mixture's initialization and sampling; `None` draws from
    /// entropy.
    pub gmm_seed: Option<u64>,
    pub grid_resolution: usize,
    pub output: PathBuf,
}

impl Default for ComparisonConfig {
    fn default() -> Self {
        Self {
            n_samples: 200,
            centers: 2,
            cluster_std: 1.0,
            data_seed: 42,
            n_generated: 200,
            gmm_seed: None,
            grid_resolution: 100,
            output: PathBuf::from("model_comparison.png"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ComparisonReport {
    /// Training accuracy of the classifier.
    pub accuracy: f64,
    pub gmm_converged: bool,
    pub gmm_n_iter: usize,
    pub n_original: usize,
    pub n_generated: usize,
    pub output: PathBuf,
}

/// Generates blobs, fits both models, renders the two panels and writes the
/// PNG to `config.output`.
pub fn run_comparison(config: &ComparisonConfig) -> Result<ComparisonReport> {
    let blobs = make_blobs(
        &BlobsConfig {
            n_samples: config.n_samples,
            centers: config.centers,
            cluster_std: config.cluster_std,
            ..Default::default()
        },
        config.data_seed,
    )?;
    info!("Generated {} points in {} blobs", blobs.len(), blobs.n_classes());

    let mut classifier = LogisticRegression::default();
    classifier.fit(&blobs.points, &blobs.labels)?;
    let accuracy = classifier.score(&blobs.points, &blobs.labels)?;
    info!(
        "Logistic regression fitted in {} iterations, training accuracy {:.3}",
        classifier.n_iter(),
        accuracy
    );

    let grid = Grid::around(&blobs.points, GRID_PADDING, config.grid_resolution);
    let regions = predict_grid(&grid, |cells| classifier.predict(cells))?;
    debug!("Predicted {:?} decision grid", regions.dim());

    let mut mixture = GaussianMixture::new(2).with_random_state(config.gmm_seed);
    mixture.fit(&blobs.points)?;
    let (generated, _) = mixture.sample(config.n_generated)?;
    info!(
        "Gaussian mixture converged={} after {} iterations, sampled {} points",
        mixture.converged(),
        mixture.n_iter(),
        generated.nrows()
    );

    let mut figure = Figure::new(FIG_WIDTH_IN, FIG_HEIGHT_IN, DPI)?;
    {
        let mut left = figure.subplot(2, 0, grid.x_range(), grid.y_range())?;
        left.contourf(&grid, &regions, &[RDBU_RED, RDBU_BLUE], REGION_ALPHA)?;
        let colors: Vec<Rgb<u8>> = blobs
            .labels
            .iter()
            .map(|&label| if label == 0 { RDBU_LOW } else { RDBU_HIGH })
            .collect();
        left.scatter(
            blobs.points.view(),
            &colors,
            MarkerStyle {
                edge: Some(BLACK),
                ..Default::default()
            },
        )?;
        left.draw_frame();
        left.set_title(LEFT_TITLE);
    }
    {
        let all = concatenate(Axis(0), &[blobs.points.view(), generated.view()])?;
        let (x_range, y_range) = autoscale(&all);
        let original_style = MarkerStyle {
            alpha: 0.3,
            ..Default::default()
        };
        let generated_style = MarkerStyle {
            marker: Marker::Cross,
            size: 3.0,
            ..Default::default()
        };

        let mut right = figure.subplot(2, 1, x_range, y_range)?;
        right.scatter(blobs.points.view(), &[GRAY], original_style)?;
        right.scatter(generated.view(), &[GREEN], generated_style)?;
        right.draw_frame();
        right.set_title(RIGHT_TITLE);
        right.legend(&[("Original", GRAY, original_style), ("Generated", GREEN, generated_style)]);
    }

    figure
        .save(&config.output)
        .with_context(|| format!("saving comparison figure to {}", config.output.display()))?;
    info!("Wrote {}", config.output.display());

    Ok(ComparisonReport {
        accuracy,
        gmm_converged: mixture.converged(),
        gmm_n_iter: mixture.n_iter(),
        n_original: blobs.len(),
        n_generated: generated.nrows(),
        output: config.output.clone(),
    })
}

/// Bounding box of `points` widened by 5% of its span on each side.
fn autoscale(points: &Array2<f64>) -> ((f64, f64), (f64, f64)) {
    let span = |col: usize| {
        let (lo, hi) = points
            .column(col)
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        let pad = if hi > lo { (hi - lo) * AUTOSCALE_MARGIN } else { 0.5 };
        (lo - pad, hi + pad)
    };
    (span(0), span(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::colors::{WHITE, blend};

    fn config_in(dir: &tempfile::TempDir) -> ComparisonConfig {
        ComparisonConfig {
            gmm_seed: Some(0),
            output: dir.path().join("model_comparison.png"),
            ..Default::default()
        }
    }

    #[test]
    fn test_writes_non_empty_png() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(&dir);
        let report = run_comparison(&config).unwrap();

        assert_eq!(report.n_original, 200);
        assert_eq!(report.n_generated, 200);
        assert!((0.0..=1.0).contains(&report.accuracy));
        assert!(report.gmm_n_iter >= 1);

        let meta = std::fs::metadata(&report.output).unwrap();
        assert!(meta.len() > 0);
        let img = image::open(&report.output).unwrap().to_rgb8();
        assert_eq!(img.dimensions(), (1200, 500));
    }

    #[test]
    fn test_panels_carry_expected_colors() {
        let dir = tempfile::tempdir().unwrap();
        let report = run_comparison(&config_in(&dir)).unwrap();
        let img = image::open(&report.output).unwrap().to_rgb8();

        let count = |x0: u32, x1: u32, color: Rgb<u8>| {
            let mut n = 0;
            for y in 0..img.height() {
                for x in x0..x1 {
                    if *img.get_pixel(x, y) == color {
                        n += 1;
                    }
                }
            }
            n
        };

        // Both decision regions are visible on the left.
        assert!(count(0, 600, blend(WHITE, RDBU_RED, REGION_ALPHA)) > 0);
        assert!(count(0, 600, blend(WHITE, RDBU_BLUE, REGION_ALPHA)) > 0);
        // Right panel has translucent originals and opaque green crosses,
        // and no decision regions.
        assert!(count(600, 1200, blend(WHITE, GRAY, 0.3)) > 0);
        assert!(count(600, 1200, GREEN) > 0);
        assert_eq!(count(600, 1200, blend(WHITE, RDBU_RED, REGION_ALPHA)), 0);
    }

    #[test]
    fn test_seeded_runs_are_identical() {
        let dir = tempfile::tempdir().unwrap();
        let mut a = config_in(&dir);
        a.output = dir.path().join("a.png");
        let mut b = a.clone();
        b.output = dir.path().join("b.png");

        run_comparison(&a).unwrap();
        run_comparison(&b).unwrap();
        let img_a = image::open(&a.output).unwrap().to_rgb8();
        let img_b = image::open(&b.output).unwrap().to_rgb8();
        assert!(img_a == img_b);
    }

    #[test]
    fn test_unwritable_output_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = ComparisonConfig {
            output: dir.path().join("missing").join("out.png"),
            ..config_in(&dir)
        };
        assert!(run_comparison(&config).is_err());
        assert!(!config.output.exists());
    }

    #[test]
    fn test_autoscale_margin() {
        let points = ndarray::array![[0.0, -1.0], [10.0, 1.0]];
        let ((x0, x1), (y0, y1)) = autoscale(&points);
        assert_eq!((x0, x1), (-0.5, 10.5));
        assert!((y0 + 1.1).abs() < 1e-12 && (y1 - 1.1).abs() < 1e-12);
    }
}
