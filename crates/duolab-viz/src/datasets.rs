//! Synthetic clustered data.

use ndarray::{Array1, Array2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Normal, Uniform};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatasetError {
    #[error("n_samples and centers must be positive (got {n_samples} samples, {centers} centers)")]
    EmptyRequest { n_samples: usize, centers: usize },

    #[error("cluster_std must be positive and finite, got {0}")]
    InvalidStd(f64),

    #[error("center box ({0}, {1}) is empty")]
    InvalidCenterBox(f64, f64),
}

/// Parameters of [`make_blobs`]. Points are always 2D.
#[derive(Debug, Clone)]
pub struct BlobsConfig {
    pub n_samples: usize,
    pub centers: usize,
    pub cluster_std: f64,
    pub center_box: (f64, f64),
    pub shuffle: bool,
}

impl Default for BlobsConfig {
    fn default() -> Self {
        Self {
            n_samples: 200,
            centers: 2,
            cluster_std: 1.0,
            center_box: (-10.0, 10.0),
            shuffle: true,
        }
    }
}

/// Points `[n, 2]` with the index of the blob each came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Blobs {
    pub points: Array2<f64>,
    pub labels: Array1<usize>,
    pub centers: Array2<f64>,
}

impl Blobs {
    pub fn len(&self) -> usize {
        self.points.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.points.nrows() == 0
    }

    pub fn n_classes(&self) -> usize {
        self.labels.iter().max().map_or(0, |&m| m + 1)
    }

    /// `(min_x, max_x, min_y, max_y)` of the points.
    pub fn bounds(&self) -> (f64, f64, f64, f64) {
        let fold = |col: usize| {
            self.points
                .column(col)
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
        };
        let (x0, x1) = fold(0);
        let (y0, y1) = fold(1);
        (x0, x1, y0, y1)
    }
}

/// Isotropic Gaussian blobs.
///
/// Centers are drawn uniformly from `center_box` on each axis. Samples are
/// split evenly across centers, the remainder going to the first ones.
/// The same `seed` always yields the same set.
pub fn make_blobs(config: &BlobsConfig, seed: u64) -> Result<Blobs, DatasetError> {
    if config.n_samples == 0 || config.centers == 0 {
        return Err(DatasetError::EmptyRequest {
            n_samples: config.n_samples,
            centers: config.centers,
        });
    }
    if !(config.cluster_std.is_finite() && config.cluster_std > 0.0) {
        return Err(DatasetError::InvalidStd(config.cluster_std));
    }
    let (lo, hi) = config.center_box;
    if lo.is_nan() || hi.is_nan() || lo >= hi {
        return Err(DatasetError::InvalidCenterBox(lo, hi));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let uniform = Uniform::new(lo, hi);
    let centers = Array2::from_shape_fn((config.centers, 2), |_| uniform.sample(&mut rng));

    let base = config.n_samples / config.centers;
    let remainder = config.n_samples % config.centers;

    let normal = Normal::new(0.0, config.cluster_std)
        .map_err(|_| DatasetError::InvalidStd(config.cluster_std))?;

    let mut rows: Vec<([f64; 2], usize)> = Vec::with_capacity(config.n_samples);
    for c in 0..config.centers {
        let count = base + usize::from(c < remainder);
        for _ in 0..count {
            let x = centers[[c, 0]] + normal.sample(&mut rng);
            let y = centers[[c, 1]] + normal.sample(&mut rng);
            rows.push(([x, y], c));
        }
    }

    if config.shuffle {
        rows.shuffle(&mut rng);
    }

    let points = Array2::from_shape_fn((rows.len(), 2), |(i, j)| rows[i].0[j]);
    let labels = rows.iter().map(|(_, c)| *c).collect();

    log::debug!(
        "make_blobs: {} samples around {} centers (seed {})",
        config.n_samples,
        config.centers,
        seed
    );

    Ok(Blobs {
        points,
        labels,
        centers,
    })
}
