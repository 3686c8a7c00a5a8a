//! Evaluation grids over the plane.

use anyhow::{Result, anyhow};
use ndarray::{Array1, Array2, s};
use rayon::prelude::*;

/// Rows handed to each rayon task by [`predict_grid`].
const CHUNK_ROWS: usize = 1024;

/// `numpy.meshgrid` for two axes: both outputs are `[ys.len(), xs.len()]`,
/// `xx` varying along columns and `yy` along rows.
pub fn meshgrid(xs: &Array1<f64>, ys: &Array1<f64>) -> (Array2<f64>, Array2<f64>) {
    let shape = (ys.len(), xs.len());
    let xx = Array2::from_shape_fn(shape, |(_, j)| xs[j]);
    let yy = Array2::from_shape_fn(shape, |(i, _)| ys[i]);
    (xx, yy)
}

/// A regular `resolution x resolution` mesh.
#[derive(Debug, Clone)]
pub struct Grid {
    pub xs: Array1<f64>,
    pub ys: Array1<f64>,
    pub xx: Array2<f64>,
    pub yy: Array2<f64>,
}

impl Grid {
    pub fn new(x_range: (f64, f64), y_range: (f64, f64), resolution: usize) -> Self {
        let xs = Array1::linspace(x_range.0, x_range.1, resolution);
        let ys = Array1::linspace(y_range.0, y_range.1, resolution);
        let (xx, yy) = meshgrid(&xs, &ys);
        Self { xs, ys, xx, yy }
    }

    /// Spans the bounding box of `points` (`[n, 2]`) widened by `padding`
    /// on every side.
    pub fn around(points: &Array2<f64>, padding: f64, resolution: usize) -> Self {
        let bounds = |col: usize| {
            points
                .column(col)
                .iter()
                .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)))
        };
        let (x0, x1) = bounds(0);
        let (y0, y1) = bounds(1);
        Self::new((x0 - padding, x1 + padding), (y0 - padding, y1 + padding), resolution)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.xx.dim()
    }

    pub fn x_range(&self) -> (f64, f64) {
        (self.xs[0], self.xs[self.xs.len() - 1])
    }

    pub fn y_range(&self) -> (f64, f64) {
        (self.ys[0], self.ys[self.ys.len() - 1])
    }

    /// Cells as `[rows * cols, 2]` in row-major order, i.e.
    /// `np.c_[xx.ravel(), yy.ravel()]`.
    pub fn points(&self) -> Array2<f64> {
        let (rows, cols) = self.shape();
        Array2::from_shape_fn((rows * cols, 2), |(k, j)| {
            let (r, c) = (k / cols, k % cols);
            if j == 0 { self.xx[[r, c]] } else { self.yy[[r, c]] }
        })
    }
}

/// Runs `predict` over every grid cell in parallel chunks and reshapes the
/// result to the grid's shape.
pub fn predict_grid<T, E, F>(grid: &Grid, predict: F) -> Result<Array2<T>>
where
    T: Clone + Send,
    E: std::error::Error + Send + Sync + 'static,
    F: Fn(&Array2<f64>) -> std::result::Result<Array1<T>, E> + Sync,
{
    let points = grid.points();
    let n = points.nrows();
    let chunks: Vec<Array1<T>> = (0..n.div_ceil(CHUNK_ROWS))
        .into_par_iter()
        .map(|c| {
            let end = ((c + 1) * CHUNK_ROWS).min(n);
            predict(&points.slice(s![c * CHUNK_ROWS..end, ..]).to_owned())
        })
        .collect::<std::result::Result<_, E>>()?;

    let mut flat: Vec<T> = Vec::with_capacity(n);
    for chunk in &chunks {
        flat.extend(chunk.iter().cloned());
    }
    let (rows, cols) = grid.shape();
    if flat.len() != rows * cols {
        return Err(anyhow!("expected {} grid predictions, got {}", rows * cols, flat.len()));
    }
    Ok(Array2::from_shape_vec((rows, cols), flat)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linear::LogisticRegressionError;
    use ndarray::array;

    #[test]
    fn test_meshgrid_orientation() {
        let (xx, yy) = meshgrid(&array![0.0, 1.0, 2.0], &array![10.0, 20.0]);
        assert_eq!(xx, array![[0.0, 1.0, 2.0], [0.0, 1.0, 2.0]]);
        assert_eq!(yy, array![[10.0, 10.0, 10.0], [20.0, 20.0, 20.0]]);
    }

    #[test]
    fn test_grid_around_pads_bounds() {
        let points = array![[0.0, 5.0], [2.0, -1.0]];
        let grid = Grid::around(&points, 1.0, 100);
        assert_eq!(grid.shape(), (100, 100));
        assert_eq!(grid.x_range(), (-1.0, 3.0));
        assert_eq!(grid.y_range(), (-2.0, 6.0));
    }

    #[test]
    fn test_points_ravel_row_major() {
        let grid = Grid::new((0.0, 1.0), (0.0, 2.0), 3);
        let pts = grid.points();
        assert_eq!(pts.nrows(), 9);
        assert_eq!(pts.row(0).to_vec(), vec![0.0, 0.0]);
        assert_eq!(pts.row(1).to_vec(), vec![0.5, 0.0]);
        assert_eq!(pts.row(3).to_vec(), vec![0.0, 1.0]);
        assert_eq!(pts.row(8).to_vec(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_wrong_prediction_count_is_error() {
        let grid = Grid::new((0.0, 1.0), (0.0, 1.0), 4);
        let short = |_: &Array2<f64>| -> std::result::Result<Array1<usize>, LogisticRegressionError> {
            Ok(Array1::zeros(1))
        };
        assert!(predict_grid(&grid, short).is_err());
    }

    #[test]
    fn test_predict_grid_matches_serial() {
        let grid = Grid::new((-3.0, 3.0), (-3.0, 3.0), 50);
        let rule = |p: &Array2<f64>| -> std::result::Result<Array1<usize>, LogisticRegressionError> {
            Ok(p.rows().into_iter().map(|r| usize::from(r[0] + r[1] > 0.0)).collect())
        };
        let parallel = predict_grid(&grid, rule).unwrap();
        assert_eq!(parallel.dim(), (50, 50));
        for ((r, c), &v) in parallel.indexed_iter() {
            assert_eq!(v, usize::from(grid.xx[[r, c]] + grid.yy[[r, c]] > 0.0));
        }
    }

    #[test]
    fn test_predict_grid_propagates_errors() {
        let grid = Grid::new((0.0, 1.0), (0.0, 1.0), 4);
        let result: Result<Array2<usize>> =
            predict_grid(&grid, |_| Err(LogisticRegressionError::NotFitted));
        let err = result.unwrap_err();
        assert_eq!(
            err.downcast_ref::<LogisticRegressionError>(),
            Some(&LogisticRegressionError::NotFitted)
        );
    }
}
