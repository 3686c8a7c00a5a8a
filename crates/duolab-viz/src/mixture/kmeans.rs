//! k-means used to seed the mixture's responsibilities.

use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::Rng;
use rand::distributions::WeightedIndex;
use rand_distr::Distribution;

const MAX_ITER: usize = 300;

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

/// k-means++ seeding: the first center uniformly, each next one with
/// probability proportional to squared distance from the chosen ones.
fn plus_plus_init<R: Rng + ?Sized>(x: &Array2<f64>, k: usize, rng: &mut R) -> Array2<f64> {
    let n = x.nrows();
    let mut centers = Array2::<f64>::zeros((k, x.ncols()));
    centers.row_mut(0).assign(&x.row(rng.gen_range(0..n)));

    let mut closest: Vec<f64> = x
        .rows()
        .into_iter()
        .map(|row| squared_distance(&row, &centers.row(0)))
        .collect();

    for c in 1..k {
        let idx = match WeightedIndex::new(&closest) {
            Ok(dist) => dist.sample(rng),
            // Every point already coincides with a center.
            Err(_) => rng.gen_range(0..n),
        };
        centers.row_mut(c).assign(&x.row(idx));
        for (i, row) in x.rows().into_iter().enumerate() {
            closest[i] = closest[i].min(squared_distance(&row, &centers.row(c)));
        }
    }
    centers
}

/// Lloyd's algorithm. Returns the label of each row.
pub fn kmeans_labels<R: Rng + ?Sized>(x: &Array2<f64>, k: usize, rng: &mut R) -> Array1<usize> {
    let mut centers = plus_plus_init(x, k, rng);
    let mut labels = Array1::<usize>::zeros(x.nrows());

    for iter in 0..MAX_ITER {
        let mut changed = false;
        for (i, row) in x.rows().into_iter().enumerate() {
            let best = (0..k)
                .map(|c| (c, squared_distance(&row, &centers.row(c))))
                .min_by(|a, b| a.1.total_cmp(&b.1))
                .map_or(0, |(c, _)| c);
            if best != labels[i] {
                labels[i] = best;
                changed = true;
            }
        }
        if iter > 0 && !changed {
            log::debug!("k-means converged after {} iterations", iter);
            break;
        }

        for c in 0..k {
            let members: Vec<usize> = (0..x.nrows()).filter(|&i| labels[i] == c).collect();
            if members.is_empty() {
                continue;
            }
            let mean = x.select(Axis(0), &members).mean_axis(Axis(0));
            if let Some(mean) = mean {
                centers.row_mut(c).assign(&mean);
            }
        }
    }
    labels
}
