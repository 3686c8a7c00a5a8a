use anyhow::{Result, anyhow};
use ndarray::linalg::general_mat_mul;
use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, Zip};

#[inline]
pub fn matmul_2d(a: &ArrayView2<f32>, b: &ArrayView2<f32>) -> Array2<f32> {
    a.dot(b)
}

/// Multiplies a `[batch, seq, in]` activation by an `[in, out]` weight.
#[inline]
pub fn matmul_3d_2d(a: &ArrayView3<f32>, b: &ArrayView2<f32>) -> Result<Array3<f32>> {
    let (batch, m, k) = a.dim();
    let (k2, n) = b.dim();
    if k != k2 {
        return Err(anyhow!("matmul inner dimensions do not match: {} vs {}", k, k2));
    }
    let a_std = a.as_standard_layout();
    let a_flat = a_std.view().into_shape_with_order((batch * m, k))?;
    let c_flat = matmul_2d(&a_flat, b);
    Ok(c_flat.into_shape_with_order((batch, m, n))?)
}

/// Batched per-head matmul: `[b, h, m, k] x [b, h, k, n] -> [b, h, m, n]`.
///
/// Batches run in parallel; heads within a batch run sequentially.
pub fn matmul_4d(a: &Array4<f32>, b: &Array4<f32>) -> Array4<f32> {
    let (batch, heads, seq1, _) = a.dim();
    let seq2 = b.shape()[3];

    let mut output = Array4::<f32>::zeros((batch, heads, seq1, seq2));

    Zip::from(output.outer_iter_mut())
        .and(a.outer_iter())
        .and(b.outer_iter())
        .par_for_each(|mut out_b, a_b, b_b| {
            Zip::from(out_b.outer_iter_mut())
                .and(a_b.outer_iter())
                .and(b_b.outer_iter())
                .for_each(|mut out_h, a_h, b_h| {
                    general_mat_mul(1.0, &a_h, &b_h, 0.0, &mut out_h);
                });
        });

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array, array};

    #[test]
    fn test_matmul_3d_2d() {
        let a = Array::from_shape_vec((1, 2, 2), vec![1.0, 2.0, 3.0, 4.0]).unwrap();
        let b = array![[1.0, 0.0, 1.0], [0.0, 1.0, 1.0]];
        let c = matmul_3d_2d(&a.view(), &b.view()).unwrap();
        assert_eq!(c.dim(), (1, 2, 3));
        assert_eq!(c.into_raw_vec_and_offset().0, vec![1.0, 2.0, 3.0, 3.0, 4.0, 7.0]);
    }

    #[test]
    fn test_matmul_3d_2d_dim_mismatch() {
        let a = Array3::<f32>::zeros((1, 2, 3));
        let b = Array2::<f32>::zeros((2, 3));
        assert!(matmul_3d_2d(&a.view(), &b.view()).is_err());
    }

    #[test]
    fn test_matmul_4d_matches_per_head_dot() {
        let a = Array::from_shape_fn((2, 3, 4, 5), |(b, h, i, j)| (b + h + i * j) as f32 * 0.1);
        let bm = Array::from_shape_fn((2, 3, 5, 6), |(b, h, i, j)| (b * h + i + j) as f32 * 0.05);
        let out = matmul_4d(&a, &bm);

        assert_eq!(out.dim(), (2, 3, 4, 6));
        let a_head: ndarray::ArrayView2<f32> = a.slice(ndarray::s![1, 2, .., ..]);
        let b_head: ndarray::ArrayView2<f32> = bm.slice(ndarray::s![1, 2, .., ..]);
        let expected = a_head.dot(&b_head);
        for ((i, j), v) in expected.indexed_iter() {
            assert!((out[[1, 2, i, j]] - v).abs() < 1e-5);
        }
    }
}
