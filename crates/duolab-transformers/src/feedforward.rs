//! Position-wise feed-forward block.

use anyhow::{Result, anyhow};
use ndarray::{Array1, Array2, Array3, ArrayView3};

use crate::activations::{Activation, apply_activation};
use crate::utils::linear_algebra::matmul_3d_2d;

/// Two-layer MLP with weights in `[in, out]` layout, as stored by GPT-2's
/// Conv1D modules.
#[derive(Debug, Clone)]
pub struct FeedForward {
    pub fc_weight: Array2<f32>,
    pub fc_bias: Array1<f32>,
    pub proj_weight: Array2<f32>,
    pub proj_bias: Array1<f32>,
    pub activation: Activation,
}

impl FeedForward {
    pub fn new(
        fc_weight: Array2<f32>,
        fc_bias: Array1<f32>,
        proj_weight: Array2<f32>,
        proj_bias: Array1<f32>,
        activation: Activation,
    ) -> Result<Self> {
        let (hidden, inner) = fc_weight.dim();
        if proj_weight.dim() != (inner, hidden) {
            return Err(anyhow!(
                "feed-forward shapes disagree: fc {:?}, proj {:?}",
                fc_weight.shape(),
                proj_weight.shape()
            ));
        }
        if fc_bias.len() != inner || proj_bias.len() != hidden {
            return Err(anyhow!(
                "feed-forward bias lengths {} / {} do not match {} / {}",
                fc_bias.len(),
                proj_bias.len(),
                inner,
                hidden
            ));
        }
        Ok(Self {
            fc_weight,
            fc_bias,
            proj_weight,
            proj_bias,
            activation,
        })
    }

    pub fn intermediate_size(&self) -> usize {
        self.fc_weight.shape()[1]
    }

    pub fn forward(&self, hidden: &ArrayView3<f32>) -> Result<Array3<f32>> {
        let mut inner = matmul_3d_2d(hidden, &self.fc_weight.view())? + &self.fc_bias;
        apply_activation(&mut inner, self.activation);
        Ok(matmul_3d_2d(&inner.view(), &self.proj_weight.view())? + &self.proj_bias)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activations::gelu_scalar;
    use approx::assert_relative_eq;
    use ndarray::arr1;

    #[test]
    fn test_gelu_mlp() -> Result<()> {
        // hidden 2 -> inner 3 -> hidden 2
        let fc = Array2::from_shape_vec((2, 3), vec![1.0, -1.0, 0.5, 0.0, 1.0, 0.5])?;
        let proj = Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0])?;
        let ff = FeedForward::new(fc, arr1(&[0.0, 0.0, 0.0]), proj, arr1(&[0.1, 0.2]), Activation::Gelu)?;

        let x = Array3::from_shape_vec((1, 1, 2), vec![2.0, 1.0])?;
        let y = ff.forward(&x.view())?;

        // inner = gelu([2, -1, 1.5])
        let (a, b, c) = (gelu_scalar(2.0), gelu_scalar(-1.0), gelu_scalar(1.5));
        assert_relative_eq!(y[[0, 0, 0]], a + c + 0.1, epsilon = 1e-6);
        assert_relative_eq!(y[[0, 0, 1]], b + c + 0.2, epsilon = 1e-6);
        assert_eq!(ff.intermediate_size(), 3);
        Ok(())
    }

    #[test]
    fn test_shape_mismatch() {
        let result = FeedForward::new(
            Array2::zeros((2, 3)),
            Array1::zeros(3),
            Array2::zeros((2, 3)),
            Array1::zeros(2),
            Activation::GeluNew,
        );
        assert!(result.is_err());
    }
}
