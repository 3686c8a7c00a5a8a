//! Layer normalization over the hidden axis.

use anyhow::{Result, anyhow};
use ndarray::{Array1, Array3, ArrayView3, Axis};

use crate::weights::ModelWeights;

#[derive(Debug, Clone)]
pub struct LayerNorm {
    pub weight: Array1<f32>,
    pub bias: Array1<f32>,
    pub eps: f32,
}

impl LayerNorm {
    pub fn new(weight: Array1<f32>, bias: Array1<f32>, eps: f32) -> Self {
        Self { weight, bias, eps }
    }

    /// Loads gamma/beta from `{prefix}.weight` and `{prefix}.bias`.
    pub fn from_weights(weights: &ModelWeights, prefix: &str, eps: f32) -> Result<Self> {
        let weight = weights.get_array1(&format!("{}.weight", prefix))?;
        let bias = weights.get_array1(&format!("{}.bias", prefix))?;
        if weight.len() != bias.len() {
            return Err(anyhow!(
                "LayerNorm '{}' has weight of {} but bias of {}",
                prefix,
                weight.len(),
                bias.len()
            ));
        }
        Ok(Self { weight, bias, eps })
    }

    pub fn hidden_size(&self) -> usize {
        self.weight.len()
    }

    /// Normalizes each `[batch, seq]` row to zero mean and unit (biased)
    /// variance, then applies gamma and beta.
    pub fn forward(&self, hidden_states: &ArrayView3<f32>) -> Array3<f32> {
        let hidden = hidden_states.shape()[2];
        if hidden == 0 {
            return hidden_states.to_owned();
        }
        let mean = hidden_states
            .sum_axis(Axis(2))
            .mapv(|s| s / hidden as f32)
            .insert_axis(Axis(2));
        let centered = hidden_states - &mean;
        let var = centered
            .mapv(|x| x * x)
            .sum_axis(Axis(2))
            .mapv(|s| s / hidden as f32)
            .insert_axis(Axis(2));
        let inv_std = var.mapv(|v| 1.0 / (v + self.eps).sqrt());

        centered * &inv_std * &self.weight + &self.bias
    }
}
