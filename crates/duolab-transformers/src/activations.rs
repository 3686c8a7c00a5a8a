//! Activation functions and softmax operations.

use std::str::FromStr;

use libm::{erff, tanhf};
use ndarray::{Array1, ArrayBase, Axis, DataMut, Dimension, Zip};
use serde::{Deserialize, Serialize};

/// Element count above which element-wise ops switch to rayon.
pub const PARALLEL_THRESHOLD: usize = 16_384;

const SQRT_2_INV: f32 = 0.707_106_77;
const SQRT_2_OVER_PI: f32 = 0.797_884_6;
const GELU_COEFF: f32 = 0.044715;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    /// Exact erf-based GELU.
    Gelu,
    /// Tanh approximation used by GPT-2.
    #[default]
    GeluNew,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            // HF configs say "gelu" for checkpoints trained with the approximation
            "gelu" | "gelu_new" | "gelu_fast" | "gelu_pytorch_tanh" => Ok(Activation::GeluNew),
            "gelu_exact" => Ok(Activation::Gelu),
            _ => Err(format!("unknown activation function: {}", s)),
        }
    }
}

#[inline(always)]
pub fn gelu_scalar(x: f32) -> f32 {
    0.5 * x * (1.0 + erff(x * SQRT_2_INV))
}

#[inline(always)]
pub fn gelu_new_scalar(x: f32) -> f32 {
    let inner = SQRT_2_OVER_PI * (x + GELU_COEFF * x * x * x);
    0.5 * x * (1.0 + tanhf(inner))
}

impl Activation {
    #[inline(always)]
    pub fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Gelu => gelu_scalar(x),
            Activation::GeluNew => gelu_new_scalar(x),
        }
    }
}

/// Applies `activation` element-wise, in parallel for large arrays.
pub fn apply_activation<S, D>(arr: &mut ArrayBase<S, D>, activation: Activation)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    if arr.len() >= PARALLEL_THRESHOLD {
        arr.par_mapv_inplace(|x| activation.apply(x));
    } else {
        arr.mapv_inplace(|x| activation.apply(x));
    }
}

pub fn softmax_inplace(slice: &mut [f32]) {
    if slice.is_empty() {
        return;
    }

    let max = slice.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));

    let mut sum = 0.0;
    for v in slice.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }

    if sum > 0.0 {
        let scale = 1.0 / sum;
        for v in slice.iter_mut() {
            *v *= scale;
        }
    }
}

pub fn softmax_1d_inplace(logits: &mut Array1<f32>) {
    if let Some(slice) = logits.as_slice_mut() {
        softmax_inplace(slice);
    } else {
        let max = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
        logits.mapv_inplace(|x| (x - max).exp());
        let sum = logits.sum();
        if sum > 0.0 {
            *logits /= sum;
        }
    }
}

/// Softmax over the last axis of an array of any rank.
///
/// Rows are processed in parallel.
pub fn softmax_last_axis_inplace<S, D>(scores: &mut ArrayBase<S, D>)
where
    S: DataMut<Elem = f32>,
    D: Dimension,
{
    if scores.ndim() == 0 {
        return;
    }
    let last = Axis(scores.ndim() - 1);
    Zip::from(scores.lanes_mut(last)).par_for_each(|mut row| {
        if let Some(slice) = row.as_slice_mut() {
            softmax_inplace(slice);
        } else {
            let max = row.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
            row.mapv_inplace(|x| (x - max).exp());
            let sum = row.sum();
            if sum > 0.0 {
                row /= sum;
            }
        }
    });
}
