//! Numeric precision policy for model construction.
//!
//! A policy pairs a *variable* dtype (how weights are materialized) with a
//! *compute* dtype (the precision activations are carried in between
//! blocks). The policy is load-time configuration handed to the model
//! constructor; nothing in this crate reads it from global state.

use std::fmt;
use std::str::FromStr;

use half::{bf16, f16};
use ndarray::{ArrayBase, DataMut, Dimension};

use crate::tensor::DType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PrecisionPolicy {
    /// Weights and activations in f32.
    #[default]
    Float32,
    /// Weights in f32, activations rounded to f16.
    MixedFloat16,
    /// Weights in f32, activations rounded to bf16.
    MixedBFloat16,
}

impl PrecisionPolicy {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Float32 => "float32",
            Self::MixedFloat16 => "mixed_float16",
            Self::MixedBFloat16 => "mixed_bfloat16",
        }
    }

    /// Dtype weights are stored in once loaded.
    pub fn variable_dtype(&self) -> DType {
        DType::F32
    }

    /// Dtype activations are rounded to after each block.
    pub fn compute_dtype(&self) -> DType {
        match self {
            Self::Float32 => DType::F32,
            Self::MixedFloat16 => DType::F16,
            Self::MixedBFloat16 => DType::BF16,
        }
    }

    pub fn is_mixed(&self) -> bool {
        self.compute_dtype() != self.variable_dtype()
    }

    /// Rounds every element to the compute dtype, keeping f32 storage.
    pub fn round_inplace<S, D>(&self, arr: &mut ArrayBase<S, D>)
    where
        S: DataMut<Elem = f32>,
        D: Dimension,
    {
        match self.compute_dtype() {
            DType::F16 => arr.mapv_inplace(|x| f16::from_f32(x).to_f32()),
            DType::BF16 => arr.mapv_inplace(|x| bf16::from_f32(x).to_f32()),
            _ => {}
        }
    }
}

impl FromStr for PrecisionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "float32" | "f32" => Ok(Self::Float32),
            "mixed_float16" | "mixed-float16" | "f16" => Ok(Self::MixedFloat16),
            "mixed_bfloat16" | "mixed-bfloat16" | "bf16" => Ok(Self::MixedBFloat16),
            _ => Err(format!(
                "unknown precision policy '{}' (expected float32, mixed_float16 or mixed_bfloat16)",
                s
            )),
        }
    }
}

impl fmt::Display for PrecisionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
