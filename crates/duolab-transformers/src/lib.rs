//! Core transformer components for CPU text generation.
//!
//! This crate provides the building blocks (weights, layers, KV cache,
//! sampling) and the generic autoregressive generator. Model-specific wiring
//! lives in `duolab-models`.

pub mod activations;
pub mod attention;
pub mod cache;
pub mod common;
pub mod decoder;
pub mod embeddings;
pub mod feedforward;
pub mod models;
pub mod normalization;
pub mod precision;
pub mod tensor;
pub mod utils;
pub mod weights;

// Re-export commonly used items
pub use crate::{
    attention::MultiHeadAttention,
    cache::{Cache, CpuKVCache},
    common::{DecodingStrategy, GenerationConfig, SamplingParams},
    decoder::{DecoderGenerator, GenerationOutput, StopReason},
    embeddings::Embeddings,
    feedforward::FeedForward,
    normalization::LayerNorm,
    precision::PrecisionPolicy,
};

pub use models::{LanguageModel, ModelError, ModelLoadConfig, ModelType};

pub mod prelude {
    pub use crate::cache::{Cache, CpuKVCache};
    pub use crate::decoder::{CpuDecoder, DecoderInput, DecoderLanguageModel};
    pub use crate::models::LanguageModel;
    pub use crate::precision::PrecisionPolicy;
}
