//! Decoder-only (causal LM) traits and the autoregressive generator.

pub mod generator;
pub mod traits;

pub use generator::{DecoderGenerator, GenerationOutput, StopReason};
pub use traits::{CpuDecoder, DecoderInput, DecoderLanguageModel};

#[cfg(test)]
mod tests;
