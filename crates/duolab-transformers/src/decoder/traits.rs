//! # Decoder Traits
//!
//! A causal LM is split in two:
//!
//! 1. **Model container (`DecoderLanguageModel`)**: owns the tokenizer,
//!    config and precision policy, builds masks and projects hidden states
//!    to vocabulary logits.
//! 2. **Compute component (`CpuDecoder`)**: the transformer stack itself.
//!    Embed, run layers (reading and extending the KV cache), final norm.
//!
//! The generator only talks to the container, so it stays agnostic of the
//! architecture.

use anyhow::{Result, anyhow};
use ndarray::{Array2, Array3};

use crate::cache::Cache;
use crate::models::LanguageModel;
use crate::precision::PrecisionPolicy;

/// Input to a decoder forward pass.
#[derive(Debug, Clone, Copy)]
pub enum DecoderInput<'a> {
    /// Token ids of a single sequence.
    Tokens(&'a [u32]),
}

impl DecoderInput<'_> {
    pub fn seq_len(&self) -> usize {
        match self {
            DecoderInput::Tokens(t) => t.len(),
        }
    }
}

pub trait CpuDecoder: Send + Sync {
    fn embed(&self, input: DecoderInput<'_>, position_offset: usize) -> Result<Array3<f32>>;

    /// Runs every layer. When a cache is given, each layer attends over the
    /// cached positions and the cache is extended by the input length.
    fn forward_layers(
        &self,
        hidden_states: &Array3<f32>,
        attention_mask: &Array2<f32>,
        position_offset: usize,
        cache: Option<&mut dyn Cache>,
    ) -> Result<Array3<f32>>;

    fn final_norm(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>>;

    fn num_layers(&self) -> usize;

    fn forward(
        &self,
        input: DecoderInput<'_>,
        attention_mask: &Array2<f32>,
        position_offset: usize,
        cache: Option<&mut dyn Cache>,
    ) -> Result<Array3<f32>> {
        let hidden = self.embed(input, position_offset)?;
        let output = self.forward_layers(&hidden, attention_mask, position_offset, cache)?;
        self.final_norm(&output)
    }
}

pub trait DecoderLanguageModel: LanguageModel {
    fn decoder(&self) -> &dyn CpuDecoder;

    /// `[batch, seq, hidden] -> [batch, seq, vocab]`.
    fn project_to_logits(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>>;

    fn precision(&self) -> PrecisionPolicy;

    /// Key mask covering `past_len + seq_len` positions. Causality is applied
    /// inside attention, so the default admits every key.
    fn get_attention_mask(&self, seq_len: usize, past_len: usize) -> Result<Array2<f32>> {
        Ok(Array2::ones((1, past_len + seq_len)))
    }

    fn tokenize(&self, text: &str) -> Result<Vec<u32>> {
        Ok(self
            .tokenizer()
            .encode(text, false)
            .map_err(|e| anyhow!("tokenization failed: {}", e))?
            .get_ids()
            .to_vec())
    }

    /// Full-sequence logits without a cache.
    fn get_logits(&self, text: &str) -> Result<Array3<f32>> {
        let tokens = self.tokenize(text)?;
        if tokens.is_empty() {
            return Err(anyhow!("cannot score empty input"));
        }
        let mask = self.get_attention_mask(tokens.len(), 0)?;
        let hidden = self
            .decoder()
            .forward(DecoderInput::Tokens(&tokens), &mask, 0, None)?;
        self.project_to_logits(&hidden)
    }
}
