//! Base traits for language models.

use std::collections::HashSet;

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::cache::Cache;
use crate::precision::PrecisionPolicy;

/// Options fixed at model construction time.
#[derive(Debug, Clone, Copy, Default)]
pub struct ModelLoadConfig {
    pub precision: PrecisionPolicy,
    /// Caps the context window below the checkpoint's own limit.
    pub max_sequence_length: Option<usize>,
}

impl ModelLoadConfig {
    pub fn with_precision(mut self, precision: PrecisionPolicy) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_max_sequence_length(mut self, len: usize) -> Self {
        self.max_sequence_length = Some(len);
        self
    }
}

pub trait LanguageModel: Send + Sync {
    fn vocab_size(&self) -> usize;
    fn hidden_size(&self) -> usize;
    fn num_layers(&self) -> usize;
    fn num_heads(&self) -> usize;
    /// Maximum number of positions the model can attend over.
    fn context_size(&self) -> usize;
    fn tokenizer(&self) -> &Tokenizer;

    fn eos_token_id(&self) -> Option<u32>;
    fn bos_token_id(&self) -> Option<u32>;
    fn pad_token_id(&self) -> Option<u32>;

    fn new_cache(&self, batch_size: usize, max_len: usize) -> Result<Box<dyn Cache>>;

    fn stop_token_ids(&self) -> HashSet<u32> {
        let mut set = HashSet::new();
        if let Some(id) = self.eos_token_id() {
            set.insert(id);
        }
        set
    }
}
