//! Generation settings shared by every decoder.

pub mod sampling;

pub use sampling::*;

#[derive(Clone, Debug, PartialEq)]
pub struct SamplingParams {
    pub temperature: f32,
    pub top_k: Option<usize>,
    pub top_p: Option<f32>,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            top_k: Some(50),
            top_p: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum DecodingStrategy {
    /// Always pick the highest-scoring token.
    Greedy,
    /// Sample among the `k` highest-scoring tokens.
    TopK { k: usize, temperature: f32 },
    /// Temperature sampling with optional top-k and nucleus filters.
    Sample(SamplingParams),
}

impl Default for DecodingStrategy {
    fn default() -> Self {
        DecodingStrategy::TopK {
            k: 5,
            temperature: 1.0,
        }
    }
}

#[derive(Clone, Debug)]
pub struct GenerationConfig {
    /// Cap on prompt plus generated tokens.
    pub max_length: usize,
    /// Optional cap on generated tokens alone; the tighter bound wins.
    pub max_new_tokens: Option<usize>,
    pub repetition_penalty: f32,
    pub strategy: DecodingStrategy,
    /// Sampler seed. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub add_bos_token: bool,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_length: 50,
            max_new_tokens: None,
            repetition_penalty: 1.0,
            strategy: DecodingStrategy::default(),
            seed: None,
            add_bos_token: false,
        }
    }
}

impl GenerationConfig {
    pub fn greedy(max_length: usize) -> Self {
        Self {
            max_length,
            strategy: DecodingStrategy::Greedy,
            ..Default::default()
        }
    }
}
