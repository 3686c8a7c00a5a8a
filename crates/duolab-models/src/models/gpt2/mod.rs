//! GPT-2 style decoder-only language model.
//!
//! `Gpt2Model` is the container: it loads config, tokenizer and weights for
//! GPT-2 and DistilGPT2. Text generation is handled by the generic
//! `DecoderGenerator`, which runs any `DecoderLanguageModel`.

mod config;
mod cpu_decoder;
mod model;


pub use config::Gpt2Config;
pub use cpu_decoder::{Gpt2Block, Gpt2CpuDecoder};
pub use model::Gpt2Model;
