//! Pretrained model implementations built on duolab-transformers.
//!
//! ## Decoders
//! - [`models::gpt2`] - GPT-2 and DistilGPT2
//!
//! # Example
//!
//! ```ignore
//! use duolab_models::Gpt2Model;
//! use duolab_transformers::{DecoderGenerator, GenerationConfig, ModelLoadConfig, ModelType};
//!
//! let model = Gpt2Model::from_registry(ModelType::Gpt2, None, ModelLoadConfig::default()).await?;
//! let generator = DecoderGenerator::new(Box::new(model));
//! let output = generator.generate("The quick brown fox", &GenerationConfig::default())?;
//! println!("{}", output.text);
//! ```

pub mod models;

pub use models::gpt2::{Gpt2Config, Gpt2Model};
