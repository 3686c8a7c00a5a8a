//! Model-facing traits, load configuration and the pretrained registry.

pub mod base;
pub mod error;
pub mod registry;

pub use base::{LanguageModel, ModelLoadConfig};
pub use error::ModelError;
pub use registry::{ModelPaths, ModelType, download_model_files, format_size, get_default_cache_dir};
