use thiserror::Error;

/// Failures resolving or fetching pretrained artifacts.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("artifact '{name}' unavailable from {url}: {reason}")]
    ArtifactUnavailable {
        name: String,
        url: String,
        reason: String,
    },

    #[error("unknown model '{0}' (available: gpt2, distilgpt2)")]
    UnknownModel(String),

    #[error("no cache directory could be determined; set DUOLAB_CACHE_DIR")]
    NoCacheDir,

    #[error("model directory {0:?} is incomplete: expected config.json, tokenizer.json and model.safetensors")]
    IncompleteModelDir(std::path::PathBuf),
}
