//! Pretrained model registry and hub downloads.

use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Result;
use log::{debug, info};

use crate::models::error::ModelError;

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";

#[derive(Debug, Clone, Copy)]
pub struct ModelPaths {
    pub weights_url: &'static str,
    pub tokenizer_url: &'static str,
    pub config_url: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelType {
    Gpt2,
    DistilGpt2,
}

impl ModelType {
    pub fn all() -> impl Iterator<Item = ModelType> {
        [ModelType::Gpt2, ModelType::DistilGpt2].into_iter()
    }

    pub fn cli_name(&self) -> &'static str {
        match self {
            Self::Gpt2 => "gpt2",
            Self::DistilGpt2 => "distilgpt2",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Gpt2 => "GPT-2 (124M)",
            Self::DistilGpt2 => "DistilGPT-2 (82M)",
        }
    }

    /// Value of `model_type` the checkpoint's config is read as.
    pub fn config_model_type(&self) -> &'static str {
        self.cli_name()
    }

    pub fn from_cli_name(name: &str) -> Option<ModelType> {
        match name.to_lowercase().as_str() {
            "gpt2" | "gpt2_base_en" | "gpt2-small" | "openai-community/gpt2" => Some(Self::Gpt2),
            "distilgpt2" | "distilbert/distilgpt2" => Some(Self::DistilGpt2),
            _ => None,
        }
    }

    pub fn paths(&self) -> ModelPaths {
        match self {
            Self::Gpt2 => ModelPaths {
                weights_url: "https://huggingface.co/gpt2/resolve/main/model.safetensors",
                tokenizer_url: "https://huggingface.co/gpt2/resolve/main/tokenizer.json",
                config_url: "https://huggingface.co/gpt2/resolve/main/config.json",
            },
            Self::DistilGpt2 => ModelPaths {
                weights_url: "https://huggingface.co/distilgpt2/resolve/main/model.safetensors",
                tokenizer_url: "https://huggingface.co/distilgpt2/resolve/main/tokenizer.json",
                config_url: "https://huggingface.co/distilgpt2/resolve/main/config.json",
            },
        }
    }

    /// Hub repo id parsed from the weights URL.
    pub fn repo_id(&self) -> String {
        let url = self.paths().weights_url;
        url.trim_start_matches("https://huggingface.co/")
            .split("/resolve/")
            .next()
            .unwrap_or("unknown")
            .to_string()
    }

    pub fn cache_dir(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(self.repo_id().replace('/', "_"))
    }

    pub fn is_downloaded(&self, base_dir: &Path) -> bool {
        let dir = self.cache_dir(base_dir);
        [CONFIG_FILE, TOKENIZER_FILE, WEIGHTS_FILE]
            .iter()
            .all(|f| dir.join(f).exists())
    }
}

impl fmt::Display for ModelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.cli_name())
    }
}

impl std::str::FromStr for ModelType {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_cli_name(s).ok_or_else(|| ModelError::UnknownModel(s.to_string()))
    }
}

/// Fetches config, tokenizer and weights into `model_dir`, skipping files
/// that are already present. Returns the weights path.
pub async fn download_model_files(model_dir: &Path, paths: &ModelPaths) -> Result<PathBuf, ModelError> {
    tokio::fs::create_dir_all(model_dir)
        .await
        .map_err(|e| ModelError::ArtifactUnavailable {
            name: model_dir.display().to_string(),
            url: String::new(),
            reason: format!("cannot create cache directory: {}", e),
        })?;

    download_file(model_dir, CONFIG_FILE, paths.config_url).await?;
    download_file(model_dir, TOKENIZER_FILE, paths.tokenizer_url).await?;
    download_file(model_dir, WEIGHTS_FILE, paths.weights_url).await?;

    Ok(model_dir.join(WEIGHTS_FILE))
}

async fn download_file(model_dir: &Path, filename: &str, url: &str) -> Result<(), ModelError> {
    let local_path = model_dir.join(filename);
    if local_path.exists() {
        debug!("{} already cached at {:?}", filename, local_path);
        return Ok(());
    }

    let unavailable = |reason: String| ModelError::ArtifactUnavailable {
        name: filename.to_string(),
        url: url.to_string(),
        reason,
    };

    info!("Downloading {} from {}", filename, url);
    let client = reqwest::Client::new();
    let mut req = client.get(url);
    if let Ok(token) = std::env::var("HF_TOKEN") {
        req = req.header("Authorization", format!("Bearer {}", token));
    }

    let response = req.send().await.map_err(|e| unavailable(e.to_string()))?;
    if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
    }
    let bytes = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;

    // A partial file must never look cached.
    let partial = model_dir.join(format!("{}.part", filename));
    tokio::fs::write(&partial, &bytes)
        .await
        .map_err(|e| unavailable(format!("write failed: {}", e)))?;
    tokio::fs::rename(&partial, &local_path)
        .await
        .map_err(|e| unavailable(format!("rename failed: {}", e)))?;

    info!("Saved {} ({})", filename, format_size(bytes.len() / (1024 * 1024)));
    Ok(())
}

/// `DUOLAB_CACHE_DIR` if set, otherwise `<user cache dir>/duolab`.
pub fn get_default_cache_dir() -> Result<PathBuf, ModelError> {
    if let Ok(dir) = std::env::var("DUOLAB_CACHE_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::cache_dir()
        .map(|d| d.join("duolab"))
        .ok_or(ModelError::NoCacheDir)
}

pub fn format_size(mb: usize) -> String {
    if mb >= 1024 {
        format!("{:.1} GB", mb as f64 / 1024.0)
    } else {
        format!("{} MB", mb)
    }
}
