use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, anyhow};
use log::{info, warn};
use ndarray::Array3;
use tokenizers::Tokenizer;

use duolab_transformers::{
    cache::{Cache, CpuKVCache},
    decoder::{CpuDecoder, DecoderLanguageModel},
    models::{LanguageModel, ModelError, ModelLoadConfig, ModelType, download_model_files, get_default_cache_dir},
    precision::PrecisionPolicy,
    utils::linear_algebra::matmul_3d_2d,
    weights::ModelWeights,
};

use crate::models::gpt2::{config::Gpt2Config, cpu_decoder::Gpt2CpuDecoder};

/// A model container for GPT-2 and DistilGPT2.
///
/// Holds the decoder, tokenizer and config; generation is delegated to
/// `DecoderGenerator`.
pub struct Gpt2Model {
    decoder: Gpt2CpuDecoder,
    tokenizer: Tokenizer,
    config: Arc<Gpt2Config>,
    model_type: ModelType,
    context_size: usize,
}

impl Gpt2Model {
    const SUPPORTED_MODELS: &'static [ModelType] = &[ModelType::Gpt2, ModelType::DistilGpt2];

    pub fn concrete_config(&self) -> &Arc<Gpt2Config> {
        &self.config
    }

    pub fn model_type(&self) -> ModelType {
        self.model_type
    }

    /// Downloads the checkpoint into the cache (skipping cached files) and
    /// loads it.
    pub async fn from_registry(
        model_type: ModelType,
        cache_dir: Option<PathBuf>,
        load_config: ModelLoadConfig,
    ) -> Result<Self> {
        if !Self::SUPPORTED_MODELS.contains(&model_type) {
            return Err(anyhow!("Unsupported GPT-2 model type: {:?}", model_type));
        }

        let cache_dir = match cache_dir {
            Some(dir) => dir,
            None => get_default_cache_dir()?,
        };
        let model_dir = model_type.cache_dir(&cache_dir);

        download_model_files(&model_dir, &model_type.paths()).await?;
        Self::from_pretrained(&model_dir, model_type, load_config)
    }

    /// Loads from a local directory holding `config.json`, `tokenizer.json`
    /// and `model.safetensors`.
    pub fn from_pretrained(model_path: &Path, model_type: ModelType, load_config: ModelLoadConfig) -> Result<Self> {
        for file in ["config.json", "tokenizer.json"] {
            if !model_path.join(file).exists() {
                return Err(ModelError::IncompleteModelDir(model_path.to_path_buf()).into());
            }
        }

        let weights = ModelWeights::new(model_path)?;
        let tokenizer = Tokenizer::from_file(model_path.join("tokenizer.json")).map_err(|e| anyhow!(e))?;
        let config = Arc::new(Gpt2Config::from_json(weights.config_json())?);

        if config.model_type != "gpt2" && config.model_type != model_type.config_model_type() {
            warn!(
                "config declares model_type '{}', loading as {}",
                config.model_type, model_type
            );
        }

        let decoder = Gpt2CpuDecoder::new(&weights, &config, load_config.precision)?;
        if decoder.embeddings.vocab_size() != config.vocab_size {
            return Err(anyhow!(
                "token embedding has {} rows, config vocab_size is {}",
                decoder.embeddings.vocab_size(),
                config.vocab_size
            ));
        }

        let context_size = match load_config.max_sequence_length {
            Some(cap) => cap.min(config.max_positions()),
            None => config.max_positions(),
        };

        info!(
            "Loaded {} from {:?}: {} layers, {} heads, hidden {}, context {}",
            model_type.display_name(),
            model_path,
            config.n_layer,
            config.n_head,
            config.n_embd,
            context_size
        );

        Ok(Self {
            decoder,
            tokenizer,
            config,
            model_type,
            context_size,
        })
    }
}

impl LanguageModel for Gpt2Model {
    fn vocab_size(&self) -> usize {
        self.config.vocab_size
    }

    fn hidden_size(&self) -> usize {
        self.config.n_embd
    }

    fn num_layers(&self) -> usize {
        self.config.n_layer
    }

    fn num_heads(&self) -> usize {
        self.config.n_head
    }

    fn context_size(&self) -> usize {
        self.context_size
    }

    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    // GPT-2 uses <|endoftext|> for BOS, EOS and padding.
    fn eos_token_id(&self) -> Option<u32> {
        Some(self.config.eos_token_id)
    }

    fn bos_token_id(&self) -> Option<u32> {
        Some(self.config.bos_token_id)
    }

    fn pad_token_id(&self) -> Option<u32> {
        Some(self.config.eos_token_id)
    }

    fn new_cache(&self, batch_size: usize, max_len: usize) -> Result<Box<dyn Cache>> {
        Ok(Box::new(CpuKVCache::new(
            self.decoder.num_layers(),
            batch_size,
            max_len,
            self.config.n_embd,
        )))
    }
}

impl DecoderLanguageModel for Gpt2Model {
    fn decoder(&self) -> &dyn CpuDecoder {
        &self.decoder
    }

    /// LM head tied to the token embedding: `hidden · wteᵀ`.
    fn project_to_logits(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        let wte = &self.decoder.embeddings.word_embeddings;
        let mut logits = matmul_3d_2d(&hidden_states.view(), &wte.t())?;
        self.decoder.precision().round_inplace(&mut logits);
        Ok(logits)
    }

    fn precision(&self) -> PrecisionPolicy {
        self.decoder.precision()
    }
}
