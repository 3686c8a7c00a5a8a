use anyhow::{Result, anyhow};
use duolab_transformers::activations::Activation;
use duolab_transformers::weights::ModelWeights;
use log::warn;
use serde::Deserialize;

const DEFAULT_POSITIONS: usize = 1024;
const GPT2_ENDOFTEXT: u32 = 50256;

#[derive(Debug, Clone, Deserialize)]
pub struct Gpt2Config {
    pub vocab_size: usize,
    #[serde(default)]
    pub n_ctx: Option<usize>, // max sequence length, older configs
    #[serde(default)]
    pub n_positions: Option<usize>,
    pub n_embd: usize,  // hidden size
    pub n_layer: usize, // number of layers
    pub n_head: usize,  // number of attention heads
    #[serde(default)]
    pub n_inner: Option<usize>,
    #[serde(default = "default_layer_norm_epsilon")]
    pub layer_norm_epsilon: f32,

    #[serde(default)]
    pub activation_function: Option<String>,

    #[serde(default = "default_model_type")]
    pub model_type: String,

    #[serde(default = "default_special_token")]
    pub bos_token_id: u32,
    #[serde(default = "default_special_token")]
    pub eos_token_id: u32,
}

fn default_model_type() -> String {
    "gpt2".to_string()
}

fn default_layer_norm_epsilon() -> f32 {
    1e-5
}

fn default_special_token() -> u32 {
    GPT2_ENDOFTEXT
}

impl Gpt2Config {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.n_head == 0 || self.n_embd % self.n_head != 0 {
            return Err(anyhow!(
                "n_embd ({}) must be divisible by n_head ({})",
                self.n_embd,
                self.n_head
            ));
        }
        if self.n_layer == 0 {
            return Err(anyhow!("config declares zero layers"));
        }
        Ok(())
    }

    /// Number of learned position embeddings.
    pub fn max_positions(&self) -> usize {
        self.n_positions.or(self.n_ctx).unwrap_or(DEFAULT_POSITIONS)
    }

    pub fn intermediate_size(&self) -> usize {
        self.n_inner.unwrap_or(4 * self.n_embd)
    }

    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    pub fn activation(&self) -> Activation {
        match self.activation_function.as_deref() {
            None => Activation::GeluNew,
            Some(name) => name.parse().unwrap_or_else(|e| {
                warn!("{}; falling back to gelu_new", e);
                Activation::GeluNew
            }),
        }
    }
}

/// Tensor names of a GPT-2 checkpoint. DistilGPT2 exports nest everything
/// under `transformer.`; plain GPT-2 exports do not.
#[derive(Debug, Clone)]
pub struct Gpt2WeightNames {
    prefix: &'static str,
}

impl Gpt2WeightNames {
    pub fn detect(weights: &ModelWeights) -> Self {
        let prefix = if weights.contains("transformer.wte.weight") {
            "transformer."
        } else {
            ""
        };
        Self { prefix }
    }

    pub fn prefix(&self) -> &str {
        self.prefix
    }

    pub fn token_embedding(&self) -> String {
        format!("{}wte.weight", self.prefix)
    }

    pub fn position_embedding(&self) -> String {
        format!("{}wpe.weight", self.prefix)
    }

    pub fn final_norm(&self) -> String {
        format!("{}ln_f", self.prefix)
    }

    /// Prefix of block `i`, e.g. `h.3`.
    pub fn layer(&self, i: usize) -> String {
        format!("{}h.{}", self.prefix, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const GPT2_CONFIG_JSON: &str = r#"{
        "activation_function": "gelu_new",
        "vocab_size": 50257,
        "n_ctx": 1024,
        "n_positions": 1024,
        "n_embd": 768,
        "n_layer": 12,
        "n_head": 12,
        "layer_norm_epsilon": 1e-5,
        "bos_token_id": 50256,
        "eos_token_id": 50256,
        "model_type": "gpt2"
    }"#;

    const DISTILGPT2_CONFIG_JSON: &str = r#"{
        "model_type": "gpt2",
        "vocab_size": 50257,
        "n_ctx": 1024,
        "n_embd": 768,
        "n_layer": 6,
        "n_head": 12
    }"#;

    #[test]
    fn test_gpt2_config() {
        let config = Gpt2Config::from_json(GPT2_CONFIG_JSON).unwrap();
        assert_eq!(config.max_positions(), 1024);
        assert_eq!(config.intermediate_size(), 3072);
        assert_eq!(config.head_dim(), 64);
        assert_eq!(config.activation(), Activation::GeluNew);
        assert_eq!(config.eos_token_id, 50256);
    }

    #[test]
    fn test_distilgpt2_defaults() {
        let config = Gpt2Config::from_json(DISTILGPT2_CONFIG_JSON).unwrap();
        assert_eq!(config.n_layer, 6);
        assert_eq!(config.layer_norm_epsilon, 1e-5);
        assert_eq!(config.bos_token_id, 50256);
        assert_eq!(config.activation(), Activation::GeluNew);
    }

    #[test]
    fn test_n_positions_preferred_over_n_ctx() {
        let json = r#"{"vocab_size": 10, "n_ctx": 64, "n_positions": 32, "n_embd": 8, "n_layer": 1, "n_head": 2}"#;
        assert_eq!(Gpt2Config::from_json(json).unwrap().max_positions(), 32);
    }

    #[test]
    fn test_unknown_activation_falls_back() {
        let json = r#"{"vocab_size": 10, "n_embd": 8, "n_layer": 1, "n_head": 2, "activation_function": "swish"}"#;
        assert_eq!(Gpt2Config::from_json(json).unwrap().activation(), Activation::GeluNew);
    }

    #[test]
    fn test_indivisible_heads_rejected() {
        let json = r#"{"vocab_size": 10, "n_embd": 10, "n_layer": 1, "n_head": 3}"#;
        assert!(Gpt2Config::from_json(json).is_err());
    }
}
