use std::fmt;
use std::time::Instant;

use anyhow::{Result, anyhow};
use log::{debug, info, warn};
use ndarray::{Array1, Array3, Axis, s};

use crate::cache::Cache;
use crate::common::{GenerationConfig, apply_repetition_penalty_mut, sample_token, seeded_rng};
use crate::decoder::traits::{DecoderInput, DecoderLanguageModel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// Prompt plus continuation reached the requested length.
    MaxLength,
    /// The model emitted a stop token.
    EndOfText,
    /// The model's context window is full.
    ContextWindow,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StopReason::MaxLength => "max length",
            StopReason::EndOfText => "end of text",
            StopReason::ContextWindow => "context window",
        })
    }
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    /// Decoded prompt plus continuation, special tokens removed.
    pub text: String,
    pub prompt_tokens: Vec<u32>,
    pub generated_tokens: Vec<u32>,
    pub stop_reason: StopReason,
}

impl GenerationOutput {
    pub fn total_tokens(&self) -> usize {
        self.prompt_tokens.len() + self.generated_tokens.len()
    }
}

/// Drives prefill and token-by-token decoding for any decoder-only model.
pub struct DecoderGenerator {
    pub model: Box<dyn DecoderLanguageModel>,
}

impl DecoderGenerator {
    pub fn new(model: Box<dyn DecoderLanguageModel>) -> Self {
        Self { model }
    }

    fn encode_prompt(&self, prompt: &str, config: &GenerationConfig) -> Result<Vec<u32>> {
        let mut tokens = self.model.tokenize(prompt)?;

        let bos = self.model.bos_token_id();
        if config.add_bos_token || tokens.is_empty() {
            match bos {
                Some(id) if tokens.first() != Some(&id) => tokens.insert(0, id),
                Some(_) => {}
                None if tokens.is_empty() => {
                    return Err(anyhow!("empty prompt and the model defines no BOS token"));
                }
                None => warn!("BOS token requested but the model defines none"),
            }
        }
        Ok(tokens)
    }

    /// Runs the model over `tokens` starting at `position_offset` and returns
    /// logits for the last position only.
    fn step(&self, tokens: &[u32], position_offset: usize, cache: &mut dyn Cache) -> Result<Array1<f32>> {
        let mask = self.model.get_attention_mask(tokens.len(), position_offset)?;
        let hidden = self
            .model
            .decoder()
            .forward(DecoderInput::Tokens(tokens), &mask, position_offset, Some(cache))?;

        let last: Array3<f32> = hidden.slice(s![.., -1.., ..]).to_owned();
        let logits = self.model.project_to_logits(&last)?;
        Ok(logits.index_axis(Axis(0), 0).index_axis(Axis(0), 0).to_owned())
    }

    pub fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<GenerationOutput> {
        debug!("Starting generation for prompt: '{}'", prompt);

        let mut tokens = self.encode_prompt(prompt, config)?;
        let prompt_len = tokens.len();
        let context_limit = self.model.context_size();

        if prompt_len > context_limit {
            return Err(anyhow!(
                "prompt is {} tokens but the context window holds {}",
                prompt_len,
                context_limit
            ));
        }

        let max_len = match config.max_new_tokens {
            Some(n) => config.max_length.min(prompt_len + n),
            None => config.max_length,
        };

        let finish = |tokens: Vec<u32>, stop_reason: StopReason| -> Result<GenerationOutput> {
            let text = self
                .model
                .tokenizer()
                .decode(&tokens, true)
                .map_err(|e| anyhow!("decoding failed: {}", e))?;
            Ok(GenerationOutput {
                text,
                generated_tokens: tokens[prompt_len..].to_vec(),
                prompt_tokens: tokens[..prompt_len].to_vec(),
                stop_reason,
            })
        };

        if prompt_len >= max_len {
            info!("Prompt already has {} tokens (max length {}), nothing to generate", prompt_len, max_len);
            return finish(tokens, StopReason::MaxLength);
        }

        info!(
            "Generating up to {} tokens ({} prompt) with {:?}, precision {}",
            max_len,
            prompt_len,
            config.strategy,
            self.model.precision()
        );

        let mut cache = self.model.new_cache(1, max_len.min(context_limit))?;
        let mut rng = seeded_rng(config.seed);
        let stop_tokens = self.model.stop_token_ids();

        let t_prefill = Instant::now();
        let mut next_logits = self.step(&tokens, 0, cache.as_mut())?;
        info!("Prefill of {} tokens took {:.2}ms", prompt_len, t_prefill.elapsed().as_secs_f64() * 1000.0);

        let t_decode = Instant::now();
        let stop_reason = loop {
            let mut logits = next_logits;
            apply_repetition_penalty_mut(&mut logits, &tokens, config.repetition_penalty);
            let next = sample_token(logits, &config.strategy, &mut rng)?;
            tokens.push(next);

            if stop_tokens.contains(&next) {
                debug!("Stop token generated: {}", next);
                break StopReason::EndOfText;
            }
            if tokens.len() >= max_len {
                break StopReason::MaxLength;
            }
            if tokens.len() >= context_limit {
                warn!("Context limit reached ({}), stopping", context_limit);
                break StopReason::ContextWindow;
            }

            let past = tokens.len() - 1;
            next_logits = self.step(&tokens[past..], past, cache.as_mut())?;
        };

        let generated = tokens.len() - prompt_len;
        let secs = t_decode.elapsed().as_secs_f64();
        if secs > 0.0 {
            info!("Generated {} tokens in {:.3}s ({:.2} tok/s), stop: {}", generated, secs, generated as f64 / secs, stop_reason);
        }

        finish(tokens, stop_reason)
    }
}
