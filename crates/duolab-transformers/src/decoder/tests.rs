use std::str::FromStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ndarray::{Array2, Array3};
use tokenizers::Tokenizer;

use super::*;
use crate::cache::{Cache, CpuKVCache};
use crate::common::{DecodingStrategy, GenerationConfig};
use crate::models::LanguageModel;
use crate::precision::PrecisionPolicy;

const WORDS: [&str; 10] = [
    "zero", "one", "two", "three", "four", "five", "six", "seven", "eight", "nine",
];
const EOS: u32 = 10;

fn word_level_tokenizer() -> Tokenizer {
    let vocab: Vec<String> = WORDS
        .iter()
        .enumerate()
        .map(|(i, w)| format!("\"{}\": {}", w, i))
        .collect();
    let json = format!(
        r#"{{
            "version": "1.0",
            "truncation": null,
            "padding": null,
            "added_tokens": [
                {{"id": {eos}, "content": "<eos>", "single_word": false, "lstrip": false,
                  "rstrip": false, "normalized": false, "special": true}}
            ],
            "normalizer": null,
            "pre_tokenizer": {{"type": "Whitespace"}},
            "post_processor": null,
            "decoder": null,
            "model": {{
                "type": "WordLevel",
                "vocab": {{ {vocab}, "<eos>": {eos} }},
                "unk_token": "<eos>"
            }}
        }}"#,
        eos = EOS,
        vocab = vocab.join(", ")
    );
    Tokenizer::from_str(&json).unwrap()
}

/// Hidden state is the token id itself; the next token is always `id + 1`,
/// and "nine" is followed by `<eos>`.
struct CountingDecoder {
    offsets: Arc<Mutex<Vec<usize>>>,
}

impl CpuDecoder for CountingDecoder {
    fn embed(&self, input: DecoderInput<'_>, position_offset: usize) -> Result<Array3<f32>> {
        self.offsets.lock().unwrap().push(position_offset);
        let DecoderInput::Tokens(ids) = input;
        Ok(Array3::from_shape_fn((1, ids.len(), 1), |(_, t, _)| ids[t] as f32))
    }

    fn forward_layers(
        &self,
        hidden_states: &Array3<f32>,
        attention_mask: &Array2<f32>,
        position_offset: usize,
        cache: Option<&mut dyn Cache>,
    ) -> Result<Array3<f32>> {
        let seq = hidden_states.shape()[1];
        assert_eq!(attention_mask.shape(), &[1, position_offset + seq]);
        if let Some(cache) = cache {
            assert_eq!(cache.get_seq_length(), position_offset);
            cache.increment_len(seq);
        }
        Ok(hidden_states.clone())
    }

    fn final_norm(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        Ok(hidden_states.clone())
    }

    fn num_layers(&self) -> usize {
        1
    }
}

struct CountingModel {
    decoder: CountingDecoder,
    tokenizer: Tokenizer,
    context: usize,
    bos: Option<u32>,
}

impl CountingModel {
    fn new(context: usize) -> Self {
        Self {
            decoder: CountingDecoder {
                offsets: Arc::new(Mutex::new(Vec::new())),
            },
            tokenizer: word_level_tokenizer(),
            context,
            bos: Some(EOS),
        }
    }
}

impl LanguageModel for CountingModel {
    fn vocab_size(&self) -> usize {
        WORDS.len() + 1
    }
    fn hidden_size(&self) -> usize {
        1
    }
    fn num_layers(&self) -> usize {
        1
    }
    fn num_heads(&self) -> usize {
        1
    }
    fn context_size(&self) -> usize {
        self.context
    }
    fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }
    fn eos_token_id(&self) -> Option<u32> {
        Some(EOS)
    }
    fn bos_token_id(&self) -> Option<u32> {
        self.bos
    }
    fn pad_token_id(&self) -> Option<u32> {
        None
    }
    fn new_cache(&self, batch_size: usize, max_len: usize) -> Result<Box<dyn Cache>> {
        Ok(Box::new(CpuKVCache::new(1, batch_size, max_len, 1)))
    }
}

impl DecoderLanguageModel for CountingModel {
    fn decoder(&self) -> &dyn CpuDecoder {
        &self.decoder
    }

    fn project_to_logits(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        let (b, s, _) = hidden_states.dim();
        let vocab = self.vocab_size();
        Ok(Array3::from_shape_fn((b, s, vocab), |(bi, si, v)| {
            let id = hidden_states[[bi, si, 0]] as usize;
            let next = if id >= EOS as usize { 0 } else { id + 1 };
            if v == next { 10.0 } else { 0.0 }
        }))
    }

    fn precision(&self) -> PrecisionPolicy {
        PrecisionPolicy::Float32
    }
}

fn generator(context: usize) -> DecoderGenerator {
    DecoderGenerator::new(Box::new(CountingModel::new(context)))
}

#[test]
fn test_stops_at_max_length() -> Result<()> {
    let out = generator(64).generate("one two", &GenerationConfig::greedy(5))?;
    assert_eq!(out.text, "one two three four five");
    assert_eq!(out.prompt_tokens, vec![1, 2]);
    assert_eq!(out.generated_tokens, vec![3, 4, 5]);
    assert_eq!(out.stop_reason, StopReason::MaxLength);
    assert_eq!(out.total_tokens(), 5);
    Ok(())
}

#[test]
fn test_stops_at_end_of_text() -> Result<()> {
    let out = generator(64).generate("seven", &GenerationConfig::greedy(50))?;
    assert_eq!(out.stop_reason, StopReason::EndOfText);
    assert_eq!(out.generated_tokens, vec![8, 9, EOS]);
    assert_eq!(out.text, "seven eight nine");
    Ok(())
}

#[test]
fn test_stops_at_context_window() -> Result<()> {
    let out = generator(4).generate("zero", &GenerationConfig::greedy(50))?;
    assert_eq!(out.stop_reason, StopReason::ContextWindow);
    assert_eq!(out.total_tokens(), 4);
    Ok(())
}

#[test]
fn test_max_new_tokens_is_tighter_bound() -> Result<()> {
    let config = GenerationConfig {
        max_new_tokens: Some(2),
        ..GenerationConfig::greedy(50)
    };
    let out = generator(64).generate("zero", &config)?;
    assert_eq!(out.generated_tokens, vec![1, 2]);
    assert_eq!(out.stop_reason, StopReason::MaxLength);
    Ok(())
}

#[test]
fn test_prompt_at_max_length_generates_nothing() -> Result<()> {
    let out = generator(64).generate("one two three", &GenerationConfig::greedy(2))?;
    assert!(out.generated_tokens.is_empty());
    assert_eq!(out.text, "one two three");
    assert_eq!(out.stop_reason, StopReason::MaxLength);
    Ok(())
}

#[test]
fn test_prompt_longer_than_context_is_error() {
    assert!(generator(2).generate("one two three", &GenerationConfig::greedy(50)).is_err());
}

#[test]
fn test_top_k_of_one_matches_greedy() -> Result<()> {
    let config = GenerationConfig {
        strategy: DecodingStrategy::TopK { k: 1, temperature: 1.0 },
        seed: Some(7),
        ..GenerationConfig::greedy(6)
    };
    let out = generator(64).generate("two", &config)?;
    assert_eq!(out.generated_tokens, vec![3, 4, 5, 6, 7]);
    Ok(())
}

#[test]
fn test_empty_prompt_starts_from_bos() -> Result<()> {
    let out = generator(64).generate("", &GenerationConfig::greedy(3))?;
    assert_eq!(out.prompt_tokens, vec![EOS]);
    assert_eq!(out.generated_tokens, vec![0, 1]);
    assert_eq!(out.text, "zero one");
    Ok(())
}

#[test]
fn test_bos_is_prepended_and_counted() -> Result<()> {
    let config = GenerationConfig {
        add_bos_token: true,
        ..GenerationConfig::greedy(5)
    };
    let out = generator(64).generate("one two", &config)?;
    assert_eq!(out.prompt_tokens[0], EOS);
    assert_eq!(out.prompt_tokens, vec![EOS, 1, 2]);
    assert_eq!(out.generated_tokens, vec![3, 4]);
    assert_eq!(out.total_tokens(), 5);
    assert_eq!(out.text, "one two three four");
    Ok(())
}

#[test]
fn test_empty_prompt_without_bos_is_error() {
    let mut model = CountingModel::new(64);
    model.bos = None;
    let generator = DecoderGenerator::new(Box::new(model));
    assert!(generator.generate("", &GenerationConfig::greedy(3)).is_err());
}

#[test]
fn test_prefill_then_one_token_per_step() -> Result<()> {
    let model = CountingModel::new(64);
    let offsets = Arc::clone(&model.decoder.offsets);
    let generator = DecoderGenerator::new(Box::new(model));

    generator.generate("one two", &GenerationConfig::greedy(5))?;
    assert_eq!(*offsets.lock().unwrap(), vec![0, 2, 3]);
    Ok(())
}

#[test]
fn test_get_logits_scores_every_position() -> Result<()> {
    let model = CountingModel::new(64);
    let logits = model.get_logits("three four")?;
    assert_eq!(logits.shape(), &[1, 2, WORDS.len() + 1]);
    assert_eq!(logits[[0, 0, 4]], 10.0);
    assert_eq!(logits[[0, 1, 5]], 10.0);
    Ok(())
}
