use crate::activations::softmax_1d_inplace;
use crate::common::DecodingStrategy;
use anyhow::{Result, anyhow};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// A seeded RNG when `seed` is given, otherwise one seeded from OS entropy.
pub fn seeded_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    }
}

/// Divides positive logits and multiplies negative ones for every token
/// already in `tokens`.
pub fn apply_repetition_penalty_mut(logits: &mut Array1<f32>, tokens: &[u32], penalty: f32) {
    if penalty == 1.0 {
        return;
    }
    for &token in tokens {
        let idx = token as usize;
        if idx < logits.len() {
            let score = logits[idx];
            logits[idx] = if score < 0.0 { score * penalty } else { score / penalty };
        }
    }
}

fn sorted_desc(logits: &Array1<f32>) -> Vec<usize> {
    let mut indices: Vec<usize> = (0..logits.len()).collect();
    indices.sort_by(|&a, &b| logits[b].total_cmp(&logits[a]));
    indices
}

/// Masks all but the `k` highest logits to `-inf`.
pub fn top_k_filtering(mut logits: Array1<f32>, k: usize) -> Array1<f32> {
    if k == 0 || k >= logits.len() {
        return logits;
    }
    let indices = sorted_desc(&logits);
    for &idx in &indices[k..] {
        logits[idx] = f32::NEG_INFINITY;
    }
    logits
}

/// Keeps the smallest set of tokens whose cumulative probability exceeds `p`.
pub fn top_p_filtering(mut logits: Array1<f32>, p: f32) -> Array1<f32> {
    if p >= 1.0 {
        return logits;
    }
    let indices = sorted_desc(&logits);
    let mut probs = logits.clone();
    softmax_1d_inplace(&mut probs);

    let mut cumulative = 0.0;
    for (i, &idx) in indices.iter().enumerate() {
        cumulative += probs[idx];
        if cumulative > p {
            for &dropped in &indices[i + 1..] {
                logits[dropped] = f32::NEG_INFINITY;
            }
            break;
        }
    }
    logits
}

/// Inverse-CDF draw from a normalized distribution.
pub fn sample_from_probs<R: Rng + ?Sized>(probs: &Array1<f32>, rng: &mut R) -> Result<u32> {
    if probs.is_empty() {
        return Err(anyhow!("cannot sample from an empty distribution"));
    }
    let uniform: f32 = rng.gen();
    let mut cumulative = 0.0;
    let mut last_nonzero = 0;
    for (idx, &prob) in probs.iter().enumerate() {
        if prob > 0.0 {
            last_nonzero = idx;
        }
        cumulative += prob;
        if cumulative >= uniform && prob > 0.0 {
            return Ok(idx as u32);
        }
    }
    Ok(last_nonzero as u32)
}

pub fn argmax(logits: &Array1<f32>) -> Result<u32> {
    logits
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map(|(idx, _)| idx as u32)
        .ok_or_else(|| anyhow!("cannot take argmax of empty logits"))
}

fn sample_with_temperature<R: Rng + ?Sized>(mut logits: Array1<f32>, temperature: f32, rng: &mut R) -> Result<u32> {
    let temp = if temperature < 1e-5 { 1.0 } else { temperature };
    logits /= temp;
    softmax_1d_inplace(&mut logits);
    sample_from_probs(&logits, rng)
}

/// Picks the next token from last-position logits.
pub fn sample_token<R: Rng + ?Sized>(logits: Array1<f32>, strategy: &DecodingStrategy, rng: &mut R) -> Result<u32> {
    match strategy {
        DecodingStrategy::Greedy => argmax(&logits),
        DecodingStrategy::TopK { k, temperature } => {
            sample_with_temperature(top_k_filtering(logits, *k), *temperature, rng)
        }
        DecodingStrategy::Sample(params) => {
            let mut logits = logits;
            if let Some(k) = params.top_k {
                logits = top_k_filtering(logits, k);
            }
            if let Some(p) = params.top_p {
                logits = top_p_filtering(logits, p);
            }
            sample_with_temperature(logits, params.temperature, rng)
        }
    }
}
