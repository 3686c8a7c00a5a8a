use anyhow::{Result, anyhow};
use log::{debug, info};
use ndarray::{Array2, Array3, ArrayView3};

use duolab_transformers::{
    Embeddings, FeedForward, LayerNorm, MultiHeadAttention, PrecisionPolicy,
    cache::{Cache, CpuKVCache},
    decoder::{CpuDecoder, DecoderInput},
    weights::ModelWeights,
};

use crate::models::gpt2::config::{Gpt2Config, Gpt2WeightNames};

/// Pre-norm transformer block: `x + attn(ln_1(x))`, then `x + mlp(ln_2(x))`.
pub struct Gpt2Block {
    pub ln_1: LayerNorm,
    pub attn: MultiHeadAttention,
    pub ln_2: LayerNorm,
    pub mlp: FeedForward,
}

impl Gpt2Block {
    /// Returns the block output and this step's new keys and values.
    pub fn forward(
        &self,
        hidden_states: &Array3<f32>,
        attention_mask: &Array2<f32>,
        past_kv: Option<(ArrayView3<f32>, ArrayView3<f32>)>,
    ) -> Result<(Array3<f32>, (Array3<f32>, Array3<f32>))> {
        let normed = self.ln_1.forward(&hidden_states.view());
        let (attn_out, new_k, new_v) =
            self.attn
                .forward_with_cache(&normed.view(), Some(attention_mask), past_kv)?;
        let hidden = hidden_states + &attn_out;

        let normed = self.ln_2.forward(&hidden.view());
        let mlp_out = self.mlp.forward(&normed.view())?;
        Ok((hidden + &mlp_out, (new_k, new_v)))
    }
}

/// The CPU implementation of the GPT-2 decoder stack.
pub struct Gpt2CpuDecoder {
    pub embeddings: Embeddings,
    pub layers: Vec<Gpt2Block>,
    pub final_layer_norm: LayerNorm,
    precision: PrecisionPolicy,
}

impl Gpt2CpuDecoder {
    pub fn new(weights: &ModelWeights, config: &Gpt2Config, precision: PrecisionPolicy) -> Result<Self> {
        info!("Building GPT-2 CPU decoder ({} layers, precision {})", config.n_layer, precision);
        let names = Gpt2WeightNames::detect(weights);
        debug!("  weight prefix: '{}'", names.prefix());

        let embeddings = Embeddings::from_weights(
            weights,
            &names.token_embedding(),
            Some(&names.position_embedding()),
        )?;
        if embeddings.hidden_size() != config.n_embd {
            return Err(anyhow!(
                "token embedding width {} differs from n_embd {}",
                embeddings.hidden_size(),
                config.n_embd
            ));
        }

        let final_layer_norm =
            LayerNorm::from_weights(weights, &names.final_norm(), config.layer_norm_epsilon)?;

        let layers = (0..config.n_layer)
            .map(|i| Self::build_layer(weights, config, &names, i))
            .collect::<Result<Vec<_>>>()?;

        debug!("Gpt2CpuDecoder built successfully");

        Ok(Self {
            embeddings,
            layers,
            final_layer_norm,
            precision,
        })
    }

    fn build_layer(
        weights: &ModelWeights,
        config: &Gpt2Config,
        names: &Gpt2WeightNames,
        layer_idx: usize,
    ) -> Result<Gpt2Block> {
        let lp = names.layer(layer_idx);
        debug!("  loading {}", lp);

        // Fused QKV, Conv1D layout [hidden, 3 * hidden].
        let attn = MultiHeadAttention::from_fused_qkv(
            config.n_head,
            weights.get_array2(&format!("{}.attn.c_attn.weight", lp))?,
            weights.get_array1(&format!("{}.attn.c_attn.bias", lp))?,
            weights.get_array2(&format!("{}.attn.c_proj.weight", lp))?,
            weights.get_array1(&format!("{}.attn.c_proj.bias", lp))?,
        )?;

        let mlp = FeedForward::new(
            weights.get_array2(&format!("{}.mlp.c_fc.weight", lp))?,
            weights.get_array1(&format!("{}.mlp.c_fc.bias", lp))?,
            weights.get_array2(&format!("{}.mlp.c_proj.weight", lp))?,
            weights.get_array1(&format!("{}.mlp.c_proj.bias", lp))?,
            config.activation(),
        )?;
        if mlp.intermediate_size() != config.intermediate_size() {
            return Err(anyhow!(
                "{}: MLP width {} differs from configured {}",
                lp,
                mlp.intermediate_size(),
                config.intermediate_size()
            ));
        }

        Ok(Gpt2Block {
            ln_1: LayerNorm::from_weights(weights, &format!("{}.ln_1", lp), config.layer_norm_epsilon)?,
            attn,
            ln_2: LayerNorm::from_weights(weights, &format!("{}.ln_2", lp), config.layer_norm_epsilon)?,
            mlp,
        })
    }

    pub fn precision(&self) -> PrecisionPolicy {
        self.precision
    }
}

impl CpuDecoder for Gpt2CpuDecoder {
    fn embed(&self, input: DecoderInput<'_>, position_offset: usize) -> Result<Array3<f32>> {
        let mut hidden = match input {
            DecoderInput::Tokens(ids) => {
                let input_ids = Array2::from_shape_vec((1, ids.len()), ids.to_vec())?;
                // Absolute position embeddings, so the offset matters.
                self.embeddings.forward(&input_ids, position_offset)?
            }
        };
        self.precision.round_inplace(&mut hidden);
        Ok(hidden)
    }

    fn forward_layers(
        &self,
        hidden_states: &Array3<f32>,
        attention_mask: &Array2<f32>,
        position_offset: usize,
        cache: Option<&mut dyn Cache>,
    ) -> Result<Array3<f32>> {
        let mut hidden = hidden_states.clone();
        let seq_len = hidden.shape()[1];

        let mut cpu_cache = match cache {
            Some(c) => Some(
                c.as_any_mut()
                    .downcast_mut::<CpuKVCache>()
                    .ok_or_else(|| anyhow!("GPT-2 CPU decoder requires a CpuKVCache"))?,
            ),
            None => None,
        };
        if let Some(c) = cpu_cache.as_ref() {
            if c.get_seq_length() != position_offset {
                return Err(anyhow!(
                    "cache holds {} positions but the step starts at {}",
                    c.get_seq_length(),
                    position_offset
                ));
            }
        }

        let mut new_key_values = Vec::with_capacity(self.layers.len());
        for (i, layer) in self.layers.iter().enumerate() {
            let past_kv = cpu_cache.as_ref().and_then(|c| c.get(i));
            let (new_hidden, kv) = layer.forward(&hidden, attention_mask, past_kv)?;
            hidden = new_hidden;
            self.precision.round_inplace(&mut hidden);
            new_key_values.push(kv);
        }

        if let Some(cache) = cpu_cache.as_mut() {
            for (i, (k, v)) in new_key_values.iter().enumerate() {
                cache.update(i, k, v)?;
            }
            cache.increment_len(seq_len);
        }

        Ok(hidden)
    }

    fn final_norm(&self, hidden_states: &Array3<f32>) -> Result<Array3<f32>> {
        let mut out = self.final_layer_norm.forward(&hidden_states.view());
        self.precision.round_inplace(&mut out);
        Ok(out)
    }

    fn num_layers(&self) -> usize {
        self.layers.len()
    }
}
