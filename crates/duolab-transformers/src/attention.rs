//! Causal multi-head self-attention with KV caching.

use anyhow::{Result, anyhow};
use ndarray::{Array1, Array2, Array3, ArrayView3, Axis, s};

use crate::activations::softmax_last_axis_inplace;
use crate::utils::linear_algebra::{matmul_3d_2d, matmul_4d};
use crate::utils::masks::{apply_causal_mask, apply_padding_mask};

/// Weights are stored as `[in_features, out_features]`.
#[derive(Debug, Clone)]
pub struct MultiHeadAttention {
    pub q_weight: Array2<f32>,
    pub q_bias: Array1<f32>,
    pub k_weight: Array2<f32>,
    pub k_bias: Array1<f32>,
    pub v_weight: Array2<f32>,
    pub v_bias: Array1<f32>,
    pub output_weight: Array2<f32>,
    pub output_bias: Array1<f32>,

    pub num_heads: usize,
    pub head_dim: usize,
    pub scale_factor: f32,
}

impl MultiHeadAttention {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        hidden_size: usize,
        num_heads: usize,
        q_weight: Array2<f32>,
        q_bias: Array1<f32>,
        k_weight: Array2<f32>,
        k_bias: Array1<f32>,
        v_weight: Array2<f32>,
        v_bias: Array1<f32>,
        output_weight: Array2<f32>,
        output_bias: Array1<f32>,
    ) -> Result<Self> {
        if num_heads == 0 || hidden_size % num_heads != 0 {
            return Err(anyhow!(
                "hidden size {} is not divisible by {} heads",
                hidden_size,
                num_heads
            ));
        }
        for (name, w) in [
            ("q", &q_weight),
            ("k", &k_weight),
            ("v", &v_weight),
            ("output", &output_weight),
        ] {
            if w.dim() != (hidden_size, hidden_size) {
                return Err(anyhow!(
                    "{} projection has shape {:?}, expected [{}, {}]",
                    name,
                    w.shape(),
                    hidden_size,
                    hidden_size
                ));
            }
        }

        let head_dim = hidden_size / num_heads;
        Ok(Self {
            q_weight,
            q_bias,
            k_weight,
            k_bias,
            v_weight,
            v_bias,
            output_weight,
            output_bias,
            num_heads,
            head_dim,
            scale_factor: 1.0 / (head_dim as f32).sqrt(),
        })
    }

    /// Builds from a fused `[hidden, 3 * hidden]` QKV projection, split
    /// column-wise into Q, K and V.
    pub fn from_fused_qkv(
        num_heads: usize,
        qkv_weight: Array2<f32>,
        qkv_bias: Array1<f32>,
        output_weight: Array2<f32>,
        output_bias: Array1<f32>,
    ) -> Result<Self> {
        let hidden = qkv_weight.shape()[0];
        if qkv_weight.shape()[1] != 3 * hidden || qkv_bias.len() != 3 * hidden {
            return Err(anyhow!(
                "fused QKV weight {:?} / bias {} do not match hidden size {}",
                qkv_weight.shape(),
                qkv_bias.len(),
                hidden
            ));
        }
        let part = |i: usize| {
            (
                qkv_weight.slice(s![.., i * hidden..(i + 1) * hidden]).to_owned(),
                qkv_bias.slice(s![i * hidden..(i + 1) * hidden]).to_owned(),
            )
        };
        let (q_w, q_b) = part(0);
        let (k_w, k_b) = part(1);
        let (v_w, v_b) = part(2);
        Self::new(hidden, num_heads, q_w, q_b, k_w, k_b, v_w, v_b, output_weight, output_bias)
    }

    pub fn hidden_size(&self) -> usize {
        self.num_heads * self.head_dim
    }

    fn project(x: &ArrayView3<f32>, w: &Array2<f32>, b: &Array1<f32>) -> Result<Array3<f32>> {
        let out = matmul_3d_2d(x, &w.view())?;
        Ok(if b.is_empty() { out } else { out + b })
    }

    /// Self-attention over `hidden` (`[batch, seq, hidden]`).
    ///
    /// New keys/values are appended after `cached_kv` for attention but only
    /// the new slices are returned, for the caller to write into the cache.
    /// `attention_mask`, when given, covers all `past + seq` key positions.
    pub fn forward_with_cache(
        &self,
        hidden: &ArrayView3<f32>,
        attention_mask: Option<&Array2<f32>>,
        cached_kv: Option<(ArrayView3<f32>, ArrayView3<f32>)>,
    ) -> Result<(Array3<f32>, Array3<f32>, Array3<f32>)> {
        let q = Self::project(hidden, &self.q_weight, &self.q_bias)?;
        let new_k = Self::project(hidden, &self.k_weight, &self.k_bias)?;
        let new_v = Self::project(hidden, &self.v_weight, &self.v_bias)?;

        let past_len = cached_kv.as_ref().map_or(0, |(k, _)| k.shape()[1]);
        let (full_k, full_v) = match cached_kv {
            Some((cached_k, cached_v)) if past_len > 0 => (
                ndarray::concatenate(Axis(1), &[cached_k.view(), new_k.view()])?,
                ndarray::concatenate(Axis(1), &[cached_v.view(), new_v.view()])?,
            ),
            _ => (new_k.clone(), new_v.clone()),
        };

        let context = self.attend(&q, &full_k, &full_v, attention_mask, past_len)?;
        let output = Self::project(&context.view(), &self.output_weight, &self.output_bias)?;

        Ok((output, new_k, new_v))
    }

    fn attend(
        &self,
        q: &Array3<f32>,
        k: &Array3<f32>,
        v: &Array3<f32>,
        attention_mask: Option<&Array2<f32>>,
        past_len: usize,
    ) -> Result<Array3<f32>> {
        let (batch, seq_len, _) = q.dim();
        let kv_len = k.shape()[1];

        // [batch, seq, hidden] -> [batch, heads, seq, head_dim]
        let split_heads = |x: &Array3<f32>, len: usize| -> Result<_> {
            Ok(x
                .as_standard_layout()
                .into_owned()
                .into_shape_with_order((batch, len, self.num_heads, self.head_dim))?
                .permuted_axes([0, 2, 1, 3])
                .as_standard_layout()
                .into_owned())
        };

        let q_heads = split_heads(q, seq_len)?;
        let k_t = split_heads(k, kv_len)?
            .permuted_axes([0, 1, 3, 2])
            .as_standard_layout()
            .into_owned();
        let v_heads = split_heads(v, kv_len)?;

        let mut scores = matmul_4d(&q_heads, &k_t);
        scores *= self.scale_factor;

        if let Some(mask) = attention_mask {
            scores = apply_padding_mask(scores, mask)?;
        }
        apply_causal_mask(&mut scores, past_len);
        softmax_last_axis_inplace(&mut scores);

        let context = matmul_4d(&scores, &v_heads);
        Ok(context
            .permuted_axes([0, 2, 1, 3])
            .as_standard_layout()
            .into_owned()
            .into_shape_with_order((batch, seq_len, self.hidden_size()))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array;

    fn identity_attention(hidden: usize, heads: usize) -> MultiHeadAttention {
        MultiHeadAttention::new(
            hidden,
            heads,
            Array2::eye(hidden),
            Array1::zeros(0),
            Array2::eye(hidden),
            Array1::zeros(0),
            Array2::eye(hidden),
            Array1::zeros(0),
            Array2::eye(hidden),
            Array1::zeros(0),
        )
        .unwrap()
    }

    fn ramp(shape: (usize, usize, usize)) -> Array3<f32> {
        Array::from_shape_fn(shape, |(b, s, h)| ((b * 7 + s * 3 + h) % 5) as f32 * 0.3 - 0.5)
    }

    #[test]
    fn test_shapes_without_cache() -> Result<()> {
        let attn = identity_attention(8, 2);
        let input = Array3::ones((1, 5, 8));
        let (out, k, v) = attn.forward_with_cache(&input.view(), None, None)?;

        assert_eq!(out.shape(), &[1, 5, 8]);
        assert_eq!(k.shape(), &[1, 5, 8]);
        assert_eq!(v.shape(), &[1, 5, 8]);
        Ok(())
    }

    #[test]
    fn test_first_position_attends_only_to_itself() -> Result<()> {
        let attn = identity_attention(4, 1);
        let input = ramp((1, 3, 4));
        let (out, _, _) = attn.forward_with_cache(&input.view(), None, None)?;

        // With identity projections, position 0 can only copy its own value.
        for h in 0..4 {
            assert_abs_diff_eq!(out[[0, 0, h]], input[[0, 0, h]], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_incremental_matches_full_pass() -> Result<()> {
        let attn = identity_attention(8, 2);
        let input = ramp((1, 4, 8));

        let (full_out, full_k, full_v) = attn.forward_with_cache(&input.view(), None, None)?;

        let prefix = input.slice(s![.., 0..3, ..]);
        let (_, k, v) = attn.forward_with_cache(&prefix, None, None)?;
        let last = input.slice(s![.., 3..4, ..]);
        let (step_out, step_k, step_v) =
            attn.forward_with_cache(&last, None, Some((k.view(), v.view())))?;

        assert_eq!(step_out.shape(), &[1, 1, 8]);
        for h in 0..8 {
            assert_abs_diff_eq!(step_out[[0, 0, h]], full_out[[0, 3, h]], epsilon = 1e-5);
            assert_abs_diff_eq!(step_k[[0, 0, h]], full_k[[0, 3, h]], epsilon = 1e-6);
            assert_abs_diff_eq!(step_v[[0, 0, h]], full_v[[0, 3, h]], epsilon = 1e-6);
        }
        Ok(())
    }

    #[test]
    fn test_padding_mask_hides_key() -> Result<()> {
        let attn = identity_attention(4, 1);
        let input = ramp((1, 2, 4));
        let mut mask = Array2::ones((1, 2));
        mask[[0, 0]] = 0.0;

        let (out, _, _) = attn.forward_with_cache(&input.view(), Some(&mask), None)?;
        for h in 0..4 {
            assert_abs_diff_eq!(out[[0, 1, h]], input[[0, 1, h]], epsilon = 1e-5);
        }
        Ok(())
    }

    #[test]
    fn test_fused_qkv_split() -> Result<()> {
        let hidden = 4;
        let qkv = Array::from_shape_fn((hidden, 3 * hidden), |(i, j)| (i * 100 + j) as f32);
        let bias = Array::from_shape_fn(3 * hidden, |j| j as f32);
        let attn = MultiHeadAttention::from_fused_qkv(
            2,
            qkv,
            bias,
            Array2::eye(hidden),
            Array1::zeros(hidden),
        )?;

        assert_eq!(attn.k_weight[[1, 0]], 104.0);
        assert_eq!(attn.v_weight[[0, 3]], 11.0);
        assert_eq!(attn.k_bias[0], 4.0);
        assert_eq!(attn.head_dim, 2);
        Ok(())
    }

    #[test]
    fn test_rejects_bad_head_count() {
        let eye = || Array2::<f32>::eye(6);
        let z = || Array1::<f32>::zeros(0);
        assert!(MultiHeadAttention::new(6, 4, eye(), z(), eye(), z(), eye(), z(), eye(), z()).is_err());
    }
}
