use anyhow::anyhow;
use ndarray::{Array2, Array4, Axis, Zip, s};

pub const MASK_VALUE: f32 = -1e9;

/// Masks key positions where `mask[batch, key] == 0`.
pub fn apply_padding_mask(mut scores: Array4<f32>, mask: &Array2<f32>) -> anyhow::Result<Array4<f32>> {
    let (batch_size, num_heads, seq_q, seq_k) = scores.dim();

    if mask.shape()[0] != batch_size {
        return Err(anyhow!(
            "Mask batch size {} doesn't match scores batch size {}",
            mask.shape()[0],
            batch_size
        ));
    }

    if mask.shape()[1] != seq_k {
        return Err(anyhow!(
            "Mask sequence length {} doesn't match key sequence length {}",
            mask.shape()[1],
            seq_k
        ));
    }

    let mask_expanded = mask.view().insert_axis(Axis(1)).insert_axis(Axis(1));
    if let Some(broadcast_mask) = mask_expanded.broadcast((batch_size, num_heads, seq_q, seq_k)) {
        Zip::from(&mut scores).and(&broadcast_mask).for_each(|s, &m| {
            if m == 0.0 {
                *s = MASK_VALUE;
            }
        });
    }

    Ok(scores)
}

/// Query `i` sits at absolute position `cache_len + i` and may only see
/// keys at or before it.
pub fn apply_causal_mask(scores: &mut Array4<f32>, cache_len: usize) {
    let (_, _, seq_q, seq_k) = scores.dim();
    for i in 0..seq_q {
        let first_hidden = cache_len + i + 1;
        if first_hidden < seq_k {
            scores.slice_mut(s![.., .., i, first_hidden..]).fill(MASK_VALUE);
        }
    }
}

/// All-ones mask of `[batch_size, seq_len]`.
pub fn create_full_attention_mask(batch_size: usize, seq_len: usize) -> Array2<f32> {
    Array2::ones((batch_size, seq_len))
}
