//! Token and learned absolute position embeddings.

use std::sync::Arc;

use anyhow::{Result, anyhow};
use ndarray::{Array2, Array3, Axis, s};

use crate::weights::ModelWeights;

/// Word embeddings are held behind an `Arc` so a tied LM head can share them.
#[derive(Debug, Clone)]
pub struct Embeddings {
    pub word_embeddings: Arc<Array2<f32>>,
    pub position_embeddings: Option<Array2<f32>>,
}

impl Embeddings {
    pub fn new(word_embeddings: Array2<f32>, position_embeddings: Option<Array2<f32>>) -> Self {
        Self {
            word_embeddings: Arc::new(word_embeddings),
            position_embeddings,
        }
    }

    pub fn from_weights(weights: &ModelWeights, word_name: &str, position_name: Option<&str>) -> Result<Self> {
        let word = weights.get_array2(word_name)?;
        let position = position_name.map(|n| weights.get_array2(n)).transpose()?;
        if let Some(pos) = &position {
            if pos.shape()[1] != word.shape()[1] {
                return Err(anyhow!(
                    "position embedding width {} differs from word embedding width {}",
                    pos.shape()[1],
                    word.shape()[1]
                ));
            }
        }
        log::debug!(
            "embeddings: vocab {} x {}, positions {}",
            word.shape()[0],
            word.shape()[1],
            position.as_ref().map_or(0, |p| p.shape()[0])
        );
        Ok(Self::new(word, position))
    }

    pub fn vocab_size(&self) -> usize {
        self.word_embeddings.shape()[0]
    }

    pub fn hidden_size(&self) -> usize {
        self.word_embeddings.shape()[1]
    }

    pub fn max_positions(&self) -> Option<usize> {
        self.position_embeddings.as_ref().map(|p| p.shape()[0])
    }

    /// Embeds `input_ids` (`[batch, seq]`); the first token of each row sits
    /// at absolute position `position_offset`.
    pub fn forward(&self, input_ids: &Array2<u32>, position_offset: usize) -> Result<Array3<f32>> {
        let (batch, seq_len) = input_ids.dim();
        let hidden = self.hidden_size();
        let vocab = self.vocab_size();

        if let Some(max) = self.max_positions() {
            if position_offset + seq_len > max {
                return Err(anyhow!(
                    "positions {}..{} exceed the {} learned position embeddings",
                    position_offset,
                    position_offset + seq_len,
                    max
                ));
            }
        }

        let mut out = Array3::<f32>::zeros((batch, seq_len, hidden));
        for (b, row) in input_ids.outer_iter().enumerate() {
            for (t, &id) in row.iter().enumerate() {
                let id = id as usize;
                if id >= vocab {
                    return Err(anyhow!("token id {} out of range for vocab of {}", id, vocab));
                }
                out.slice_mut(s![b, t, ..]).assign(&self.word_embeddings.row(id));
            }
        }

        if let Some(pos) = &self.position_embeddings {
            let pos_slice = pos.slice(s![position_offset..position_offset + seq_len, ..]);
            out += &pos_slice.insert_axis(Axis(0));
        }

        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn small() -> Embeddings {
        let word = array![[1.0, 0.0], [0.0, 1.0], [2.0, 2.0]];
        let pos = array![[0.1, 0.1], [0.2, 0.2], [0.3, 0.3]];
        Embeddings::new(word, Some(pos))
    }

    #[test]
    fn test_lookup_with_positions() {
        let emb = small();
        let ids = array![[2u32, 0]];
        let out = emb.forward(&ids, 0).unwrap();

        assert_eq!(out.dim(), (1, 2, 2));
        assert!((out[[0, 0, 0]] - 2.1).abs() < 1e-6);
        assert!((out[[0, 1, 1]] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_position_offset() {
        let emb = small();
        let out = emb.forward(&array![[1u32]], 2).unwrap();
        assert!((out[[0, 0, 1]] - 1.3).abs() < 1e-6);
    }

    #[test]
    fn test_out_of_range() {
        let emb = small();
        assert!(emb.forward(&array![[3u32]], 0).is_err());
        assert!(emb.forward(&array![[0u32, 1]], 2).is_err());
    }

    #[test]
    fn test_without_positions() {
        let emb = Embeddings::new(array![[1.0, 2.0]], None);
        let out = emb.forward(&array![[0u32, 0, 0]], 500).unwrap();
        assert_eq!(out[[0, 2, 1]], 2.0);
        assert_eq!(emb.max_positions(), None);
    }
}
