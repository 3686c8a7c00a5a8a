//! Key/value cache for incremental decoding.

use std::any::Any;

use anyhow::bail;
use ndarray::{Array3, ArrayView3, s};

/// Backend-agnostic cache handle passed through the decoder.
pub trait Cache: Send + Sync {
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
    /// Number of positions already stored.
    fn get_seq_length(&self) -> usize;
    fn increment_len(&mut self, new_tokens: usize);
}

/// Preallocated per-layer K/V buffers of `[batch, max_len, hidden]`.
///
/// Layers write their new slices with [`update`](Self::update); the shared
/// length only advances once every layer of a step has been written.
#[derive(Debug, Clone)]
pub struct CpuKVCache {
    layers: Vec<(Array3<f32>, Array3<f32>)>,
    current_len: usize,
}

impl CpuKVCache {
    pub fn new(num_layers: usize, batch_size: usize, max_len: usize, hidden_size: usize) -> Self {
        let layers = (0..num_layers)
            .map(|_| {
                (
                    Array3::zeros((batch_size, max_len, hidden_size)),
                    Array3::zeros((batch_size, max_len, hidden_size)),
                )
            })
            .collect();
        Self { layers, current_len: 0 }
    }

    pub fn max_len(&self) -> usize {
        self.layers.first().map_or(0, |(k, _)| k.shape()[1])
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn hidden_size(&self) -> usize {
        self.layers.first().map_or(0, |(k, _)| k.shape()[2])
    }

    pub fn remaining(&self) -> usize {
        self.max_len().saturating_sub(self.current_len)
    }

    /// Writes `new_k`/`new_v` at positions `current_len..current_len + n`.
    pub fn update(&mut self, layer_idx: usize, new_k: &Array3<f32>, new_v: &Array3<f32>) -> anyhow::Result<()> {
        if layer_idx >= self.layers.len() {
            bail!("layer index {} out of bounds (num_layers={})", layer_idx, self.layers.len());
        }
        if new_k.shape() != new_v.shape() {
            bail!("key shape {:?} differs from value shape {:?}", new_k.shape(), new_v.shape());
        }

        let new_tokens = new_k.shape()[1];
        let end = self.current_len + new_tokens;
        if end > self.max_len() {
            bail!(
                "cache overflow: current_len={}, new_tokens={}, max_len={}",
                self.current_len,
                new_tokens,
                self.max_len()
            );
        }

        let (k, v) = &mut self.layers[layer_idx];
        k.slice_mut(s![.., self.current_len..end, ..]).assign(new_k);
        v.slice_mut(s![.., self.current_len..end, ..]).assign(new_v);
        Ok(())
    }

    /// Views over the filled positions of a layer.
    pub fn get(&self, layer_idx: usize) -> Option<(ArrayView3<'_, f32>, ArrayView3<'_, f32>)> {
        let (k, v) = self.layers.get(layer_idx)?;
        let filled = s![.., 0..self.current_len, ..];
        Some((k.slice(filled), v.slice(filled)))
    }
}

impl Cache for CpuKVCache {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }

    fn get_seq_length(&self) -> usize {
        self.current_len
    }

    fn increment_len(&mut self, new_tokens: usize) {
        self.current_len += new_tokens;
    }
}
