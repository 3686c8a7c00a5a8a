//! Weight loading for safetensors checkpoints.

mod model_weights;
mod safetensors_loader;

pub use model_weights::ModelWeights;
pub use safetensors_loader::SafeTensorsLoader;

use crate::tensor::raw_tensor::TensorView;
use anyhow::Result;

/// Format-specific access to named tensors.
///
/// Views borrow the loader's memory map and should be consumed immediately.
/// Prefer [`ModelWeights::with_raw_tensor`], which enforces that via a
/// callback.
pub trait WeightLoader: Send + Sync {
    fn get_raw(&self, name: &str) -> Result<TensorView<'_>>;

    fn contains(&self, name: &str) -> bool;

    fn tensor_names(&self) -> Vec<String>;
}
