//! High-level access to a model directory's weights and config.
//!
//! Prefer [`ModelWeights::with_raw_tensor`] for inspecting tensors without
//! materializing them. The `get_array*` helpers decode into owned f32
//! arrays and are what model constructors use to build layers.

use super::WeightLoader;
use super::safetensors_loader::SafeTensorsLoader;
use crate::tensor::DType;
use crate::tensor::raw_tensor::TensorView;
use anyhow::{Context, Result, anyhow};
use ndarray::{Array1, Array2, Ix1, Ix2};
use std::path::Path;
use std::sync::Arc;

struct ModelWeightsInner {
    loader: Box<dyn WeightLoader>,
    config_json: String,
}

/// Weights plus the accompanying `config.json`.
///
/// `ModelWeights` is cheap to clone; clones share the underlying mmap.
#[derive(Clone)]
pub struct ModelWeights {
    inner: Arc<ModelWeightsInner>,
}

impl ModelWeights {
    /// Opens a directory holding `model.safetensors` and `config.json`.
    pub fn new(path: &Path) -> Result<Self> {
        if !path.is_dir() {
            return Err(anyhow!("model path {:?} is not a directory", path));
        }

        let loader: Box<dyn WeightLoader> = Box::new(SafeTensorsLoader::new(path)?);
        let config_path = path.join("config.json");
        let config_json = std::fs::read_to_string(&config_path)
            .with_context(|| format!("failed to read {:?}", config_path))?;

        Ok(Self {
            inner: Arc::new(ModelWeightsInner { loader, config_json }),
        })
    }

    pub fn config_json(&self) -> &str {
        &self.inner.config_json
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.loader.contains(name)
    }

    pub fn tensor_names(&self) -> Vec<String> {
        self.inner.loader.tensor_names()
    }

    pub fn model_type(&self) -> Option<String> {
        let v: serde_json::Value = serde_json::from_str(&self.inner.config_json).ok()?;
        v.get("model_type").and_then(|v| v.as_str()).map(|s| s.to_string())
    }

    /// Runs `f` on a borrowed view of the named tensor.
    pub fn with_raw_tensor<R, F>(&self, name: &str, f: F) -> Result<R>
    where
        F: FnOnce(TensorView<'_>) -> Result<R>,
    {
        let view = self.inner.loader.get_raw(name)?;
        f(view)
    }

    pub fn tensor_shape(&self, name: &str) -> Result<Vec<usize>> {
        self.with_raw_tensor(name, |view| Ok(view.shape.clone()))
    }

    pub fn tensor_dtype(&self, name: &str) -> Result<DType> {
        self.with_raw_tensor(name, |view| Ok(view.dtype))
    }

    pub fn get_array1(&self, name: &str) -> Result<Array1<f32>> {
        self.with_raw_tensor(name, |view| {
            view.to_array_f32()?
                .into_dimensionality::<Ix1>()
                .map_err(|e| anyhow!("Failed to load '{}' as 1D: {}", name, e))
        })
    }

    pub fn get_array2(&self, name: &str) -> Result<Array2<f32>> {
        self.with_raw_tensor(name, |view| {
            view.to_array_f32()?
                .into_dimensionality::<Ix2>()
                .map_err(|e| anyhow!("Failed to load '{}' as 2D: {}", name, e))
        })
    }
}

impl std::fmt::Debug for ModelWeights {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelWeights")
            .field("tensors", &self.inner.loader.tensor_names().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::{Dtype, TensorView as StTensorView};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_test_safetensors(dir: &TempDir, tensors: &[(&str, Vec<f32>, Vec<usize>)]) -> Result<()> {
        let stored: Vec<(String, Vec<usize>, Vec<u8>)> = tensors
            .iter()
            .map(|(name, values, shape)| {
                let bytes: Vec<u8> = values.iter().flat_map(|f| f.to_le_bytes()).collect();
                (name.to_string(), shape.clone(), bytes)
            })
            .collect();

        let mut tensor_map = HashMap::new();
        for (name, shape, bytes) in &stored {
            tensor_map.insert(name.clone(), StTensorView::new(Dtype::F32, shape.clone(), bytes)?);
        }

        safetensors::serialize_to_file(&tensor_map, &None, &dir.path().join("model.safetensors"))?;
        std::fs::write(dir.path().join("config.json"), r#"{"model_type": "gpt2", "n_embd": 4}"#)?;
        Ok(())
    }

    #[test]
    fn test_model_weights_new() {
        let dir = tempfile::tempdir().unwrap();
        create_test_safetensors(&dir, &[("wte.weight", vec![1.0, 2.0, 3.0, 4.0], vec![2, 2])]).unwrap();

        let weights = ModelWeights::new(dir.path()).unwrap();
        assert!(weights.contains("wte.weight"));
        assert!(!weights.contains("wpe.weight"));
        assert_eq!(weights.model_type().as_deref(), Some("gpt2"));
        assert!(weights.config_json().contains("n_embd"));
    }

    #[test]
    fn test_missing_config_is_error() {
        let dir = tempfile::tempdir().unwrap();
        create_test_safetensors(&dir, &[("w", vec![1.0], vec![1])]).unwrap();
        std::fs::remove_file(dir.path().join("config.json")).unwrap();

        assert!(ModelWeights::new(dir.path()).is_err());
    }

    #[test]
    fn test_get_arrays() {
        let dir = tempfile::tempdir().unwrap();
        create_test_safetensors(
            &dir,
            &[
                ("ln.bias", vec![0.5, -0.5], vec![2]),
                ("fc.weight", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3]),
            ],
        )
        .unwrap();

        let weights = ModelWeights::new(dir.path()).unwrap();
        let bias = weights.get_array1("ln.bias").unwrap();
        assert_eq!(bias.to_vec(), vec![0.5, -0.5]);

        let fc = weights.get_array2("fc.weight").unwrap();
        assert_eq!(fc.dim(), (2, 3));
        assert_eq!(fc[[1, 2]], 6.0);

        assert!(weights.get_array2("ln.bias").is_err());
        assert_eq!(weights.tensor_shape("fc.weight").unwrap(), vec![2, 3]);
        assert_eq!(weights.tensor_dtype("fc.weight").unwrap(), DType::F32);
    }

    #[test]
    fn test_clone_shares_loader() {
        let dir = tempfile::tempdir().unwrap();
        create_test_safetensors(&dir, &[("w", vec![1.0], vec![1])]).unwrap();

        let a = ModelWeights::new(dir.path()).unwrap();
        let b = a.clone();
        assert!(Arc::ptr_eq(&a.inner, &b.inner));
    }
}
