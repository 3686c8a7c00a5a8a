//! SafeTensors loader over memory-mapped files

use std::borrow::Cow;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use memmap2::Mmap;
use safetensors::SafeTensors;

use crate::tensor::DType;
use crate::tensor::raw_tensor::TensorView;
use crate::weights::WeightLoader;

const SINGLE_FILE: &str = "model.safetensors";

/// A loader for a single `.safetensors` file.
#[derive(Debug)]
pub struct SafeTensorsLoader {
    mmap: Arc<Mmap>,
    names: HashSet<String>,
}

impl SafeTensorsLoader {
    /// Accepts either a direct file path or a directory containing
    /// `model.safetensors`. Sharded checkpoints are not supported.
    pub fn new(path: &Path) -> Result<Self> {
        if path.is_file() {
            return Self::load(path);
        }

        if !path.is_dir() {
            return Err(anyhow!("path {:?} is neither a file nor a directory", path));
        }

        Self::load(&path.join(SINGLE_FILE))
    }

    fn load(path: &Path) -> Result<Self> {
        let mmap = Self::map_file(path)?;
        let names: HashSet<String> = SafeTensors::deserialize(&mmap[..])
            .with_context(|| format!("failed to parse safetensors: {:?}", path))?
            .names()
            .into_iter()
            .map(|s| s.to_string())
            .collect();

        log::info!(
            "loaded safetensors file: {} tensors from {:?}",
            names.len(),
            path.file_name().unwrap_or_default()
        );

        Ok(Self { mmap, names })
    }

    fn map_file(path: &Path) -> Result<Arc<Mmap>> {
        let file = File::open(path).with_context(|| format!("failed to open {:?}", path))?;
        // SAFETY: the file is opened read-only and model files are not
        // modified while a model holds them.
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("failed to mmap {:?}", path))?;
        Ok(Arc::new(mmap))
    }

    pub fn tensor_count(&self) -> usize {
        self.names.len()
    }
}

impl WeightLoader for SafeTensorsLoader {
    fn get_raw(&self, name: &str) -> Result<TensorView<'_>> {
        if !self.names.contains(name) {
            return Err(anyhow!("tensor '{}' not found in model", name));
        }

        let tensors = SafeTensors::deserialize(&self.mmap[..])?;
        let view = tensors
            .tensor(name)
            .with_context(|| format!("failed to read tensor '{}'", name))?;

        Ok(TensorView {
            name: name.to_string(),
            bytes: Cow::Borrowed(view.data()),
            shape: view.shape().to_vec(),
            dtype: DType::from_safetensors(view.dtype())?,
        })
    }

    fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    fn tensor_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use safetensors::tensor::{Dtype, TensorView as StTensorView};
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn create_safetensors_file(
        dir: &TempDir,
        filename: &str,
        tensors: &[(&str, Vec<f32>, Vec<usize>)],
    ) -> Result<()> {
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

        safetensors::serialize_to_file(&tensor_map, &None, &dir.path().join(filename))?;
        Ok(())
    }

    #[test]
    fn test_load_nonexistent_path() {
        assert!(SafeTensorsLoader::new(Path::new("nonexistent.safetensors")).is_err());
    }

    #[test]
    fn test_load_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SafeTensorsLoader::new(dir.path()).is_err());
    }

    #[test]
    fn test_load_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("model.safetensors"), b"invalid content").unwrap();

        let result = SafeTensorsLoader::new(dir.path());
        assert!(result.unwrap_err().to_string().contains("failed to parse"));
    }

    #[test]
    fn test_single_file_loading() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(
            &dir,
            "model.safetensors",
            &[
                ("h.0.ln_1.weight", vec![1.0, 2.0], vec![2]),
                ("wte.weight", vec![1.0, 2.0, 3.0, 4.0], vec![2, 2]),
            ],
        )
        .unwrap();

        let loader = SafeTensorsLoader::new(dir.path()).unwrap();

        assert_eq!(loader.tensor_count(), 2);
        assert!(loader.contains("wte.weight"));
        assert!(!loader.contains("wpe.weight"));
        assert_eq!(loader.tensor_names(), vec!["h.0.ln_1.weight", "wte.weight"]);
    }

    #[test]
    fn test_get_raw_tensor() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(
            &dir,
            "model.safetensors",
            &[("test.weight", vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], vec![2, 3])],
        )
        .unwrap();

        let loader = SafeTensorsLoader::new(dir.path()).unwrap();
        let view = loader.get_raw("test.weight").unwrap();

        assert_eq!(view.name, "test.weight");
        assert_eq!(view.shape, vec![2, 3]);
        assert_eq!(view.dtype, DType::F32);
        assert_eq!(view.to_f32_vec().unwrap(), vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_missing_tensor_error() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(&dir, "model.safetensors", &[("exists", vec![1.0], vec![1])]).unwrap();

        let loader = SafeTensorsLoader::new(dir.path()).unwrap();
        let err = loader.get_raw("does_not_exist").unwrap_err();
        assert!(err.to_string().contains("not found"));
    }

    #[test]
    fn test_direct_file_path() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(&dir, "weights.safetensors", &[("w", vec![1.0], vec![1])]).unwrap();

        let loader = SafeTensorsLoader::new(&dir.path().join("weights.safetensors")).unwrap();
        assert!(loader.contains("w"));
    }

    #[test]
    fn test_index_without_single_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        create_safetensors_file(
            &dir,
            "model-00001-of-00002.safetensors",
            &[("layer0.weight", vec![1.0, 2.0], vec![2])],
        )
        .unwrap();
        let index = r#"{"weight_map": {"layer0.weight": "model-00001-of-00002.safetensors"}}"#;
        std::fs::write(dir.path().join("model.safetensors.index.json"), index).unwrap();

        let err = SafeTensorsLoader::new(dir.path()).unwrap_err();
        assert!(format!("{:#}", err).contains("model.safetensors"));
    }
}
