use crate::tensor::dtype::DType;
use anyhow::{Result, anyhow};
use half::{bf16, f16};
use ndarray::{ArrayD, IxDyn};
use std::borrow::Cow;

/// A raw, untyped view into a tensor's bytes, shape, and dtype.
///
/// This is the output of the file loader before any conversion. The view
/// borrows the loader's mmap and must be consumed while the loader is alive.
#[derive(Debug)]
pub struct TensorView<'a> {
    pub name: String,
    pub bytes: Cow<'a, [u8]>,
    pub shape: Vec<usize>,
    pub dtype: DType,
}

impl<'a> TensorView<'a> {
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Decodes the payload into f32 values, widening f16/bf16.
    pub fn to_f32_vec(&self) -> Result<Vec<f32>> {
        let expected = self.dtype.buffer_size_for_shape(&self.shape);
        if self.bytes.len() != expected {
            return Err(anyhow!(
                "Tensor '{}' has {} bytes, expected {} for shape {:?} ({})",
                self.name,
                self.bytes.len(),
                expected,
                self.shape,
                self.dtype
            ));
        }

        let data = match self.dtype {
            DType::F32 => cast_or_copy::<f32>(&self.bytes),
            DType::F16 => cast_or_copy::<f16>(&self.bytes)
                .into_iter()
                .map(f16::to_f32)
                .collect(),
            DType::BF16 => cast_or_copy::<bf16>(&self.bytes)
                .into_iter()
                .map(bf16::to_f32)
                .collect(),
            DType::U32 => {
                return Err(anyhow!(
                    "Tensor '{}' holds integer data and cannot be read as f32",
                    self.name
                ));
            }
        };
        Ok(data)
    }

    pub fn to_array_f32(&self) -> Result<ArrayD<f32>> {
        let data = self.to_f32_vec()?;
        ArrayD::from_shape_vec(IxDyn(&self.shape), data).map_err(|e| {
            anyhow!("Failed to shape tensor '{}' as {:?}: {}", self.name, self.shape, e)
        })
    }
}

/// Reinterprets `bytes` as `T`, copying through an aligned buffer when the
/// mmap'd slice is misaligned.
pub fn cast_or_copy<T: bytemuck::Pod>(bytes: &[u8]) -> Vec<T> {
    if let Ok(slice) = bytemuck::try_cast_slice(bytes) {
        slice.to_vec()
    } else {
        bytes
            .chunks_exact(std::mem::size_of::<T>())
            .map(bytemuck::pod_read_unaligned)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view(bytes: Vec<u8>, shape: Vec<usize>, dtype: DType) -> TensorView<'static> {
        TensorView {
            name: "t".to_string(),
            bytes: Cow::Owned(bytes),
            shape,
            dtype,
        }
    }

    #[test]
    fn test_f32_decoding() {
        let bytes: Vec<u8> = [1.0f32, -2.5, 3.25].iter().flat_map(|f| f.to_le_bytes()).collect();
        let arr = view(bytes, vec![3], DType::F32).to_array_f32().unwrap();
        assert_eq!(arr.as_slice().unwrap(), &[1.0, -2.5, 3.25]);
    }

    #[test]
    fn test_f16_and_bf16_decoding() {
        let f16_bytes: Vec<u8> = [f16::from_f32(0.5), f16::from_f32(-4.0)]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(view(f16_bytes, vec![2], DType::F16).to_f32_vec().unwrap(), vec![0.5, -4.0]);

        let bf16_bytes: Vec<u8> = [bf16::from_f32(1.0), bf16::from_f32(8.0)]
            .iter()
            .flat_map(|v| v.to_le_bytes())
            .collect();
        assert_eq!(view(bf16_bytes, vec![2], DType::BF16).to_f32_vec().unwrap(), vec![1.0, 8.0]);
    }

    #[test]
    fn test_size_mismatch_is_error() {
        let result = view(vec![0u8; 6], vec![2], DType::F32).to_f32_vec();
        assert!(result.is_err());
    }

    #[test]
    fn test_cast_or_copy_misaligned() {
        let mut bytes = vec![0u8];
        bytes.extend_from_slice(&2.0f32.to_le_bytes());
        bytes.extend_from_slice(&(-1.0f32).to_le_bytes());
        let values: Vec<f32> = cast_or_copy(&bytes[1..]);
        assert_eq!(values, vec![2.0, -1.0]);
    }

    #[test]
    fn test_u32_rejected() {
        assert!(view(vec![0u8; 4], vec![1], DType::U32).to_f32_vec().is_err());
    }
}
