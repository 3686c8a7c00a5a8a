use anyhow::{Result, anyhow};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    /// Standard 32-bit float
    F32,
    /// 16-bit float (IEEE 754 half-precision)
    F16,
    /// 16-bit brain float (more range, less precision than F16)
    BF16,
    /// 32-bit unsigned integer, primarily for token IDs
    U32,
}

impl DType {
    /// Maps a safetensors::Dtype to our internal DType.
    pub fn from_safetensors(dtype: safetensors::Dtype) -> Result<Self> {
        match dtype {
            safetensors::Dtype::F32 => Ok(DType::F32),
            safetensors::Dtype::F16 => Ok(DType::F16),
            safetensors::Dtype::BF16 => Ok(DType::BF16),
            safetensors::Dtype::U32 => Ok(DType::U32),
            _ => Err(anyhow!("Unsupported or unknown safetensors DType: {:?}", dtype)),
        }
    }

    /// Size of a single element in bytes.
    pub fn size_of(&self) -> usize {
        match self {
            DType::F32 | DType::U32 => 4,
            DType::F16 | DType::BF16 => 2,
        }
    }

    /// Bytes needed to hold a tensor of `shape`.
    pub fn buffer_size_for_shape(&self, shape: &[usize]) -> usize {
        shape.iter().product::<usize>() * self.size_of()
    }

    pub fn is_float(&self) -> bool {
        !matches!(self, DType::U32)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::F32 => "f32",
            DType::F16 => "f16",
            DType::BF16 => "bf16",
            DType::U32 => "u32",
        };
        f.write_str(name)
    }
}
