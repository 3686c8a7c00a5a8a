pub mod dtype;
pub mod raw_tensor;

pub use dtype::DType;
pub use raw_tensor::TensorView;
