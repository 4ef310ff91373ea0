//! Reverse-mode differentiation and training for stacks of functions, with
//! per-sample history managed explicitly by each layer.

pub mod error;
pub mod nn;
pub mod optim;
pub mod tensor;
pub mod utils;

pub use error::{GradStackError, Result};
pub use nn::{Function, FunctionBase, Parameter};
pub use tensor::Tensor;
// Re-export traits required by public functions
pub use num_traits;
pub use rand;
