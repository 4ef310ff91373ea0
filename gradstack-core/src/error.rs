use thiserror::Error;

/// Custom error type for the gradstack framework.
#[derive(Error, Debug, PartialEq, Clone)] // PartialEq for easier testing
pub enum GradStackError {
    #[error("Shape mismatch: expected {expected:?}, got {actual:?} during operation {operation}")]
    ShapeMismatch {
        expected: Vec<usize>,
        actual: Vec<usize>,
        operation: String,
    },

    #[error("Index out of bounds: index {index} for length {len}")]
    IndexOutOfBounds { index: usize, len: usize },

    /// A lookup id that is negative, fractional or not below `len`.
    #[error("Invalid index value {value} for a table of length {len}")]
    InvalidIndex { value: f64, len: usize },

    /// Backward was called on a function that holds no recorded forward state.
    #[error("Backward called on '{function}' without a matching forward call")]
    MissingForwardState { function: String },

    #[error("Update called on '{function}' but no optimizer is bound to it")]
    UnboundOptimizer { function: String },

    #[error("Parameter '{parameter}' is already bound to an optimizer")]
    OptimizerAlreadyBound { parameter: String },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Failed to acquire {lock_type} lock: {reason}")]
    LockError { lock_type: String, reason: String },
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, GradStackError>;

impl GradStackError {
    /// Shorthand for a `ShapeMismatch` raised by `operation`.
    pub(crate) fn shape_mismatch(
        expected: &[usize],
        actual: &[usize],
        operation: impl Into<String>,
    ) -> Self {
        GradStackError::ShapeMismatch {
            expected: expected.to_vec(),
            actual: actual.to_vec(),
            operation: operation.into(),
        }
    }
}
