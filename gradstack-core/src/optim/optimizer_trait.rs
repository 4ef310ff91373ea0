use crate::error::GradStackError;
use crate::nn::parameter::Parameter;
use std::fmt::Debug;

/// Trait defining the common interface for all optimizers.
///
/// An optimizer owns one auxiliary state record per bound parameter and
/// mutates the parameters' value buffers from their gradient buffers.
pub trait Optimizer: Debug + Send + Sync {
    /// Short algorithm name, used in logs.
    fn name(&self) -> &str;

    /// Binds one fresh state record per parameter, appended in order.
    ///
    /// # Errors
    /// `OptimizerAlreadyBound` if one of `parameters` is already bound to this optimizer.
    fn add_function_parameters(&mut self, parameters: &[Parameter]) -> Result<(), GradStackError>;

    /// Applies the update rule to every bound parameter.
    ///
    /// Only value buffers are written; gradients are left untouched.
    fn update(&mut self) -> Result<(), GradStackError>;

    /// Number of bound parameters.
    fn num_parameters(&self) -> usize;
}
