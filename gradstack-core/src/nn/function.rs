use crate::error::{GradStackError, Result};
use crate::nn::parameter::Parameter;
use crate::optim::Optimizer;
use crate::tensor::Tensor;
use log::{debug, warn};
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_BINDING_ID: AtomicU64 = AtomicU64::new(1);

/// State shared by every function: identity, widths, parameters and bound optimizers.
#[derive(Debug)]
pub struct FunctionBase {
    name: String,
    input_count: usize,
    output_count: usize,
    parameters: Vec<Parameter>,
    optimizers: Vec<Box<dyn Optimizer>>,
    is_parallel: bool,
}

impl FunctionBase {
    /// Creates the base of a function with no parameters.
    ///
    /// `is_parallel` is ignored in builds with debug assertions (this includes
    /// test runs), so those always execute single-threaded and deterministically.
    pub fn new(
        name: impl Into<String>,
        input_count: usize,
        output_count: usize,
        is_parallel: bool,
    ) -> Self {
        FunctionBase {
            name: name.into(),
            input_count,
            output_count,
            parameters: Vec::new(),
            optimizers: Vec::new(),
            is_parallel: is_parallel && !cfg!(debug_assertions),
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<Parameter>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_count(&self) -> usize {
        self.input_count
    }

    pub fn output_count(&self) -> usize {
        self.output_count
    }

    pub fn parameters(&self) -> &[Parameter] {
        &self.parameters
    }

    pub fn optimizers(&self) -> &[Box<dyn Optimizer>] {
        &self.optimizers
    }

    pub fn is_parallel(&self) -> bool {
        self.is_parallel
    }

    fn add_train_count(&self, count: usize) -> Result<()> {
        for parameter in &self.parameters {
            parameter.add_train_count(count)?;
        }
        Ok(())
    }

    fn bind_optimizers(&mut self, mut optimizers: Vec<Box<dyn Optimizer>>) -> Result<()> {
        if optimizers.is_empty() {
            return Err(GradStackError::ConfigurationError(format!(
                "set_optimizer on '{}' needs at least one optimizer",
                self.name
            )));
        }
        for parameter in &self.parameters {
            let data = parameter.read()?;
            if data.binding.is_some() {
                return Err(GradStackError::OptimizerAlreadyBound {
                    parameter: data.name.clone(),
                });
            }
        }

        // Parameters are marked only once every optimizer accepted them.
        for optimizer in optimizers.iter_mut() {
            optimizer.add_function_parameters(&self.parameters)?;
        }

        let binding = NEXT_BINDING_ID.fetch_add(1, Ordering::Relaxed);
        for parameter in &self.parameters {
            parameter.write()?.binding = Some(binding);
        }
        debug!(
            "{}: bound {} optimizer(s) to {} parameters",
            self.name,
            optimizers.len(),
            self.parameters.len()
        );
        self.optimizers = optimizers;
        Ok(())
    }

    fn run_optimizers(&mut self) -> Result<()> {
        if self.optimizers.is_empty() {
            return Err(GradStackError::UnboundOptimizer {
                function: self.name.clone(),
            });
        }
        for parameter in &self.parameters {
            if parameter.train_count()? > 0 {
                warn!(
                    "{}: update() called before reduce(); gradients are not averaged",
                    self.name
                );
                break;
            }
        }
        for optimizer in self.optimizers.iter_mut() {
            optimizer.update()?;
        }
        Ok(())
    }
}

/// The unit of computation: a differentiable transform that may own trainable
/// parameters.
///
/// Implementors provide the batch algorithms (`forward_batch`, `backward_batch`,
/// `predict_batch`) and access to their [`FunctionBase`]. Everything callers use
/// during training is provided on top of those:
///
/// 1. `clear_grads()`
/// 2. one or more `forward` / `backward` pairs
/// 3. `reduce()`
/// 4. `update()`
///
/// # Train count policy
/// A successful `backward` adds the batch length to the train count of every
/// owned parameter (`backward_one` adds one), so `reduce` yields the mean
/// gradient per sample. The batch hooks never touch train counts; composites
/// call their children's `backward_batch` so shared parameters are counted once.
pub trait Function: Debug + Send + Sync {
    fn base(&self) -> &FunctionBase;

    fn base_mut(&mut self) -> &mut FunctionBase;

    /// Batch forward algorithm. Records whatever `backward_batch` will need.
    fn forward_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Batch backward algorithm. Consumes the most recent forward record,
    /// accumulates parameter gradients and returns gradients for the inputs.
    ///
    /// # Errors
    /// `MissingForwardState` when no forward record is outstanding.
    fn backward_batch(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Inference path: must not record training state or touch gradients.
    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>>;

    /// Discards volatile per-sequence state. Parameters are never touched.
    fn reset_state(&mut self) {}

    fn name(&self) -> &str {
        self.base().name()
    }

    fn parameters(&self) -> &[Parameter] {
        self.base().parameters()
    }

    fn forward(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        self.forward_batch(x)
    }

    fn forward_one(&mut self, x: &Tensor) -> Result<Tensor> {
        let outputs = self.forward_batch(std::slice::from_ref(x))?;
        single(outputs, self.name())
    }

    fn backward(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>> {
        let gx = self.backward_batch(gy)?;
        self.base().add_train_count(gy.len())?;
        Ok(gx)
    }

    fn backward_one(&mut self, gy: &Tensor) -> Result<Tensor> {
        let gx = self.backward_batch(std::slice::from_ref(gy))?;
        self.base().add_train_count(1)?;
        single(gx, self.name())
    }

    fn predict(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        self.predict_batch(x)
    }

    fn predict_one(&mut self, x: &Tensor) -> Result<Tensor> {
        let outputs = self.predict_batch(std::slice::from_ref(x))?;
        single(outputs, self.name())
    }

    /// Rescales every accumulated gradient by `1 / train_count` and resets the counts.
    fn reduce(&self) -> Result<()> {
        for parameter in self.parameters() {
            parameter.reduce()?;
        }
        Ok(())
    }

    /// Runs every bound optimizer.
    ///
    /// # Errors
    /// `UnboundOptimizer` if `set_optimizer` was never called.
    fn update(&mut self) -> Result<()> {
        self.base_mut().run_optimizers()
    }

    /// Zeroes every owned gradient buffer.
    fn clear_grads(&self) -> Result<()> {
        for parameter in self.parameters() {
            parameter.clear_grad()?;
        }
        Ok(())
    }

    /// Binds `optimizers` to the current parameter set. Call once per function.
    ///
    /// On error the passed optimizers are dropped and no parameter is marked
    /// bound, so a later call may retry with fresh optimizers.
    ///
    /// # Errors
    /// `OptimizerAlreadyBound` if any parameter already belongs to a binding,
    /// including one made through a composite that republishes it.
    fn set_optimizer(&mut self, optimizers: Vec<Box<dyn Optimizer>>) -> Result<()> {
        self.base_mut().bind_optimizers(optimizers)
    }
}

fn single(mut batch: Vec<Tensor>, function: &str) -> Result<Tensor> {
    if batch.len() != 1 {
        return Err(GradStackError::ShapeMismatch {
            expected: vec![1],
            actual: vec![batch.len()],
            operation: format!("{} single-sample call", function),
        });
    }
    batch
        .pop()
        .ok_or_else(|| GradStackError::shape_mismatch(&[1], &[0], function))
}

/// Checks that every tensor of a batch holds `expected` elements.
pub(crate) fn ensure_batch_numel(batch: &[Tensor], expected: usize, operation: &str) -> Result<()> {
    for t in batch {
        t.ensure_numel(expected, operation)?;
    }
    Ok(())
}

/// Checks that a backward batch is as long as the forward batch it answers.
pub(crate) fn ensure_batch_len(expected: usize, actual: usize, operation: &str) -> Result<()> {
    if expected != actual {
        return Err(GradStackError::shape_mismatch(&[expected], &[actual], operation));
    }
    Ok(())
}

#[cfg(test)]
#[path = "function_test.rs"]
mod tests;
