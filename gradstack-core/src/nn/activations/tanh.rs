use crate::error::Result;
use crate::nn::activations::{backward_from_outputs, grad_tanh, map_batch};
use crate::nn::function::{Function, FunctionBase};
use crate::nn::history::BatchHistory;
use crate::tensor::Tensor;

/// Elementwise hyperbolic tangent.
#[derive(Debug)]
pub struct Tanh {
    base: FunctionBase,
    outputs: BatchHistory,
}

impl Tanh {
    pub fn new(name: impl Into<String>) -> Self {
        Tanh {
            base: FunctionBase::new(name, 0, 0, false),
            outputs: BatchHistory::new(),
        }
    }
}

impl Default for Tanh {
    fn default() -> Self {
        Tanh::new("Tanh")
    }
}

impl Function for Tanh {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn forward_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let y = self.predict_batch(x)?;
        self.outputs.push(y.clone());
        Ok(y)
    }

    fn backward_batch(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>> {
        let name = self.base.name();
        let gx = backward_from_outputs(self.outputs.peek(name)?, gy, grad_tanh, name)?;
        self.outputs.pop(name)?;
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(map_batch(x, f64::tanh))
    }

    fn reset_state(&mut self) {
        self.outputs.clear();
    }
}
