use crate::error::Result;
use crate::nn::activations::{backward_from_outputs, grad_sigmoid, map_batch, sigmoid};
use crate::nn::function::{Function, FunctionBase};
use crate::nn::history::BatchHistory;
use crate::tensor::Tensor;

/// Elementwise logistic function.
#[derive(Debug)]
pub struct Sigmoid {
    base: FunctionBase,
    outputs: BatchHistory,
}

impl Sigmoid {
    pub fn new(name: impl Into<String>) -> Self {
        Sigmoid {
            base: FunctionBase::new(name, 0, 0, false),
            outputs: BatchHistory::new(),
        }
    }
}

impl Default for Sigmoid {
    fn default() -> Self {
        Sigmoid::new("Sigmoid")
    }
}

impl Function for Sigmoid {
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
        let gx = backward_from_outputs(self.outputs.peek(name)?, gy, grad_sigmoid, name)?;
        self.outputs.pop(name)?;
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(map_batch(x, sigmoid))
    }

    fn reset_state(&mut self) {
        self.outputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_backward_uses_output() {
        let mut f = Sigmoid::default();
        let y = f.forward_one(&Tensor::from_vec(vec![0.0, 2.0])).unwrap();
        assert_relative_eq!(y.data()[0], 0.5);

        let gx = f.backward_one(&Tensor::from_vec(vec![1.0, 2.0])).unwrap();
        assert_relative_eq!(gx.data()[0], 0.25);
        let y1 = y.data()[1];
        assert_relative_eq!(gx.data()[1], 2.0 * y1 * (1.0 - y1));
    }
}
