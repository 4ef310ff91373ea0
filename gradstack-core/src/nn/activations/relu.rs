use crate::error::Result;
use crate::nn::activations::{backward_from_outputs, map_batch};
use crate::nn::function::{Function, FunctionBase};
use crate::nn::history::BatchHistory;
use crate::tensor::Tensor;

/// Rectified linear unit, `y = max(x, 0)`. Accepts tensors of any width.
#[derive(Debug)]
pub struct Relu {
    base: FunctionBase,
    outputs: BatchHistory,
}

impl Relu {
    pub fn new(name: impl Into<String>) -> Self {
        Relu {
            base: FunctionBase::new(name, 0, 0, false),
            outputs: BatchHistory::new(),
        }
    }
}

impl Default for Relu {
    fn default() -> Self {
        Relu::new("ReLU")
    }
}

impl Function for Relu {
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
        let gx = backward_from_outputs(
            self.outputs.peek(name)?,
            gy,
            |y| if y > 0.0 { 1.0 } else { 0.0 },
            name,
        )?;
        self.outputs.pop(name)?;
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        Ok(map_batch(x, |v| v.max(0.0)))
    }

    fn reset_state(&mut self) {
        self.outputs.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GradStackError;

    #[test]
    fn test_relu_forward_backward() {
        let mut relu = Relu::default();
        let y = relu
            .forward_one(&Tensor::from_vec(vec![-1.0, 0.0, 2.0]))
            .unwrap();
        assert_eq!(y.data(), &[0.0, 0.0, 2.0]);

        let gx = relu
            .backward_one(&Tensor::from_vec(vec![5.0, 5.0, 5.0]))
            .unwrap();
        assert_eq!(gx.data(), &[0.0, 0.0, 5.0]);
    }

    #[test]
    fn test_relu_backward_without_forward() {
        let mut relu = Relu::default();
        assert_eq!(
            relu.backward_one(&Tensor::from_vec(vec![1.0])),
            Err(GradStackError::MissingForwardState {
                function: "ReLU".to_string()
            })
        );
    }

    #[test]
    fn test_relu_rejects_mismatched_gradient_and_keeps_history() {
        let mut relu = Relu::default();
        relu.forward_one(&Tensor::from_vec(vec![1.0, 2.0])).unwrap();
        assert!(matches!(
            relu.backward_one(&Tensor::from_vec(vec![1.0])),
            Err(GradStackError::ShapeMismatch { .. })
        ));
        assert_eq!(relu.outputs.depth(), 1);
    }
}
