use log::debug;

use crate::error::{GradStackError, Result};
use crate::nn::parameter::Parameter;
use crate::optim::optimizer_state::{bind_parameters, ParamState};
use crate::optim::optimizer_trait::Optimizer;

#[derive(Clone, Debug, PartialEq)]
pub struct AdaGradHyperParams {
    pub lr: f64,
    pub eps: f64,
}

impl Default for AdaGradHyperParams {
    fn default() -> Self {
        AdaGradHyperParams { lr: 0.01, eps: 1e-8 }
    }
}

#[derive(Debug, Clone)]
pub struct AdaGradParamState {
    /// Running sum of squared gradients.
    pub sum_gradient_squares: Vec<f64>,
}

/// AdaGrad: `h += g^2; w -= lr * g / (sqrt(h) + eps)`.
#[derive(Debug)]
pub struct AdaGradOptimizer {
    hyper_params: AdaGradHyperParams,
    params: Vec<ParamState<AdaGradParamState>>,
}

impl AdaGradOptimizer {
    pub fn new(hyper_params: AdaGradHyperParams) -> Result<Self> {
        if hyper_params.lr <= 0.0 {
            return Err(GradStackError::ConfigurationError(
                "Learning rate must be positive".to_string(),
            ));
        }
        if hyper_params.eps <= 0.0 {
            return Err(GradStackError::ConfigurationError(
                "Epsilon must be positive".to_string(),
            ));
        }
        Ok(Self {
            hyper_params,
            params: Vec::new(),
        })
    }

    pub fn param_states(&self) -> &[ParamState<AdaGradParamState>] {
        &self.params
    }
}

impl Optimizer for AdaGradOptimizer {
    fn name(&self) -> &str {
        "AdaGrad"
    }

    fn add_function_parameters(&mut self, parameters: &[Parameter]) -> Result<()> {
        bind_parameters("AdaGrad", &mut self.params, parameters, |n| {
            AdaGradParamState {
                sum_gradient_squares: vec![0.0; n],
            }
        })
    }

    fn update(&mut self) -> Result<()> {
        debug!("AdaGradOptimizer: update() over {} parameters", self.params.len());
        let AdaGradHyperParams { lr, eps } = self.hyper_params;
        for record in self.params.iter_mut() {
            record.update_with(|value, grad, state| {
                for i in 0..value.len() {
                    let g = grad[i];
                    state.sum_gradient_squares[i] += g * g;
                    value[i] -= lr * g / (state.sum_gradient_squares[i].sqrt() + eps);
                }
            })?;
        }
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
#[path = "adagrad_test.rs"]
mod tests;
