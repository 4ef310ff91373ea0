use log::debug;

use crate::error::{GradStackError, Result};
use crate::nn::parameter::Parameter;
use crate::optim::optimizer_state::{bind_parameters, ParamState};
use crate::optim::optimizer_trait::Optimizer;

#[derive(Clone, Debug, PartialEq)]
pub struct SgdHyperParams {
    pub lr: f64,
}

impl Default for SgdHyperParams {
    fn default() -> Self {
        SgdHyperParams { lr: 0.1 }
    }
}

/// Implements plain Stochastic Gradient Descent: `w -= lr * g`.
///
/// SGD keeps no per-element state; its records only hold the bound parameters.
#[derive(Debug)]
pub struct SgdOptimizer {
    hyper_params: SgdHyperParams,
    params: Vec<ParamState<()>>,
}

impl SgdOptimizer {
    pub fn new(hyper_params: SgdHyperParams) -> Result<Self> {
        if hyper_params.lr <= 0.0 {
            return Err(GradStackError::ConfigurationError(
                "Learning rate must be positive".to_string(),
            ));
        }
        Ok(Self {
            hyper_params,
            params: Vec::new(),
        })
    }

    pub fn lr(&self) -> f64 {
        self.hyper_params.lr
    }

    pub fn set_lr(&mut self, lr: f64) {
        self.hyper_params.lr = lr;
    }
}

impl Optimizer for SgdOptimizer {
    fn name(&self) -> &str {
        "SGD"
    }

    fn add_function_parameters(&mut self, parameters: &[Parameter]) -> Result<()> {
        bind_parameters("SGD", &mut self.params, parameters, |_| ())
    }

    fn update(&mut self) -> Result<()> {
        debug!("SgdOptimizer: update() over {} parameters", self.params.len());
        let lr = self.hyper_params.lr;
        for record in self.params.iter_mut() {
            record.update_with(|value, grad, _| {
                for (w, g) in value.iter_mut().zip(grad.iter()) {
                    *w -= lr * g;
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
#[path = "sgd_test.rs"]
mod tests;
