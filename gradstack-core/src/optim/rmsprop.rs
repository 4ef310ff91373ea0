use log::debug;

use crate::error::{GradStackError, Result};
use crate::nn::parameter::Parameter;
use crate::optim::optimizer_state::{bind_parameters, ParamState};
use crate::optim::optimizer_trait::Optimizer;

#[derive(Clone, Debug, PartialEq)]
pub struct RmsPropHyperParams {
    pub lr: f64,
    pub alpha: f64,
    pub eps: f64,
}

impl Default for RmsPropHyperParams {
    fn default() -> Self {
        RmsPropHyperParams {
            lr: 0.01,
            alpha: 0.99,
            eps: 1e-8,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RmsPropParamState {
    /// Decayed mean of squared gradients.
    pub square_avg: Vec<f64>,
}

/// RMSprop: `ms = alpha * ms + (1 - alpha) * g^2; w -= lr * g / (sqrt(ms) + eps)`.
#[derive(Debug)]
pub struct RmsPropOptimizer {
    hyper_params: RmsPropHyperParams,
    params: Vec<ParamState<RmsPropParamState>>,
}

impl RmsPropOptimizer {
    pub fn new(hyper_params: RmsPropHyperParams) -> Result<Self> {
        if hyper_params.lr <= 0.0 {
            return Err(GradStackError::ConfigurationError(
                "Learning rate must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&hyper_params.alpha) {
            return Err(GradStackError::ConfigurationError(
                "alpha must be in [0.0, 1.0]".to_string(),
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

    pub fn param_states(&self) -> &[ParamState<RmsPropParamState>] {
        &self.params
    }
}

impl Optimizer for RmsPropOptimizer {
    fn name(&self) -> &str {
        "RMSprop"
    }

    fn add_function_parameters(&mut self, parameters: &[Parameter]) -> Result<()> {
        bind_parameters("RMSprop", &mut self.params, parameters, |n| {
            RmsPropParamState {
                square_avg: vec![0.0; n],
            }
        })
    }

    fn update(&mut self) -> Result<()> {
        debug!("RmsPropOptimizer: update() over {} parameters", self.params.len());
        let RmsPropHyperParams { lr, alpha, eps } = self.hyper_params;
        for record in self.params.iter_mut() {
            record.update_with(|value, grad, state| {
                for i in 0..value.len() {
                    let g = grad[i];
                    state.square_avg[i] *= alpha;
                    state.square_avg[i] += (1.0 - alpha) * g * g;
                    value[i] -= lr * g / (state.square_avg[i].sqrt() + eps);
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
#[path = "rmsprop_test.rs"]
mod tests;
