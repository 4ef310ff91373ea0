use log::{debug, trace};

use crate::error::{GradStackError, Result};
use crate::nn::parameter::Parameter;
use crate::optim::optimizer_state::{bind_parameters, ParamState};
use crate::optim::optimizer_trait::Optimizer;

#[derive(Clone, Debug, PartialEq)]
pub struct AdaDeltaHyperParams {
    /// Decay rate of both running averages.
    pub rho: f64,
    pub eps: f64,
}

impl Default for AdaDeltaHyperParams {
    fn default() -> Self {
        AdaDeltaHyperParams {
            rho: 0.95,
            eps: 1e-6,
        }
    }
}

/// Running averages kept per parameter element.
#[derive(Debug, Clone)]
pub struct AdaDeltaParamState {
    /// Decayed mean of squared gradients.
    pub msg: Vec<f64>,
    /// Decayed mean of squared updates.
    pub msdx: Vec<f64>,
}

/// AdaDelta (Zeiler, 2012). Needs no learning rate.
#[derive(Debug)]
pub struct AdaDeltaOptimizer {
    hyper_params: AdaDeltaHyperParams,
    params: Vec<ParamState<AdaDeltaParamState>>,
}

impl AdaDeltaOptimizer {
    pub fn new(hyper_params: AdaDeltaHyperParams) -> Result<Self> {
        if !(0.0..1.0).contains(&hyper_params.rho) {
            return Err(GradStackError::ConfigurationError(
                "rho must be in [0.0, 1.0)".to_string(),
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

    pub fn hyper_params(&self) -> &AdaDeltaHyperParams {
        &self.hyper_params
    }

    /// State records in binding order.
    pub fn param_states(&self) -> &[ParamState<AdaDeltaParamState>] {
        &self.params
    }
}

impl Optimizer for AdaDeltaOptimizer {
    fn name(&self) -> &str {
        "AdaDelta"
    }

    fn add_function_parameters(&mut self, parameters: &[Parameter]) -> Result<()> {
        bind_parameters("AdaDelta", &mut self.params, parameters, |n| {
            AdaDeltaParamState {
                msg: vec![0.0; n],
                msdx: vec![0.0; n],
            }
        })
    }

    fn update(&mut self) -> Result<()> {
        debug!("AdaDeltaOptimizer: update() over {} parameters", self.params.len());
        let AdaDeltaHyperParams { rho, eps } = self.hyper_params;

        for (param_idx, record) in self.params.iter_mut().enumerate() {
            record.update_with(|value, grad, state| {
                for i in 0..value.len() {
                    let g = grad[i];
                    state.msg[i] *= rho;
                    state.msg[i] += (1.0 - rho) * g * g;

                    let dx = ((state.msdx[i] + eps) / (state.msg[i] + eps)).sqrt() * g;

                    state.msdx[i] *= rho;
                    state.msdx[i] += (1.0 - rho) * dx * dx;

                    value[i] -= dx;
                }
            })?;
            trace!("AdaDeltaOptimizer: updated param {}", param_idx);
        }
        Ok(())
    }

    fn num_parameters(&self) -> usize {
        self.params.len()
    }
}

#[cfg(test)]
#[path = "adadelta_test.rs"]
mod tests;
