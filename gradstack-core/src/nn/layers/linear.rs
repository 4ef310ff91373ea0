use crate::error::{GradStackError, Result};
use crate::nn::function::{ensure_batch_len, ensure_batch_numel, Function, FunctionBase};
use crate::nn::history::BatchHistory;
use crate::nn::init::{copy_initial_, init_or_copy_};
use crate::nn::parameter::{Parameter, ParameterData};
use crate::tensor::Tensor;
use log::debug;
use rand::Rng;
use rayon::prelude::*;

/// Construction options for [`Linear`].
#[derive(Debug, Clone)]
pub struct LinearConfig {
    pub no_bias: bool,
    /// Row-major `[out, in]` buffer copied into the weight instead of a random draw.
    pub initial_weight: Option<Vec<f64>>,
    pub initial_bias: Option<Vec<f64>>,
    pub name: String,
    pub is_parallel: bool,
}

impl Default for LinearConfig {
    fn default() -> Self {
        LinearConfig {
            no_bias: false,
            initial_weight: None,
            initial_bias: None,
            name: "Linear".to_string(),
            is_parallel: true,
        }
    }
}

/// Applies a linear transformation to every sample: `y = W x + b`.
///
/// The weight has shape `[out_features, in_features]`, the bias `[out_features]`.
/// Parameters are published as `[weight, bias]`, or `[weight]` without bias.
#[derive(Debug)]
pub struct Linear {
    base: FunctionBase,
    weight: Parameter,
    bias: Option<Parameter>,
    inputs: BatchHistory,
}

impl Linear {
    /// Creates a new Linear layer.
    ///
    /// Weights not given in `config` are drawn from `rng` with the fan-in scaled
    /// normal initializer. The bias starts at zero unless given.
    ///
    /// # Errors
    /// `ShapeMismatch` if an initial buffer has the wrong element count, and
    /// `ConfigurationError` for a zero-sized layer or a bias given with `no_bias`.
    pub fn new<R>(
        in_features: usize,
        out_features: usize,
        config: LinearConfig,
        rng: &mut R,
    ) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        if config.no_bias && config.initial_bias.is_some() {
            return Err(GradStackError::ConfigurationError(format!(
                "{}: initial bias given for a layer without bias",
                config.name
            )));
        }

        let mut weight_tensor = Tensor::zeros(&[out_features, in_features]);
        init_or_copy_(
            &mut weight_tensor,
            config.initial_weight.as_deref(),
            rng,
            &format!("{} weight init", config.name),
        )?;
        let weight = Parameter::new(weight_tensor, format!("{}.weight", config.name));

        let bias = if config.no_bias {
            None
        } else {
            let mut bias_tensor = Tensor::zeros(&[out_features]);
            if let Some(initial) = config.initial_bias.as_deref() {
                copy_initial_(
                    &mut bias_tensor,
                    initial,
                    &format!("{} bias init", config.name),
                )?;
            }
            Some(Parameter::new(bias_tensor, format!("{}.bias", config.name)))
        };

        let mut parameters = vec![weight.clone()];
        parameters.extend(bias.iter().cloned());
        debug!(
            "{}: created Linear {} -> {} (bias: {})",
            config.name,
            in_features,
            out_features,
            bias.is_some()
        );

        Ok(Linear {
            base: FunctionBase::new(config.name, in_features, out_features, config.is_parallel)
                .with_parameters(parameters),
            weight,
            bias,
            inputs: BatchHistory::new(),
        })
    }

    pub fn weight(&self) -> &Parameter {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Parameter> {
        self.bias.as_ref()
    }

    /// Number of forward batches still waiting for their backward.
    pub fn history_depth(&self) -> usize {
        self.inputs.depth()
    }

    fn compute(&self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let in_features = self.base.input_count();
        let out_features = self.base.output_count();
        ensure_batch_numel(x, in_features, self.base.name())?;

        let weight = self.weight.read()?;
        let bias = match &self.bias {
            Some(b) => Some(b.read()?),
            None => None,
        };
        let w = weight.value.data();
        let b = bias.as_ref().map(|guard| guard.value.data());

        let project = |xi: &Tensor| -> Tensor {
            let xs = xi.data();
            let y = (0..out_features)
                .map(|o| {
                    let row = &w[o * in_features..(o + 1) * in_features];
                    let dot: f64 = row.iter().zip(xs).map(|(wv, xv)| wv * xv).sum();
                    b.map_or(dot, |b| dot + b[o])
                })
                .collect();
            Tensor::from_vec(y)
        };

        let y: Vec<Tensor> = if self.base.is_parallel() {
            x.par_iter().map(project).collect()
        } else {
            x.iter().map(project).collect()
        };
        Ok(y)
    }
}

impl Function for Linear {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn forward_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let y = self.compute(x)?;
        self.inputs.push(x.to_vec());
        Ok(y)
    }

    fn backward_batch(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>> {
        let name = self.base.name();
        let in_features = self.base.input_count();
        let out_features = self.base.output_count();
        let x = self.inputs.peek(name)?;
        ensure_batch_len(x.len(), gy.len(), name)?;
        ensure_batch_numel(gy, out_features, name)?;

        let gx = {
            let mut guard = self.weight.write()?;
            let ParameterData { value, grad, .. } = &mut *guard;
            let w = value.data();

            let input_grad = |g: &Tensor| -> Tensor {
                let gs = g.data();
                let mut gxi = vec![0.0; in_features];
                for (o, go) in gs.iter().enumerate() {
                    let row = &w[o * in_features..(o + 1) * in_features];
                    for (acc, wv) in gxi.iter_mut().zip(row) {
                        *acc += wv * go;
                    }
                }
                Tensor::from_vec(gxi)
            };
            let gx: Vec<Tensor> = if self.base.is_parallel() {
                gy.par_iter().map(input_grad).collect()
            } else {
                gy.iter().map(input_grad).collect()
            };

            // Accumulated in sample order so the sum does not depend on scheduling.
            let gw = grad.data_mut();
            for (g, xi) in gy.iter().zip(x) {
                for (o, go) in g.data().iter().enumerate() {
                    let row = &mut gw[o * in_features..(o + 1) * in_features];
                    for (acc, xv) in row.iter_mut().zip(xi.data()) {
                        *acc += go * xv;
                    }
                }
            }
            gx
        };

        if let Some(bias) = &self.bias {
            let mut guard = bias.write()?;
            for g in gy {
                for (acc, go) in guard.grad.data_mut().iter_mut().zip(g.data()) {
                    *acc += go;
                }
            }
        }

        self.inputs.pop(name)?;
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        self.compute(x)
    }

    fn reset_state(&mut self) {
        self.inputs.clear();
    }
}

#[cfg(test)]
#[path = "linear_test.rs"]
mod tests;
