use crate::error::{GradStackError, Result};
use crate::nn::activations::{grad_sigmoid, grad_tanh, sigmoid};
use crate::nn::function::{ensure_batch_len, ensure_batch_numel, Function, FunctionBase};
use crate::nn::history::missing_forward_state;
use crate::nn::layers::linear::{Linear, LinearConfig};
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use log::{debug, trace};
use rand::Rng;
use rayon::prelude::*;

/// Construction options for [`Lstm`].
///
/// Each initial buffer is copied into all four projections of its kind:
/// `initial_upward_weight` is `[out, in]`, `initial_upward_bias` is `[out]` and
/// `initial_lateral_weight` is `[out, out]`.
#[derive(Debug, Clone)]
pub struct LstmConfig {
    pub initial_upward_weight: Option<Vec<f64>>,
    pub initial_upward_bias: Option<Vec<f64>>,
    pub initial_lateral_weight: Option<Vec<f64>>,
    pub name: String,
    pub is_parallel: bool,
}

impl Default for LstmConfig {
    fn default() -> Self {
        LstmConfig {
            initial_upward_weight: None,
            initial_upward_bias: None,
            initial_lateral_weight: None,
            name: "LSTM".to_string(),
            is_parallel: true,
        }
    }
}

/// Reorders four projection outputs into the four gate pre-activations.
///
/// Combined index `k` reads position `k % out` of projection `k / out` and writes
/// slot `k / 4` of gate `k % 4`. Gates come out as input activation, input gate,
/// forget gate, output gate.
///
/// # Panics
/// If a projection holds fewer than `out` elements.
pub fn extract_gates(projections: [&[f64]; 4], out: usize) -> [Vec<f64>; 4] {
    let mut gates: [Vec<f64>; 4] = std::array::from_fn(|_| vec![0.0; out]);
    for k in 0..4 * out {
        gates[k % 4][k / 4] = projections[k / out][k % out];
    }
    gates
}

/// Exact inverse of [`extract_gates`].
///
/// # Panics
/// If a gate holds fewer than `out` elements.
pub fn restore_gates(gates: [&[f64]; 4], out: usize) -> [Vec<f64>; 4] {
    let mut projections: [Vec<f64>; 4] = std::array::from_fn(|_| vec![0.0; out]);
    for k in 0..4 * out {
        projections[k / out][k % out] = gates[k % 4][k / 4];
    }
    projections
}

/// One cell step: activated gates `[a, i, f, o]`, the new cell and the new hidden state.
fn cell_step(projections: [&[f64]; 4], c_prev: &[f64], out: usize) -> ([Vec<f64>; 4], Vec<f64>, Vec<f64>) {
    let [mut a, mut i, mut f, mut o] = extract_gates(projections, out);
    a.iter_mut().for_each(|v| *v = v.tanh());
    i.iter_mut().for_each(|v| *v = sigmoid(*v));
    f.iter_mut().for_each(|v| *v = sigmoid(*v));
    o.iter_mut().for_each(|v| *v = sigmoid(*v));

    let mut c = vec![0.0; out];
    let mut h = vec![0.0; out];
    for j in 0..out {
        c[j] = a[j] * i[j] + f[j] * c_prev[j];
        h[j] = o[j] * c[j].tanh();
    }
    ([a, i, f, o], c, h)
}

/// Training history of one batch position.
///
/// `cells` starts with the zero state, so it always holds one entry more than
/// the gate stacks while the sample is running.
#[derive(Debug, Clone)]
struct SampleState {
    hidden: Vec<f64>,
    cells: Vec<Vec<f64>>,
    activations: Vec<Vec<f64>>,
    input_gates: Vec<Vec<f64>>,
    forget_gates: Vec<Vec<f64>>,
    output_gates: Vec<Vec<f64>>,
    /// Cell gradient carried from the later time step into the earlier one.
    cell_grad: Vec<f64>,
}

impl SampleState {
    fn new(out: usize) -> Self {
        SampleState {
            hidden: vec![0.0; out],
            cells: vec![vec![0.0; out]],
            activations: Vec::new(),
            input_gates: Vec::new(),
            forget_gates: Vec::new(),
            output_gates: Vec::new(),
            cell_grad: vec![0.0; out],
        }
    }

    fn depth(&self) -> usize {
        self.activations.len()
    }

    fn step_forward(&mut self, projections: [&[f64]; 4], out: usize) -> Vec<f64> {
        if self.cells.is_empty() {
            self.cells.push(vec![0.0; out]);
        }
        let c_prev = &self.cells[self.cells.len() - 1];
        let ([a, i, f, o], c, h) = cell_step(projections, c_prev, out);
        self.cells.push(c);
        self.activations.push(a);
        self.input_gates.push(i);
        self.forget_gates.push(f);
        self.output_gates.push(o);
        self.hidden = h.clone();
        h
    }

    /// Pops the most recent step and returns the four projection gradients.
    fn step_backward(&mut self, gh: &[f64], out: usize, function: &str) -> Result<[Vec<f64>; 4]> {
        let missing = || missing_forward_state(function);
        let a = self.activations.pop().ok_or_else(missing)?;
        let i = self.input_gates.pop().ok_or_else(missing)?;
        let f = self.forget_gates.pop().ok_or_else(missing)?;
        let o = self.output_gates.pop().ok_or_else(missing)?;
        let c = self.cells.pop().ok_or_else(missing)?;
        let c_prev = self.cells.last().ok_or_else(missing)?;

        let mut ga = vec![0.0; out];
        let mut gi = vec![0.0; out];
        let mut gf = vec![0.0; out];
        let mut go = vec![0.0; out];
        for j in 0..out {
            let co = c[j].tanh();
            self.cell_grad[j] += gh[j] * o[j] * grad_tanh(co);
            let gc = self.cell_grad[j];
            ga[j] = gc * i[j] * grad_tanh(a[j]);
            gi[j] = gc * a[j] * grad_sigmoid(i[j]);
            gf[j] = gc * c_prev[j] * grad_sigmoid(f[j]);
            go[j] = gh[j] * co * grad_sigmoid(o[j]);
            self.cell_grad[j] = gc * f[j];
        }
        Ok(restore_gates([&ga, &gi, &gf, &go], out))
    }
}

/// Hidden and cell state advanced by `predict`.
#[derive(Debug, Clone)]
struct InferenceState {
    hidden: Vec<f64>,
    cell: Vec<f64>,
}

/// Long short-term memory layer trained by back-propagation through time.
///
/// Every `forward` call advances one time step for each sample of the batch and
/// records the step; every `backward` call unwinds the most recent outstanding
/// step. Once all steps are unwound the layer starts the next sequence from a
/// zero state. Call [`Function::reset_state`] to abandon a sequence early.
///
/// The gate pre-activations come from four upward projections of the input
/// (with bias) plus, after the first step, four lateral projections of the
/// previous hidden state (no bias). Parameters are published as the upward
/// weight and bias of each projection in turn, then the four lateral weights.
#[derive(Debug)]
pub struct Lstm {
    base: FunctionBase,
    upward: [Linear; 4],
    lateral: [Linear; 4],
    samples: Vec<SampleState>,
    /// One flag per outstanding step: whether it used the lateral projections.
    lateral_steps: Vec<bool>,
    /// Projection gradients of the last unwound step, owed to the lateral backward.
    pending_gate_grads: Option<[Vec<Tensor>; 4]>,
    inference: Vec<InferenceState>,
}

impl Lstm {
    /// # Errors
    /// `ShapeMismatch` if an initial buffer in `config` has the wrong element count.
    pub fn new<R>(in_features: usize, out_features: usize, config: LstmConfig, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let mut upward = Vec::with_capacity(4);
        for k in 0..4 {
            upward.push(Linear::new(
                in_features,
                out_features,
                LinearConfig {
                    no_bias: false,
                    initial_weight: config.initial_upward_weight.clone(),
                    initial_bias: config.initial_upward_bias.clone(),
                    name: format!("{}.upward{}", config.name, k),
                    is_parallel: config.is_parallel,
                },
                rng,
            )?);
        }
        let mut lateral = Vec::with_capacity(4);
        for k in 0..4 {
            lateral.push(Linear::new(
                out_features,
                out_features,
                LinearConfig {
                    no_bias: true,
                    initial_weight: config.initial_lateral_weight.clone(),
                    initial_bias: None,
                    name: format!("{}.lateral{}", config.name, k),
                    is_parallel: config.is_parallel,
                },
                rng,
            )?);
        }
        let upward = into_four(upward)?;
        let lateral = into_four(lateral)?;

        let parameters: Vec<Parameter> = upward
            .iter()
            .chain(lateral.iter())
            .flat_map(|linear| linear.parameters().iter().cloned())
            .collect();
        debug!(
            "{}: created LSTM {} -> {} with {} parameters",
            config.name,
            in_features,
            out_features,
            parameters.len()
        );

        Ok(Lstm {
            base: FunctionBase::new(config.name, in_features, out_features, config.is_parallel)
                .with_parameters(parameters),
            upward,
            lateral,
            samples: Vec::new(),
            lateral_steps: Vec::new(),
            pending_gate_grads: None,
            inference: Vec::new(),
        })
    }

    pub fn upward(&self) -> &[Linear; 4] {
        &self.upward
    }

    pub fn lateral(&self) -> &[Linear; 4] {
        &self.lateral
    }

    /// Outstanding forward steps per sample; zero when no sequence is running.
    pub fn history_depth(&self) -> usize {
        self.samples.first().map_or(0, SampleState::depth)
    }

    /// Batch size of the running training sequence, if any.
    pub fn batch_size(&self) -> Option<usize> {
        if self.samples.is_empty() {
            None
        } else {
            Some(self.samples.len())
        }
    }

    fn check_batch(&self, running: usize, x: &[Tensor]) -> Result<()> {
        // A step with no samples would record sub-layer history but no sample state.
        if x.is_empty() {
            return Err(GradStackError::shape_mismatch(
                &[running.max(1)],
                &[0],
                format!("{} batch size", self.base.name()),
            ));
        }
        ensure_batch_numel(x, self.base.input_count(), self.base.name())?;
        if running != 0 && running != x.len() {
            return Err(GradStackError::shape_mismatch(
                &[running],
                &[x.len()],
                format!("{} batch size (call reset_state between sequences)", self.base.name()),
            ));
        }
        Ok(())
    }

    fn upward_projections(&mut self, x: &[Tensor], training: bool) -> Result<Vec<Vec<Tensor>>> {
        let mut projections = Vec::with_capacity(4);
        for linear in self.upward.iter_mut() {
            projections.push(if training {
                linear.forward_batch(x)?
            } else {
                linear.predict_batch(x)?
            });
        }
        Ok(projections)
    }

    fn add_lateral_projections(
        &mut self,
        projections: &mut [Vec<Tensor>],
        hiddens: &[Tensor],
        training: bool,
    ) -> Result<()> {
        for (linear, projection) in self.lateral.iter_mut().zip(projections.iter_mut()) {
            let lateral = if training {
                linear.forward_batch(hiddens)?
            } else {
                linear.predict_batch(hiddens)?
            };
            for (p, l) in projection.iter_mut().zip(&lateral) {
                p.add_assign(l)?;
            }
        }
        Ok(())
    }

    /// Runs the owed lateral backward, returning the gradient for the previous hidden states.
    fn lateral_backward(&mut self, gate_grads: &[Vec<Tensor>; 4]) -> Result<Vec<Tensor>> {
        let mut gh: Option<Vec<Tensor>> = None;
        for (linear, grads) in self.lateral.iter_mut().zip(gate_grads.iter()) {
            let back = linear.backward_batch(grads)?;
            match gh.as_mut() {
                Some(acc) => {
                    for (a, b) in acc.iter_mut().zip(&back) {
                        a.add_assign(b)?;
                    }
                }
                None => gh = Some(back),
            }
        }
        Ok(gh.unwrap_or_default())
    }

    fn finish_sequence(&mut self) -> Result<()> {
        if let Some(pending) = self.pending_gate_grads.take() {
            self.lateral_backward(&pending)?;
        }
        self.samples.clear();
        self.lateral_steps.clear();
        debug!("{}: sequence fully unwound", self.base.name());
        Ok(())
    }
}

fn into_four(linears: Vec<Linear>) -> Result<[Linear; 4]> {
    let len = linears.len();
    linears
        .try_into()
        .map_err(|_| GradStackError::shape_mismatch(&[4], &[len], "Lstm projections"))
}

impl Function for Lstm {
    fn base(&self) -> &FunctionBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut FunctionBase {
        &mut self.base
    }

    fn forward_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let out = self.base.output_count();
        self.check_batch(self.samples.len(), x)?;

        // Forward after a partial backward: the owed lateral gradient is settled
        // and gradient flow into the earlier steps is cut here.
        if let Some(pending) = self.pending_gate_grads.take() {
            trace!("{}: truncating gradient flow at resumed forward", self.base.name());
            self.lateral_backward(&pending)?;
            for sample in self.samples.iter_mut() {
                sample.cell_grad.iter_mut().for_each(|g| *g = 0.0);
            }
        }

        let mut projections = self.upward_projections(x, true)?;
        let has_lateral = !self.samples.is_empty();
        if has_lateral {
            let hiddens: Vec<Tensor> = self
                .samples
                .iter()
                .map(|s| Tensor::from_vec(s.hidden.clone()))
                .collect();
            self.add_lateral_projections(&mut projections, &hiddens, true)?;
        } else {
            self.samples = (0..x.len()).map(|_| SampleState::new(out)).collect();
        }
        self.lateral_steps.push(has_lateral);

        let step = |(n, sample): (usize, &mut SampleState)| -> Tensor {
            let p = [
                projections[0][n].data(),
                projections[1][n].data(),
                projections[2][n].data(),
                projections[3][n].data(),
            ];
            Tensor::from_vec(sample.step_forward(p, out))
        };
        let y: Vec<Tensor> = if self.base.is_parallel() {
            self.samples.par_iter_mut().enumerate().map(step).collect()
        } else {
            self.samples.iter_mut().enumerate().map(step).collect()
        };
        trace!(
            "{}: forward step, depth now {}",
            self.base.name(),
            self.history_depth()
        );
        Ok(y)
    }

    fn backward_batch(&mut self, gy: &[Tensor]) -> Result<Vec<Tensor>> {
        let name = self.base.name().to_string();
        let in_features = self.base.input_count();
        let out = self.base.output_count();
        if self.samples.is_empty() || self.samples.iter().any(|s| s.depth() == 0) {
            return Err(missing_forward_state(&name));
        }
        ensure_batch_len(self.samples.len(), gy.len(), &name)?;
        ensure_batch_numel(gy, out, &name)?;

        let mut gh = gy.to_vec();
        if let Some(pending) = self.pending_gate_grads.take() {
            let lateral = self.lateral_backward(&pending)?;
            for (g, l) in gh.iter_mut().zip(&lateral) {
                g.add_assign(l)?;
            }
        }
        let had_lateral = self.lateral_steps.pop().unwrap_or(false);

        let step = |(sample, g): (&mut SampleState, &Tensor)| sample.step_backward(g.data(), out, &name);
        let per_sample: Vec<[Vec<f64>; 4]> = if self.base.is_parallel() {
            self.samples
                .par_iter_mut()
                .zip(gh.par_iter())
                .map(step)
                .collect::<Result<_>>()?
        } else {
            self.samples
                .iter_mut()
                .zip(gh.iter())
                .map(step)
                .collect::<Result<_>>()?
        };

        let gate_grads: [Vec<Tensor>; 4] = std::array::from_fn(|k| {
            per_sample
                .iter()
                .map(|grads| Tensor::from_vec(grads[k].clone()))
                .collect()
        });

        let mut gx: Vec<Tensor> = (0..gy.len()).map(|_| Tensor::zeros(&[in_features])).collect();
        for (linear, grads) in self.upward.iter_mut().zip(gate_grads.iter()) {
            let back = linear.backward_batch(grads)?;
            for (acc, b) in gx.iter_mut().zip(&back) {
                acc.add_assign(b)?;
            }
        }

        if had_lateral {
            self.pending_gate_grads = Some(gate_grads);
        }
        if self.history_depth() == 0 {
            self.finish_sequence()?;
        }
        Ok(gx)
    }

    fn predict_batch(&mut self, x: &[Tensor]) -> Result<Vec<Tensor>> {
        let out = self.base.output_count();
        self.check_batch(self.inference.len(), x)?;

        let mut projections = self.upward_projections(x, false)?;
        if self.inference.is_empty() {
            self.inference = (0..x.len())
                .map(|_| InferenceState {
                    hidden: vec![0.0; out],
                    cell: vec![0.0; out],
                })
                .collect();
        } else {
            let hiddens: Vec<Tensor> = self
                .inference
                .iter()
                .map(|s| Tensor::from_vec(s.hidden.clone()))
                .collect();
            self.add_lateral_projections(&mut projections, &hiddens, false)?;
        }

        let y: Vec<Tensor> = self
            .inference
            .iter_mut()
            .enumerate()
            .map(|(n, state)| {
                let p = [
                    projections[0][n].data(),
                    projections[1][n].data(),
                    projections[2][n].data(),
                    projections[3][n].data(),
                ];
                let (_, c, h) = cell_step(p, &state.cell, out);
                state.cell = c;
                state.hidden = h.clone();
                Tensor::from_vec(h)
            })
            .collect();
        Ok(y)
    }

    fn reset_state(&mut self) {
        for linear in self.upward.iter_mut().chain(self.lateral.iter_mut()) {
            linear.reset_state();
        }
        self.samples.clear();
        self.lateral_steps.clear();
        self.pending_gate_grads = None;
        self.inference.clear();
        debug!("{}: state reset", self.base.name());
    }
}

#[cfg(test)]
#[path = "lstm_test.rs"]
mod tests;
