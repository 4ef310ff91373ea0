use crate::error::{GradStackError, Result};
use crate::nn::parameter::{Parameter, ParameterData};
use log::debug;

/// A bound parameter together with an optimizer's auxiliary state for it.
///
/// The state is created once, sized to the parameter, when the parameter is
/// bound; it is never resized afterwards.
#[derive(Debug)]
pub struct ParamState<S> {
    pub parameter: Parameter,
    pub state: S,
}

impl<S> ParamState<S> {
    /// Locks the parameter for writing and hands its value buffer, its gradient
    /// buffer and the auxiliary state to `rule`.
    pub fn update_with<F>(&mut self, rule: F) -> Result<()>
    where
        F: FnOnce(&mut [f64], &[f64], &mut S),
    {
        let mut guard = self.parameter.write()?;
        let ParameterData { value, grad, .. } = &mut *guard;
        rule(value.data_mut(), grad.data(), &mut self.state);
        Ok(())
    }
}

/// Appends one state record per parameter to `records`, built by `make_state`
/// from the parameter's element count.
///
/// Fails without binding anything if a parameter is already present in
/// `records`, appears twice in `parameters`, or already belongs to a function's
/// optimizer binding.
pub(crate) fn bind_parameters<S, F>(
    optimizer: &str,
    records: &mut Vec<ParamState<S>>,
    parameters: &[Parameter],
    make_state: F,
) -> Result<()>
where
    F: Fn(usize) -> S,
{
    for (idx, parameter) in parameters.iter().enumerate() {
        let duplicate = records.iter().any(|r| r.parameter.ptr_eq(parameter))
            || parameters[..idx].iter().any(|p| p.ptr_eq(parameter));
        if duplicate || parameter.read()?.binding.is_some() {
            return Err(GradStackError::OptimizerAlreadyBound {
                parameter: parameter.name()?,
            });
        }
    }

    records.reserve(parameters.len());
    for parameter in parameters {
        let numel = parameter.numel()?;
        records.push(ParamState {
            parameter: parameter.clone(),
            state: make_state(numel),
        });
    }
    debug!(
        "{}: bound {} parameters ({} total)",
        optimizer,
        parameters.len(),
        records.len()
    );
    Ok(())
}
