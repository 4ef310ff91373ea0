use crate::error::{GradStackError, Result};
use crate::tensor::Tensor;
use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Fills `tensor` in place with samples from `Normal(0, s)`, where
/// `s = (1 / sqrt(2)) * sqrt(2 / fan_in) * master_scale` and `fan_in` is the
/// product of every dimension but the first.
///
/// The caller supplies the random source, so seeding stays explicit.
///
/// # Errors
/// `ConfigurationError` if `fan_in` is zero or the scale is not a valid deviation.
pub fn normal_fan_in_<R>(tensor: &mut Tensor, rng: &mut R, master_scale: f64) -> Result<()>
where
    R: Rng + ?Sized,
{
    let fan_in: usize = tensor.shape().iter().skip(1).product();
    if fan_in == 0 {
        return Err(GradStackError::ConfigurationError(format!(
            "Cannot initialize a tensor of shape {:?}: fan-in is zero",
            tensor.shape()
        )));
    }
    let local_scale = 1.0 / 2f64.sqrt();
    let std_dev = local_scale * (2.0 / fan_in as f64).sqrt();
    let normal = Normal::new(0.0, std_dev).map_err(|e| {
        GradStackError::ConfigurationError(format!("Invalid normal distribution: {}", e))
    })?;

    for x in tensor.data_mut() {
        *x = normal.sample(rng) * master_scale;
    }
    Ok(())
}

/// Copies a caller-supplied initial buffer into `tensor`.
///
/// # Errors
/// `ShapeMismatch` unless `initial` has exactly as many elements as `tensor`.
pub fn copy_initial_(tensor: &mut Tensor, initial: &[f64], operation: &str) -> Result<()> {
    if initial.len() != tensor.numel() {
        return Err(GradStackError::ShapeMismatch {
            expected: tensor.shape().to_vec(),
            actual: vec![initial.len()],
            operation: operation.to_string(),
        });
    }
    tensor.data_mut().copy_from_slice(initial);
    Ok(())
}

/// Fills `tensor` from `initial` when given, otherwise with [`normal_fan_in_`].
pub(crate) fn init_or_copy_<R>(
    tensor: &mut Tensor,
    initial: Option<&[f64]>,
    rng: &mut R,
    operation: &str,
) -> Result<()>
where
    R: Rng + ?Sized,
{
    match initial {
        Some(data) => copy_initial_(tensor, data, operation),
        None => normal_fan_in_(tensor, rng, 1.0),
    }
}

#[cfg(test)]
#[path = "init_test.rs"]
mod tests;
