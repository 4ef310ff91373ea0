//! Parameter-free elementwise transforms and the scalar helpers they share with
//! the recurrent layer.

pub mod relu;
pub mod sigmoid;
pub mod tanh;

pub use relu::Relu;
pub use sigmoid::Sigmoid;
pub use tanh::Tanh;

use crate::error::Result;
use crate::nn::function::ensure_batch_len;
use crate::tensor::Tensor;
use num_traits::Float;

/// Logistic function `1 / (1 + e^-x)`.
pub fn sigmoid<T: Float>(x: T) -> T {
    T::one() / (T::one() + (-x).exp())
}

/// Derivative of the sigmoid expressed through its output `y`.
pub fn grad_sigmoid<T: Float>(y: T) -> T {
    y * (T::one() - y)
}

/// Derivative of tanh expressed through its output `y`.
pub fn grad_tanh<T: Float>(y: T) -> T {
    T::one() - y * y
}

/// Applies `f` to every element of every tensor in the batch, keeping shapes.
pub(crate) fn map_batch(x: &[Tensor], f: impl Fn(f64) -> f64) -> Vec<Tensor> {
    x.iter()
        .map(|t| {
            let mut out = t.clone();
            out.data_mut().iter_mut().for_each(|v| *v = f(*v));
            out
        })
        .collect()
}

/// Computes `gx = gy * f'(y)` elementwise from the stored forward outputs `y`.
pub(crate) fn backward_from_outputs(
    y: &[Tensor],
    gy: &[Tensor],
    derivative: impl Fn(f64) -> f64,
    operation: &str,
) -> Result<Vec<Tensor>> {
    ensure_batch_len(y.len(), gy.len(), operation)?;
    let mut gx = Vec::with_capacity(gy.len());
    for (out, g) in y.iter().zip(gy) {
        g.ensure_numel(out.numel(), operation)?;
        let mut grad = g.clone();
        for (gv, yv) in grad.data_mut().iter_mut().zip(out.data()) {
            *gv *= derivative(*yv);
        }
        gx.push(grad);
    }
    Ok(gx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sigmoid_helpers() {
        assert_relative_eq!(sigmoid(0.0_f64), 0.5);
        assert_relative_eq!(sigmoid(0.0_f32), 0.5_f32);
        assert_relative_eq!(grad_sigmoid(0.5_f64), 0.25);
        assert!(sigmoid(-800.0_f64) >= 0.0);
        assert_relative_eq!(sigmoid(800.0_f64), 1.0);
    }

    #[test]
    fn test_grad_tanh_matches_finite_difference() {
        let x = 0.3_f64;
        let h = 1e-6;
        let numeric = ((x + h).tanh() - (x - h).tanh()) / (2.0 * h);
        assert_relative_eq!(grad_tanh(x.tanh()), numeric, epsilon = 1e-8);
    }
}
