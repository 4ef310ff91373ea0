use super::*;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use approx::assert_relative_eq;

fn mock_param(initial_value: f64, grad_value: f64) -> Parameter {
    let param = Parameter::new(Tensor::from_vec(vec![initial_value]), "mock_param_adagrad");
    param.write().unwrap().grad.data_mut()[0] = grad_value;
    param
}

#[test]
fn adagrad_optimizer_creation() {
    assert!(AdaGradOptimizer::new(AdaGradHyperParams::default()).is_ok());
    assert!(AdaGradOptimizer::new(AdaGradHyperParams { lr: -1.0, eps: 1e-8 }).is_err());
}

#[test]
fn test_adagrad_basic() {
    let (lr, eps) = (0.1, 1e-8);
    let param = mock_param(1.0, 0.5);
    let mut optimizer = AdaGradOptimizer::new(AdaGradHyperParams { lr, eps }).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();

    optimizer.update().unwrap();
    let expected1 = 1.0 - lr * 0.5 / (0.25f64.sqrt() + eps);
    assert_relative_eq!(param.value().unwrap().data()[0], expected1, epsilon = 1e-12);

    optimizer.update().unwrap();
    let expected2 = expected1 - lr * 0.5 / (0.5f64.sqrt() + eps);
    assert_relative_eq!(param.value().unwrap().data()[0], expected2, epsilon = 1e-12);
    assert_relative_eq!(
        optimizer.param_states()[0].state.sum_gradient_squares[0],
        0.5,
        epsilon = 1e-15
    );
}

#[test]
fn test_adagrad_zero_gradient_is_noop() {
    let param = mock_param(1.0, 0.0);
    let mut optimizer = AdaGradOptimizer::new(AdaGradHyperParams::default()).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    optimizer.update().unwrap();
    assert_eq!(param.value().unwrap().data(), &[1.0]);
}
