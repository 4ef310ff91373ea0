use super::*;
use crate::nn::parameter::Parameter;
use crate::tensor::Tensor;
use approx::assert_relative_eq;

fn mock_param(value: f64, grad: f64, name: &str) -> Parameter {
    let param = Parameter::new(Tensor::from_vec(vec![value]), name);
    param.write().unwrap().grad.data_mut()[0] = grad;
    param
}

#[test]
fn adadelta_optimizer_creation() {
    assert!(AdaDeltaOptimizer::new(AdaDeltaHyperParams::default()).is_ok());
    assert!(AdaDeltaOptimizer::new(AdaDeltaHyperParams { rho: 1.5, eps: 1e-6 }).is_err());
    assert!(AdaDeltaOptimizer::new(AdaDeltaHyperParams { rho: 0.95, eps: 0.0 }).is_err());
}

#[test]
fn test_adadelta_single_step_matches_closed_form() {
    let param = mock_param(1.0, 0.5, "w");
    let mut optimizer = AdaDeltaOptimizer::new(AdaDeltaHyperParams {
        rho: 0.95,
        eps: 1e-6,
    })
    .unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    optimizer.update().unwrap();

    let expected = 1.0 - ((0.0_f64 + 1e-6) / ((1.0 - 0.95) * 0.5 * 0.5 + 1e-6)).sqrt() * 0.5;
    assert_eq!(param.value().unwrap().data()[0], expected);
}

#[test]
fn test_adadelta_second_step_uses_running_averages() {
    let (rho, eps) = (0.95, 1e-6);
    let param = mock_param(1.0, 0.5, "w");
    let mut optimizer = AdaDeltaOptimizer::new(AdaDeltaHyperParams { rho, eps }).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    optimizer.update().unwrap();
    optimizer.update().unwrap();

    let g = 0.5;
    let msg1 = (1.0 - rho) * g * g;
    let dx1 = (eps / (msg1 + eps)).sqrt() * g;
    let msdx1 = (1.0 - rho) * dx1 * dx1;
    let msg2 = rho * msg1 + (1.0 - rho) * g * g;
    let dx2 = ((msdx1 + eps) / (msg2 + eps)).sqrt() * g;
    assert_relative_eq!(param.value().unwrap().data()[0], 1.0 - dx1 - dx2, epsilon = 1e-15);

    let state = &optimizer.param_states()[0].state;
    assert_relative_eq!(state.msg[0], msg2, epsilon = 1e-15);
}

#[test]
fn test_adadelta_zero_gradient_is_stable() {
    let param = mock_param(2.0, 0.5, "w");
    let mut optimizer = AdaDeltaOptimizer::new(AdaDeltaHyperParams::default()).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    optimizer.update().unwrap();
    let after_first = param.value().unwrap().data()[0];
    let msg_after_first = optimizer.param_states()[0].state.msg[0];

    param.clear_grad().unwrap();
    for _ in 0..10 {
        optimizer.update().unwrap();
    }
    assert_eq!(param.value().unwrap().data()[0], after_first);
    let msg = optimizer.param_states()[0].state.msg[0];
    assert!(msg < msg_after_first);
    assert!(msg > 0.0);
}

#[test]
fn test_adadelta_does_not_touch_gradients() {
    let param = mock_param(1.0, 0.25, "w");
    let mut optimizer = AdaDeltaOptimizer::new(AdaDeltaHyperParams::default()).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    optimizer.update().unwrap();
    assert_eq!(param.grad().unwrap().data(), &[0.25]);
}

#[test]
fn test_adadelta_rejects_duplicate_binding() {
    let param = mock_param(1.0, 0.5, "dup");
    let mut optimizer = AdaDeltaOptimizer::new(AdaDeltaHyperParams::default()).unwrap();
    optimizer.add_function_parameters(&[param.clone()]).unwrap();
    let err = optimizer.add_function_parameters(&[param]).unwrap_err();
    assert_eq!(
        err,
        GradStackError::OptimizerAlreadyBound {
            parameter: "dup".to_string()
        }
    );
    assert_eq!(optimizer.num_parameters(), 1);
}
