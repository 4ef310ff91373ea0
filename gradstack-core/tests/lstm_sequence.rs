mod common;

use common::{init_logger, squared_error};
use gradstack_core::nn::{Function, Linear, LinearConfig, Lstm, LstmConfig};
use gradstack_core::optim::{AdaDeltaHyperParams, AdaDeltaOptimizer, Optimizer};
use gradstack_core::{GradStackError, Result, Tensor};
use rand::rngs::StdRng;
use rand::SeedableRng;

const SEQUENCE: [f64; 6] = [0.0, 0.5, 1.0, 0.5, 0.0, -0.5];

struct Recurrent {
    lstm: Lstm,
    readout: Linear,
}

impl Recurrent {
    fn new(seed: u64) -> Result<Self> {
        let mut rng = StdRng::seed_from_u64(seed);
        Ok(Recurrent {
            lstm: Lstm::new(1, 5, LstmConfig::default(), &mut rng)?,
            readout: Linear::new(
                5,
                1,
                LinearConfig {
                    name: "readout".to_string(),
                    ..LinearConfig::default()
                },
                &mut rng,
            )?,
        })
    }

    fn bind(&mut self) -> Result<()> {
        let a: Box<dyn Optimizer> = Box::new(AdaDeltaOptimizer::new(AdaDeltaHyperParams::default())?);
        let b: Box<dyn Optimizer> = Box::new(AdaDeltaOptimizer::new(AdaDeltaHyperParams::default())?);
        self.lstm.set_optimizer(vec![a])?;
        self.readout.set_optimizer(vec![b])
    }

    /// Predicts each next element of the sequence; returns the summed loss.
    fn train_sequence(&mut self) -> Result<f64> {
        self.lstm.clear_grads()?;
        self.readout.clear_grads()?;

        let mut grads = Vec::new();
        let mut total = 0.0;
        for pair in SEQUENCE.windows(2) {
            let h = self.lstm.forward_one(&Tensor::from_vec(vec![pair[0]]))?;
            let y = self.readout.forward_one(&h)?;
            let (loss, gy) = squared_error(&[y], &[Tensor::from_vec(vec![pair[1]])]);
            total += loss;
            grads.extend(gy);
        }
        for gy in grads.iter().rev() {
            let gh = self.readout.backward_one(gy)?;
            self.lstm.backward_one(&gh)?;
        }

        self.lstm.reduce()?;
        self.readout.reduce()?;
        self.lstm.update()?;
        self.readout.update()?;
        Ok(total)
    }

    fn sequence_loss(&mut self) -> Result<f64> {
        self.lstm.reset_state();
        let mut total = 0.0;
        for pair in SEQUENCE.windows(2) {
            let h = self.lstm.predict_one(&Tensor::from_vec(vec![pair[0]]))?;
            let y = self.readout.predict_one(&h)?;
            total += squared_error(&[y], &[Tensor::from_vec(vec![pair[1]])]).0;
        }
        self.lstm.reset_state();
        Ok(total)
    }
}

#[test]
fn test_lstm_sequence_training_reduces_loss() -> Result<()> {
    init_logger();
    let mut net = Recurrent::new(2024)?;
    net.bind()?;

    let initial = net.sequence_loss()?;
    for _ in 0..300 {
        net.train_sequence()?;
        assert_eq!(net.lstm.history_depth(), 0);
    }
    let trained = net.sequence_loss()?;
    assert!(
        trained < initial,
        "loss did not decrease: {} -> {}",
        initial,
        trained
    );
    Ok(())
}

#[test]
fn test_lstm_training_is_deterministic() -> Result<()> {
    let run = || -> Result<Vec<Tensor>> {
        let mut net = Recurrent::new(5)?;
        net.bind()?;
        for _ in 0..5 {
            net.train_sequence()?;
        }
        net.lstm
            .parameters()
            .iter()
            .chain(net.readout.parameters())
            .map(|p| p.value())
            .collect()
    };
    assert_eq!(run()?, run()?);
    Ok(())
}

#[test]
fn test_lstm_optimizer_binds_every_parameter_once() -> Result<()> {
    let mut net = Recurrent::new(0)?;
    net.bind()?;
    assert_eq!(net.lstm.base().optimizers()[0].num_parameters(), 12);

    let again: Box<dyn Optimizer> = Box::new(AdaDeltaOptimizer::new(AdaDeltaHyperParams::default())?);
    assert_eq!(
        net.lstm.set_optimizer(vec![again]),
        Err(GradStackError::OptimizerAlreadyBound {
            parameter: "LSTM.upward0.weight".to_string()
        })
    );
    Ok(())
}

#[test]
fn test_lstm_extra_backward_fails_after_sequence() -> Result<()> {
    let mut net = Recurrent::new(9)?;
    net.bind()?;
    net.train_sequence()?;
    let err = net.lstm.backward_one(&Tensor::from_vec(vec![0.0; 5])).unwrap_err();
    assert_eq!(
        err,
        GradStackError::MissingForwardState {
            function: "LSTM".to_string()
        }
    );
    Ok(())
}
