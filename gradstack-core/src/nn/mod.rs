//! Differentiable functions, their parameters and the layers built on them.

pub mod activations;
pub mod function;
pub mod history;
pub mod init;
pub mod layers;
pub mod parameter;

pub use activations::{Relu, Sigmoid, Tanh};
pub use function::{Function, FunctionBase};
pub use history::BatchHistory;
pub use layers::{EmbedId, EmbedIdConfig, Linear, LinearConfig, Lstm, LstmConfig};
pub use parameter::{Parameter, ParameterData};
