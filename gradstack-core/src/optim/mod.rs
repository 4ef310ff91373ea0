// gradstack-core/src/optim/mod.rs

//! Optimizers for training functions.
//!
//! This module provides the `Optimizer` trait, the per-parameter `ParamState`
//! record, and the update rules: SGD, AdaDelta, AdaGrad and RMSprop.
//! An optimizer is attached to a function with
//! [`Function::set_optimizer`](crate::nn::Function::set_optimizer).

pub mod optimizer_state;
pub mod optimizer_trait;

pub mod adadelta;
pub mod adagrad;
pub mod rmsprop;
pub mod sgd;

// Re-export key items for easier access
pub use optimizer_state::ParamState;
pub use optimizer_trait::Optimizer;

pub use adadelta::{AdaDeltaHyperParams, AdaDeltaOptimizer};
pub use adagrad::{AdaGradHyperParams, AdaGradOptimizer};
pub use rmsprop::{RmsPropHyperParams, RmsPropOptimizer};
pub use sgd::{SgdHyperParams, SgdOptimizer};
