//! Position-wise feed-forward blocks built on top of projections and activations.
//!
//! MLPs operate on hidden states shaped `(batch, seq, hidden)` and return the
//! same layout: expand to `intermediate_size`, activate, drop out (training
//! only), and contract back to `hidden_size`.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;

use crate::{
    activations::ActivationKind,
    checks,
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    residual::Dropout,
};

/// Configuration shared by transformer feed-forward networks.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedForwardConfig {
    /// Model hidden size.
    pub hidden_size: usize,
    /// Width of the activation space.
    pub intermediate_size: usize,
    /// Activation applied between projections.
    pub activation: ActivationKind,
    /// Dropout applied to the activated hidden layer during training.
    pub dropout_p: Option<f32>,
}

impl FeedForwardConfig {
    /// Creates a standard two-projection MLP configuration.
    pub fn new(hidden_size: usize, intermediate_size: usize, activation: ActivationKind) -> Self {
        Self {
            hidden_size,
            intermediate_size,
            activation,
            dropout_p: None,
        }
    }
}

/// Shared interface for feed-forward stacks.
pub trait FeedForwardLayer: Send + Sync {
    /// Configuration metadata used during block assembly.
    fn config(&self) -> &FeedForwardConfig;

    /// Performs the forward pass through the MLP.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy, train: bool) -> Result<Tensor>;
}

/// Two-layer MLP (`w_1` then `w_2`).
#[derive(Debug, Clone)]
pub struct FeedForward {
    config: FeedForwardConfig,
    w_1: Linear,
    w_2: Linear,
    dropout: Dropout,
}

impl FeedForward {
    pub fn load(config: FeedForwardConfig, init: &LinearInit, vb: VarBuilder) -> Result<Self> {
        let w_1 = Linear::load(
            LinearConfig::new(config.hidden_size, config.intermediate_size),
            init,
            vb.pp("w_1"),
        )?;
        let w_2 = Linear::load(
            LinearConfig::new(config.intermediate_size, config.hidden_size),
            init,
            vb.pp("w_2"),
        )?;
        let dropout = Dropout::new(config.dropout_p);
        Ok(Self {
            config,
            w_1,
            w_2,
            dropout,
        })
    }
}

impl FeedForwardLayer for FeedForward {
    fn config(&self) -> &FeedForwardConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy, train: bool) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("ffn.input", hidden, self.config.hidden_size)?;
        let expanded = self.w_1.forward(hidden, policy)?;
        let activated = self.config.activation.forward(&expanded, policy)?;
        let activated = self.dropout.forward(&activated, train)?;
        self.w_2.forward(&activated, policy)
    }
}
