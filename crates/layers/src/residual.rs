//! Residual connections with post-block normalisation and dropout.
//!
//! A sublayer output `branch` is merged with its input as
//! `norm(residual + dropout(branch))`. Dropout is active only when the caller
//! passes `train = true`; evaluation is deterministic.

use candle_core::{Error, Result, Tensor};
use candle_nn::VarBuilder;

use crate::{
    checks,
    dtypes::PrecisionPolicy,
    norm::{LayerNorm, NormConfig, NormalizationLayer},
};

/// Inverted dropout; disabled for `None`, zero or out-of-range probabilities.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Dropout {
    probability: Option<f32>,
}

impl Dropout {
    pub fn new(probability: Option<f32>) -> Self {
        let probability = probability.filter(|p| *p > 0.0 && *p < 1.0);
        Self { probability }
    }

    pub fn probability(&self) -> Option<f32> {
        self.probability
    }

    pub fn forward(&self, tensor: &Tensor, train: bool) -> Result<Tensor> {
        match self.probability {
            Some(p) if train => candle_nn::ops::dropout(tensor, p),
            _ => Ok(tensor.clone()),
        }
    }
}

/// Post-norm residual merge: `norm(residual + dropout(branch))`.
#[derive(Debug, Clone)]
pub struct ResidualNorm {
    norm: LayerNorm,
    dropout: Dropout,
}

impl ResidualNorm {
    pub fn new(norm: LayerNorm, dropout: Dropout) -> Self {
        Self { norm, dropout }
    }

    /// Creates the normalisation parameters under `vb`.
    pub fn load(config: NormConfig, dropout: Dropout, vb: VarBuilder) -> Result<Self> {
        Ok(Self::new(LayerNorm::load(config, vb)?, dropout))
    }

    pub fn forward(
        &self,
        residual: &Tensor,
        branch: &Tensor,
        policy: &PrecisionPolicy,
        train: bool,
    ) -> Result<Tensor> {
        let hidden = self.norm.config().hidden_size;
        checks::expect_batch_seq_hidden("residual.input", residual, hidden)?;
        if branch.dims() != residual.dims() {
            return Err(Error::Msg(format!(
                "residual.branch: expected shape {:?}, got {:?}",
                residual.dims(),
                branch.dims()
            )));
        }

        let branch = self.dropout.forward(&policy.cast_for_matmul(branch)?, train)?;
        let summed = policy.cast_for_matmul(residual)?.add(&branch)?;
        self.norm.forward(&summed, policy)
    }
}
