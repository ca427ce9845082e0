//! Layer normalisation with unified shape and dtype handling.
//!
//! Inputs follow the `(batch, seq, hidden)` convention. Normalisation happens
//! along the last axis while preserving the original layout. Mean and variance
//! are computed in [`PrecisionPolicy::reduction`] before casting back.

use candle_core::{Result, Tensor, D};
use candle_nn::{Init, VarBuilder};

use crate::{checks, dtypes::PrecisionPolicy};

/// Configuration for a LayerNorm over the hidden dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct NormConfig {
    /// Size of the hidden dimension being normalised.
    pub hidden_size: usize,
    /// Numeric stabiliser added to the variance.
    pub epsilon: f64,
}

impl NormConfig {
    /// Creates a configuration with the PyTorch default epsilon.
    pub fn new(hidden_size: usize) -> Self {
        Self {
            hidden_size,
            epsilon: 1e-5,
        }
    }

    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Shared interface for normalisation layers used inside attention blocks.
pub trait NormalizationLayer: Send + Sync {
    /// Returns the configuration so callers can check shape compatibility.
    fn config(&self) -> &NormConfig;

    /// Applies the normalisation to a hidden state tensor.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Standard LayerNorm with learnable scale and bias.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    config: NormConfig,
    weight: Tensor,
    bias: Tensor,
}

impl LayerNorm {
    /// Constructs a LayerNorm from existing scale and bias parameters.
    pub fn new(weight: Tensor, bias: Tensor, config: NormConfig) -> Result<Self> {
        for (label, tensor) in [("norm.weight", &weight), ("norm.bias", &bias)] {
            checks::expect_shape(label, tensor, &[config.hidden_size])?;
            checks::expect_dtype_in(label, tensor, checks::FLOAT_DTYPES)?;
        }
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Fetches `weight` (ones) and `bias` (zeros) under `vb`.
    pub fn load(config: NormConfig, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(config.hidden_size, "weight", Init::Const(1.0))?;
        let bias = vb.get_with_hints(config.hidden_size, "bias", Init::Const(0.0))?;
        Self::new(weight, bias, config)
    }
}

impl NormalizationLayer for LayerNorm {
    fn config(&self) -> &NormConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("norm.input", hidden, self.config.hidden_size)?;

        let hidden_size = self.config.hidden_size as f64;
        let compute = policy.cast_for_reduction(hidden)?;
        let mean = (compute.sum_keepdim(D::Minus1)? / hidden_size)?;
        let centered = compute.broadcast_sub(&mean)?;
        let variance = (centered.sqr()?.sum_keepdim(D::Minus1)? / hidden_size)?;
        let denom = (variance + self.config.epsilon)?.sqrt()?;
        let normalized = policy.cast_for_matmul(&centered.broadcast_div(&denom)?)?;

        let weight = self.weight.to_dtype(normalized.dtype())?;
        let bias = self.bias.to_dtype(normalized.dtype())?;
        let output = normalized.broadcast_mul(&weight)?.broadcast_add(&bias)?;

        policy.cast_to_storage(&output)
    }
}
