//! Activation functions for the feed-forward sublayer.
//!
//! Activations run in the compute dtype of the [`PrecisionPolicy`] and cast
//! the result back to storage.
//!
//! * **GELU** uses the erf form `0.5 * x * (1 + erf(x / sqrt(2)))`, matching
//!   `torch.nn.GELU()` without approximation.
//! * **ReLU** zeroes negative values.

use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

use crate::dtypes::PrecisionPolicy;

/// Non-linearity applied between the two feed-forward projections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationKind {
    #[default]
    Gelu,
    Relu,
}

impl ActivationKind {
    /// Applies the activation to `input` using the precision rules in `policy`.
    pub fn forward(self, input: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        let compute = policy.cast_for_matmul(input)?;
        let activated = match self {
            ActivationKind::Gelu => compute.gelu_erf()?,
            ActivationKind::Relu => compute.relu()?,
        };
        policy.cast_to_storage(&activated)
    }
}
