//! Run-time knobs shared by attention implementations.

/// Configuration driving attention behaviour.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    /// Probability for dropout applied to attention weights during training.
    ///
    /// When `None`, dropout is disabled and the computation is deterministic.
    pub dropout_p: Option<f32>,
}

impl Config {
    /// Configuration for a forward pass: dropout only when `train` is set.
    pub fn for_mode(dropout_p: Option<f32>, train: bool) -> Self {
        Self {
            dropout_p: if train { dropout_p } else { None },
        }
    }
}
