//! Error types emitted by attention implementations.

use thiserror::Error;

/// Attention-specific error category.
#[derive(Debug, Error)]
pub enum AttentionError {
    /// The supplied tensor shapes do not align with the documented contract.
    #[error("invalid tensor shape: {context}")]
    InvalidShape { context: String },
    /// The kernel does not support the requested data type.
    #[error("unsupported dtype {requested}")]
    UnsupportedDType { requested: String },
    /// A backend failure propagated from candle.
    #[error(transparent)]
    Backend(#[from] candle_core::Error),
}

impl From<AttentionError> for candle_core::Error {
    fn from(err: AttentionError) -> Self {
        match err {
            AttentionError::Backend(inner) => inner,
            other => candle_core::Error::Msg(other.to_string()),
        }
    }
}
