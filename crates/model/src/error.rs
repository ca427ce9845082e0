use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("invalid model configuration: {0}")]
    Config(String),
    #[error("invalid model input: {0}")]
    Input(String),
    #[error("failed to load weights from {path}: {reason}")]
    WeightLoad { path: PathBuf, reason: String },
    #[error("failed to save weights to {path}: {reason}")]
    WeightSave { path: PathBuf, reason: String },
    #[error("parameter store lock poisoned")]
    ParameterStore,
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ModelError {
    pub(crate) fn weight_load(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::WeightLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }
}
