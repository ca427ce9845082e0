use std::path::PathBuf;

use thiserror::Error;

/// Failures while choosing a token from a logit vector.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SamplingError {
    #[error("logit vector is empty")]
    EmptyLogits,
    #[error("invalid sampling parameter: {0}")]
    InvalidParameter(String),
    #[error("no token other than padding can be sampled")]
    NoCandidates,
}

/// Configuration problems, all fatal before any generation begins.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid TOML configuration: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported configuration format: {0}")]
    Format(String),
    #[error("invalid override '{0}': {1}")]
    Override(String, String),
    #[error("configuration validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
    #[error("missing required files: {}", join_paths(.0))]
    MissingFiles(Vec<PathBuf>),
}

fn join_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|path| path.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error(transparent)]
    Model(#[from] model::ModelError),
    #[error(transparent)]
    Tokenizer(#[from] tokenizer::Error),
    #[error(transparent)]
    Sampling(#[from] SamplingError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Candle(#[from] candle_core::Error),
    #[error("logit vector has {actual} entries, expected {expected}")]
    LogitWidth { expected: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, ChatError>;
