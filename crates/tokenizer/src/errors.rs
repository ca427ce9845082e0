use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Failures while building or running the WordPiece tokenizer.
#[derive(Error, Debug)]
pub enum Error {
    #[error("tokenizer i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("tokenizer backend: {0}")]
    Tokenizer(#[from] tokenizers::Error),

    #[error("invalid tokenizer configuration: {0}")]
    InvalidConfig(&'static str),

    /// A reserved token (`[CLS]`, `[SEP]`, `[PAD]` or `[UNK]`) has no id.
    #[error("reserved token {0} is missing from the vocabulary")]
    MissingSpecialToken(String),

    #[error("tokenizer validation failed: {0}")]
    Validation(String),

    #[error("{reason} {}", .path.display())]
    Artifact { reason: &'static str, path: PathBuf },
}

impl Error {
    pub(crate) fn artifact(reason: &'static str, path: &Path) -> Self {
        Error::Artifact {
            reason,
            path: path.to_path_buf(),
        }
    }
}
