use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Where the vocabulary comes from and how text is normalised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// BERT-style `vocab.txt`, one token per line.
    #[serde(default)]
    pub vocab: Option<PathBuf>,
    /// Serialized `tokenizer.json`; takes precedence over `vocab`.
    #[serde(default)]
    pub tokenizer_json: Option<PathBuf>,
    #[serde(default)]
    pub lowercase: bool,
    #[serde(default)]
    pub special_tokens: SpecialTokenNames,
}

/// Surface forms of the four reserved tokens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpecialTokenNames {
    pub cls: String,
    pub sep: String,
    pub pad: String,
    pub unk: String,
}

impl Default for SpecialTokenNames {
    fn default() -> Self {
        Self {
            cls: "[CLS]".to_owned(),
            sep: "[SEP]".to_owned(),
            pad: "[PAD]".to_owned(),
            unk: "[UNK]".to_owned(),
        }
    }
}

impl SpecialTokenNames {
    pub fn all(&self) -> [&str; 4] {
        [&self.cls, &self.sep, &self.pad, &self.unk]
    }
}

impl Config {
    pub fn from_vocab(path: impl Into<PathBuf>) -> Self {
        Self {
            vocab: Some(path.into()),
            tokenizer_json: None,
            lowercase: false,
            special_tokens: SpecialTokenNames::default(),
        }
    }

    pub fn expects_single_file(&self) -> bool {
        self.tokenizer_json.is_some()
    }

    pub fn expects_vocab_file(&self) -> bool {
        self.tokenizer_json.is_none() && self.vocab.is_some()
    }
}
