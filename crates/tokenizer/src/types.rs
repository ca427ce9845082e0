use serde::{Deserialize, Serialize};

/// Reserved ids resolved against a loaded vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialTokens {
    pub cls: u32,
    pub sep: u32,
    pub pad: u32,
    pub unk: u32,
}

impl SpecialTokens {
    pub fn contains(&self, id: u32) -> bool {
        id == self.cls || id == self.sep || id == self.pad || id == self.unk
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeOptions {
    /// Wrap the sequence as `[CLS] ... [SEP]`.
    pub add_special_tokens: bool,
    /// Right-pad with the pad id up to `max_length`.
    pub pad_to_max_length: bool,
    pub max_length: Option<usize>,
    /// Cut sequences longer than `max_length`.
    pub truncation: bool,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            add_special_tokens: true,
            pad_to_max_length: false,
            max_length: None,
            truncation: false,
        }
    }
}

impl EncodeOptions {
    /// Raw content ids, as used for dialogue turns.
    pub fn plain() -> Self {
        Self {
            add_special_tokens: false,
            ..Self::default()
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self.truncation = true;
        self
    }

    pub fn padded(mut self) -> Self {
        self.pad_to_max_length = true;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecodeOptions {
    pub skip_special_tokens: bool,
    pub clean_up_tokenization_spaces: bool,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            skip_special_tokens: false,
            clean_up_tokenization_spaces: true,
        }
    }
}

impl DecodeOptions {
    pub fn skipping_special() -> Self {
        Self {
            skip_special_tokens: true,
            ..Self::default()
        }
    }
}
