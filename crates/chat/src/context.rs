//! Bounded encoder input carried across turns.

use tokenizer::{DecodeOptions, SpecialTokens, TokenizerCapability};

use crate::error::ConfigError;

/// Folds a finished utterance into the conversation history.
///
/// Padding is stripped from both inputs, the utterance is terminated with
/// `SEP` unless it already is, and its leading anchor is dropped before
/// concatenation. Only the newest `capacity` tokens survive; `CLS` is put
/// back in front when truncation removed it.
pub fn evict_and_append(
    context: &[u32],
    utterance: &[u32],
    special: &SpecialTokens,
    capacity: usize,
) -> Vec<u32> {
    let mut turn: Vec<u32> = utterance
        .iter()
        .copied()
        .filter(|&id| id != special.pad)
        .collect();
    if turn.last() != Some(&special.sep) {
        turn.push(special.sep);
    }

    let mut combined: Vec<u32> = context
        .iter()
        .copied()
        .filter(|&id| id != special.pad)
        .collect();
    combined.extend_from_slice(&turn[1..]);

    let start = combined.len().saturating_sub(capacity);
    let window = &combined[start..];
    if window.first() == Some(&special.cls) {
        window.to_vec()
    } else {
        let mut anchored = Vec::with_capacity(window.len() + 1);
        anchored.push(special.cls);
        anchored.extend_from_slice(window);
        anchored
    }
}

/// Owns the conversation context; mutated only at turn boundaries.
#[derive(Debug, Clone)]
pub struct ContextWindow {
    tokens: Vec<u32>,
    special: SpecialTokens,
    max_seq_len: usize,
}

impl ContextWindow {
    pub fn new(special: SpecialTokens, max_seq_len: usize) -> Result<Self, ConfigError> {
        if max_seq_len < 2 {
            return Err(ConfigError::Validation(vec![format!(
                "max_seq_len must be at least 2 to hold the anchor and one token, got {max_seq_len}"
            )]));
        }
        Ok(Self {
            tokens: vec![special.cls],
            special,
            max_seq_len,
        })
    }

    /// Content tokens kept after eviction, excluding the reserved anchor slot.
    pub fn capacity(&self) -> usize {
        self.max_seq_len - 1
    }

    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_anchor_only(&self) -> bool {
        self.tokens == [self.special.cls]
    }

    /// Applies [`evict_and_append`] for one finished turn.
    pub fn fold(&mut self, utterance: &[u32]) {
        let before = self.tokens.len();
        self.tokens = evict_and_append(&self.tokens, utterance, &self.special, self.capacity());
        log::debug!(
            "context folded: {before} -> {} tokens (utterance {})",
            self.tokens.len(),
            utterance.len()
        );
    }

    pub fn reset(&mut self) {
        self.tokens.clear();
        self.tokens.push(self.special.cls);
    }

    /// Context right-padded with `PAD` to `max_seq_len`.
    pub fn encoder_input(&self) -> Vec<u32> {
        pad_to(&self.tokens, self.max_seq_len, self.special.pad)
    }

    /// Detokenized history, special tokens included.
    pub fn text<T: TokenizerCapability + ?Sized>(&self, tokenizer: &T) -> tokenizer::Result<String> {
        tokenizer.decode(&self.tokens, &DecodeOptions::default())
    }
}

pub(crate) fn pad_to(tokens: &[u32], len: usize, pad: u32) -> Vec<u32> {
    let mut padded = Vec::with_capacity(len.max(tokens.len()));
    padded.extend_from_slice(tokens);
    if padded.len() < len {
        padded.resize(len, pad);
    }
    padded
}
