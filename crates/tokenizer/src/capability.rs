use crate::errors::Result;
use crate::types::{DecodeOptions, EncodeOptions, SpecialTokens};

/// What the decoding engine needs from a tokenizer.
pub trait TokenizerCapability {
    fn encode(&self, text: &str, options: &EncodeOptions) -> Result<Vec<u32>>;

    fn decode(&self, ids: &[u32], options: &DecodeOptions) -> Result<String>;

    fn vocab_size(&self) -> usize;

    fn special(&self) -> SpecialTokens;

    /// Surface form of a single id, if it is in the vocabulary.
    fn id_to_token(&self, id: u32) -> Option<String>;
}
