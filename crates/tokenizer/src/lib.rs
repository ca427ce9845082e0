//! Tokenizer capability for the chat engine.
//!
//! A [`WordPieceTokenizer`] is built either from a BERT `vocab.txt` (BERT
//! normaliser and pre-tokenizer, WordPiece decoder, `[CLS] $A [SEP]`
//! post-processing) or from a serialized `tokenizer.json`. In both cases the
//! reserved `[CLS]`, `[SEP]`, `[PAD]` and `[UNK]` tokens must resolve to
//! distinct ids. They are registered as special tokens, so writing one of
//! them inside input text yields that single id.
//!
//! The engine talks to the tokenizer only through [`TokenizerCapability`].

pub mod config;
pub mod errors;

mod artifacts;
mod capability;
mod postprocessor;
mod pretokenizer;
mod types;
mod validate;
mod wordpiece;

pub use capability::TokenizerCapability;
pub use config::{Config, SpecialTokenNames};
pub use errors::{Error, Result};
pub use pretokenizer::clean_up_tokenization;
pub use types::{DecodeOptions, EncodeOptions, SpecialTokens};
pub use wordpiece::WordPieceTokenizer;
