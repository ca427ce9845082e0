//! Embedding crate
//!
//! Token lookups and the learned position table that is added to them before
//! the encoder stack.

pub mod positional;
pub mod token;

pub use positional::{PositionEmbedding, PositionEmbeddingConfig};
pub use token::{TokenEmbedding, TokenEmbeddingConfig};
