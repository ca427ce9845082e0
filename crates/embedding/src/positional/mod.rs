//! Position embeddings addressed by sequence index.

pub mod learned;

pub use learned::{PositionEmbedding, PositionEmbeddingConfig};
