pub mod block;
pub mod config;
pub mod error;
pub mod loss;
pub mod model;
pub mod weights;

pub use block::{AttentionBlock, BlockKind, Memory, MultiHeadAttention};
pub use config::{DecoderMode, ModelConfig};
pub use error::ModelError;
pub use loss::shifted_cross_entropy;
pub use model::{Model, ModelOutput};
pub use weights::sha256_file;
