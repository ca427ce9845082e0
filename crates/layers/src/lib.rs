//! Building blocks for transformer layers.
//!
//! Every layer here consumes hidden states shaped `(batch, seq, hidden)` and
//! obtains its parameters through a `candle_nn::VarBuilder`, so the owning
//! model keeps a single named parameter store.

pub mod activations;
pub mod checks;
pub mod dtypes;
pub mod linear;
pub mod mlp;
pub mod norm;
pub mod residual;

pub use activations::ActivationKind;
pub use dtypes::{Precision, PrecisionPolicy};
pub use linear::{Linear, LinearConfig, LinearInit, LinearLayer};
pub use mlp::{FeedForward, FeedForwardConfig, FeedForwardLayer};
pub use norm::{LayerNorm, NormConfig, NormalizationLayer};
pub use residual::{Dropout, ResidualNorm};
