//! Core traits and types shared across attention implementations.

pub mod config;
pub mod errors;

use candle_core::Tensor;

pub use config::Config;
pub use errors::AttentionError;

/// Unified interface for attention kernels.
///
/// * `q` is `[batch, n_heads, q_len, head_dim]`; `k` and `v` are
///   `[batch, n_heads, k_len, head_dim]`.
/// * The returned tensor mirrors the layout and dtype of `q`.
/// * Masks, when present, must be shaped `[batch|1, n_heads|1, q_len, k_len]`.
/// * Dropout is controlled via [`Config::dropout_p`]; callers leave it unset
///   outside training.
pub trait Attention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError>;
}
