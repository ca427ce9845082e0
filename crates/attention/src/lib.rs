//! Exact scaled dot-product attention for the encoder and decoder stacks.
//!
//! The crate computes attention over tensors with layout
//! `[batch, n_heads, seq_len, head_dim]`. Queries may come from a different
//! sequence than keys and values (cross-attention), so `q_len` and `k_len`
//! are independent. Reductions run in `f32` and the output matches the dtype
//! of `q`.
//!
//! Masks are additive: [`masks::padding_mask_from_booleans`] hides padded
//! keys and [`masks::build_causal_mask`] hides future positions. Both can be
//! summed before being handed to [`Attention::attend`].

pub mod core;
pub mod masks;
pub mod reference;

pub use core::{Attention, AttentionError, Config};
pub use reference::ExactAttention;
