//! Portable, exact attention implementations.

pub mod exact;

pub use exact::ExactAttention;
