//! Inference engine for multi-turn chat.
//!
//! [`ContextWindow`] keeps the bounded, anchor-led encoder input.
//! [`TurnDecoder`] runs one turn of autoregressive decoding against any
//! [`LogitSource`] (the transformer [`model::Model`] in production, scripted
//! sources in tests). [`SamplingStrategy`] picks each token from an injected
//! random source. [`ChatSession`] strings turns together and [`ChatConfig`]
//! describes the whole setup.

pub mod config;
pub mod context;
pub mod error;
pub mod generation;
pub mod rank;
pub mod sampling;
pub mod session;

mod model_source;

pub use config::{ChatConfig, ConfigFormat, DecodingSection, ModelSection, PresentationSection, WeightsSection};
pub use context::{evict_and_append, ContextWindow};
pub use error::{ChatError, ConfigError, Result, SamplingError};
pub use generation::{
    transition, DecodeState, DecodingPolicy, GenerationState, LogitSource, Turn, TurnDecoder,
    TurnStatus,
};
pub use rank::best_candidate;
pub use sampling::{Sampled, Sampler, SamplingStrategy};
pub use session::{split_segments, ChatSession, Reply, SessionOptions};
