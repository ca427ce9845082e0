//! Meena-style conversational transformer on Candle.
//!
//! The workspace crates are re-exported as modules. [`Engine`] wires a
//! validated [`ChatConfig`] into a tokenizer and a model, and hands out
//! [`ChatSession`]s over them.

pub use attention;
pub use chat;
pub use embedding;
pub use layers;
pub use model;
pub use tokenizer;

pub use chat::{ChatConfig, ChatSession, Reply, SamplingStrategy, SessionOptions, TurnStatus};
pub use model::{DecoderMode, Model, ModelConfig};
pub use tokenizer::{TokenizerCapability, WordPieceTokenizer};

use anyhow::{Context, Result};
use candle_core::Device;
use chat::Sampler;

/// Picks the compute device once per process: CUDA when available, CPU otherwise.
/// `CANDLE_FORCE_CPU` forces the CPU backend.
pub fn setup_device() -> Result<Device> {
    if std::env::var("CANDLE_FORCE_CPU").is_ok() {
        log::info!("CANDLE_FORCE_CPU set, using CPU backend");
        return Ok(Device::Cpu);
    }

    match Device::cuda_if_available(0) {
        Ok(device) if device.is_cuda() => {
            log::info!("CUDA device selected: {device:?}");
            Ok(device)
        }
        Ok(_) | Err(_) => {
            log::info!("using CPU backend");
            Ok(Device::Cpu)
        }
    }
}

/// Tokenizer and model loaded from one configuration.
pub struct Engine {
    config: ChatConfig,
    tokenizer: WordPieceTokenizer,
    model: Model,
}

impl Engine {
    /// Fails before any generation when a file is missing, the tokenizer is
    /// malformed, or the weights do not match the configured model.
    pub fn load(config: ChatConfig, device: Device) -> Result<Self> {
        config.validate()?;
        config.ensure_files()?;

        let tokenizer = WordPieceTokenizer::from_config(&config.tokenizer)
            .context("failed to build tokenizer")?;
        let special = tokenizer.special();
        let model_config = config.resolve_model_config(tokenizer.vocab_size(), special.pad, device)?;

        let model = match &config.weights.path {
            Some(path) => Model::load_weights(model_config, path, config.weights.sha256.as_deref())
                .with_context(|| format!("failed to load weights from {}", path.display()))?,
            None => {
                log::warn!("no weights configured; the model keeps its random initialisation");
                Model::new(model_config)?
            }
        };
        Ok(Self {
            config,
            tokenizer,
            model,
        })
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn tokenizer(&self) -> &WordPieceTokenizer {
        &self.tokenizer
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    /// A fresh conversation seeded from `decoding.seed`.
    pub fn session(&self) -> Result<ChatSession<'_, Model, WordPieceTokenizer>> {
        let decoding = &self.config.decoding;
        let sampler = Sampler::new(decoding.strategy, decoding.seed)?;
        let session = ChatSession::new(
            &self.model,
            &self.tokenizer,
            sampler,
            SessionOptions::from(decoding),
            self.config.model.max_seq_len,
        )?;
        Ok(session)
    }
}
