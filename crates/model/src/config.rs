use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// How the decoder stack consumes its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoderMode {
    /// Decoder blocks run over the encoder output; `decoder_ids` are checked but unused.
    #[default]
    EncoderOutput,
    /// `decoder_ids` are embedded and cross-attend to the encoder output.
    CrossAttention,
}

/// High-level configuration for assembling the encoder-decoder transformer.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub vocab_size: usize,
    pub dim: usize,
    pub encoder_depth: usize,
    pub decoder_depth: usize,
    pub max_seq_len: usize,
    pub head_num: usize,
    pub ff_dim: usize,
    pub dropout: Option<f32>,
    pub layer_norm_eps: f64,
    pub decoder_mode: DecoderMode,
    /// Token id excluded from attention and from the loss.
    pub pad_id: u32,
    pub dtype: DType,
    pub device: Device,
}

impl ModelConfig {
    /// Reference dimensions: 1 encoder block, 13 decoder blocks, 2560 hidden, 32 heads, 128 tokens.
    pub fn reference(vocab_size: usize, device: Device) -> Self {
        let dim = 2560;
        Self {
            vocab_size,
            dim,
            encoder_depth: 1,
            decoder_depth: 13,
            max_seq_len: 128,
            head_num: 32,
            ff_dim: 4 * dim,
            dropout: Some(0.1),
            layer_norm_eps: 1e-5,
            decoder_mode: DecoderMode::EncoderOutput,
            pad_id: 0,
            dtype: DType::F32,
            device,
        }
    }

    pub fn head_dim(&self) -> usize {
        self.dim / self.head_num.max(1)
    }

    /// Validate structural invariants before any parameter is allocated.
    pub fn validate(&self) -> Result<(), ModelError> {
        let fail = |msg: String| -> Result<(), ModelError> { Err(ModelError::Config(msg)) };
        for (name, value) in [
            ("vocab_size", self.vocab_size),
            ("dim", self.dim),
            ("encoder_depth", self.encoder_depth),
            ("decoder_depth", self.decoder_depth),
            ("max_seq_len", self.max_seq_len),
            ("head_num", self.head_num),
            ("ff_dim", self.ff_dim),
        ] {
            if value == 0 {
                return fail(format!("{name} must be greater than zero"));
            }
        }
        if self.dim % self.head_num != 0 {
            return fail(format!(
                "dim ({}) must be divisible by head_num ({})",
                self.dim, self.head_num
            ));
        }
        if let Some(p) = self.dropout {
            if !(0.0..1.0).contains(&p) {
                return fail(format!("dropout must be in [0, 1), got {p}"));
            }
        }
        if self.layer_norm_eps <= 0.0 {
            return fail("layer_norm_eps must be positive".into());
        }
        if self.pad_id as usize >= self.vocab_size {
            return fail(format!(
                "pad_id {} is outside the vocabulary of {} tokens",
                self.pad_id, self.vocab_size
            ));
        }
        if !matches!(self.dtype, DType::F32 | DType::F16 | DType::BF16) {
            return fail(format!("unsupported parameter dtype {:?}", self.dtype));
        }
        Ok(())
    }
}
