use std::sync::atomic::{AtomicBool, Ordering};

use attention::masks::{build_causal_mask, padding_mask_from_token_mask};
use candle_core::{DType, Tensor, Var};
use candle_nn::{VarBuilder, VarMap};
use embedding::{PositionEmbedding, PositionEmbeddingConfig, TokenEmbedding, TokenEmbeddingConfig};
use layers::{
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    norm::{LayerNorm, NormConfig, NormalizationLayer},
};

use crate::{
    block::{AttentionBlock, BlockKind, Memory},
    config::{DecoderMode, ModelConfig},
    error::ModelError,
    loss::shifted_cross_entropy,
};

/// Logits for every position plus the optional shifted cross-entropy.
#[derive(Debug, Clone)]
pub struct ModelOutput {
    /// `(batch, seq, vocab_size)`; `seq` is the source length in
    /// [`DecoderMode::EncoderOutput`] and the decoder length otherwise.
    pub logits: Tensor,
    pub loss: Option<Tensor>,
}

impl ModelOutput {
    pub fn loss_value(&self) -> Result<Option<f32>, ModelError> {
        match &self.loss {
            Some(loss) => Ok(Some(loss.to_dtype(DType::F32)?.to_scalar::<f32>()?)),
            None => Ok(None),
        }
    }

    /// `exp(loss)` when a loss was computed.
    pub fn perplexity(&self) -> Result<Option<f32>, ModelError> {
        Ok(self.loss_value()?.map(f32::exp))
    }
}

/// Encoder-decoder transformer assembled from the shared crates.
///
/// All parameters live in one [`VarMap`] under the names `token_emb.weight`,
/// `position_emb.weight`, `encoders.{i}.*`, `decoders.{i}.*`, `norm.*` and
/// `lm_head.weight`. Models start in evaluation mode.
pub struct Model {
    config: ModelConfig,
    varmap: VarMap,
    policy: PrecisionPolicy,
    token_emb: TokenEmbedding,
    position_emb: PositionEmbedding,
    encoders: Vec<AttentionBlock>,
    decoders: Vec<AttentionBlock>,
    norm: LayerNorm,
    lm_head: Linear,
    training: AtomicBool,
}

impl Model {
    /// Builds the model with freshly initialised parameters.
    pub fn new(config: ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, config.dtype, &config.device);
        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype);

        let token_emb = TokenEmbedding::load(
            TokenEmbeddingConfig {
                vocab_size: config.vocab_size,
                hidden_dim: config.dim,
            },
            vb.pp("token_emb"),
        )?;
        let position_emb = PositionEmbedding::load(
            PositionEmbeddingConfig {
                max_seq_len: config.max_seq_len,
                hidden_dim: config.dim,
            },
            vb.pp("position_emb"),
        )?;

        let encoders = (0..config.encoder_depth)
            .map(|i| AttentionBlock::load(BlockKind::Encoder, &config, vb.pp(format!("encoders.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let decoder_kind = BlockKind::Decoder {
            cross_attention: config.decoder_mode == DecoderMode::CrossAttention,
        };
        let decoders = (0..config.decoder_depth)
            .map(|i| AttentionBlock::load(decoder_kind, &config, vb.pp(format!("decoders.{i}"))))
            .collect::<candle_core::Result<Vec<_>>>()?;

        let norm = LayerNorm::load(
            NormConfig::new(config.dim).with_epsilon(config.layer_norm_eps),
            vb.pp("norm"),
        )?;
        let lm_head = Linear::load(
            LinearConfig::new(config.dim, config.vocab_size).without_bias(),
            &LinearInit::XavierUniform,
            vb.pp("lm_head"),
        )?;

        let model = Self {
            config,
            varmap,
            policy,
            token_emb,
            position_emb,
            encoders,
            decoders,
            norm,
            lm_head,
            training: AtomicBool::new(false),
        };
        log::info!(
            "model init vocab={} dim={} encoders={} decoders={} heads={} max_seq_len={} mode={:?} dtype={:?} params={}",
            model.config.vocab_size,
            model.config.dim,
            model.config.encoder_depth,
            model.config.decoder_depth,
            model.config.head_num,
            model.config.max_seq_len,
            model.config.decoder_mode,
            model.config.dtype,
            model.parameter_count()?,
        );
        Ok(model)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    /// Named parameters sorted by name.
    pub fn parameters(&self) -> Result<Vec<(String, Var)>, ModelError> {
        let data = self
            .varmap
            .data()
            .lock()
            .map_err(|_| ModelError::ParameterStore)?;
        let mut params: Vec<(String, Var)> = data
            .iter()
            .map(|(name, var)| (name.clone(), var.clone()))
            .collect();
        params.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(params)
    }

    pub fn parameter_count(&self) -> Result<usize, ModelError> {
        Ok(self
            .parameters()?
            .iter()
            .map(|(_, var)| var.elem_count())
            .sum())
    }

    /// Enables dropout (training) or disables it (evaluation).
    pub fn set_training(&self, training: bool) {
        self.training.store(training, Ordering::Relaxed);
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Relaxed)
    }

    fn check_ids(&self, label: &str, ids: &Tensor) -> Result<(usize, usize), ModelError> {
        let (batch, seq) = match ids.dims() {
            [batch, seq] if *batch > 0 && *seq > 0 => (*batch, *seq),
            dims => {
                return Err(ModelError::Input(format!(
                    "{label} must be a non-empty [batch, seq] tensor, got {dims:?}"
                )))
            }
        };
        if seq > self.config.max_seq_len {
            return Err(ModelError::Input(format!(
                "{label} length {seq} exceeds max_seq_len {}",
                self.config.max_seq_len
            )));
        }
        if !ids.dtype().is_int() {
            return Err(ModelError::Input(format!(
                "{label} must hold integer ids, got {:?}",
                ids.dtype()
            )));
        }
        Ok((batch, seq))
    }

    fn embed(&self, ids: &Tensor) -> Result<Tensor, ModelError> {
        let tokens = self.token_emb.forward(ids)?;
        Ok(self.position_emb.add_to(&tokens)?)
    }

    /// Runs the encoder stack; `source_mask` is nonzero at real tokens.
    pub fn encode(&self, source_ids: &Tensor, source_mask: &Tensor) -> Result<Tensor, ModelError> {
        let (batch, seq) = self.check_ids("source_ids", source_ids)?;
        if source_mask.dims() != [batch, seq] {
            return Err(ModelError::Input(format!(
                "source_mask must be [{batch}, {seq}], got {:?}",
                source_mask.dims()
            )));
        }
        let train = self.is_training();
        let mask = padding_mask_from_token_mask(source_mask, seq)?;
        let mut hidden = self.embed(source_ids)?;
        for encoder in &self.encoders {
            hidden = encoder.forward(&hidden, Some(&mask), None, train)?;
        }
        Ok(hidden)
    }

    /// Full forward pass producing logits and, when `labels` are given, the loss.
    pub fn forward(
        &self,
        source_ids: &Tensor,
        decoder_ids: &Tensor,
        source_mask: &Tensor,
        labels: Option<&Tensor>,
    ) -> Result<ModelOutput, ModelError> {
        let (batch, source_len) = self.check_ids("source_ids", source_ids)?;
        let (decoder_batch, decoder_len) = self.check_ids("decoder_ids", decoder_ids)?;
        if decoder_batch != batch {
            return Err(ModelError::Input(format!(
                "decoder_ids batch {decoder_batch} does not match source batch {batch}"
            )));
        }

        let memory = self.encode(source_ids, source_mask)?;
        let train = self.is_training();
        let device = &self.config.device;

        let hidden = match self.config.decoder_mode {
            DecoderMode::EncoderOutput => {
                let causal = build_causal_mask(device, source_len, source_len)?;
                let mut hidden = memory;
                for decoder in &self.decoders {
                    hidden = decoder.forward(&hidden, Some(&causal), None, train)?;
                }
                hidden
            }
            DecoderMode::CrossAttention => {
                let causal = build_causal_mask(device, decoder_len, decoder_len)?;
                let cross_mask = padding_mask_from_token_mask(source_mask, decoder_len)?;
                let mut hidden = self.embed(decoder_ids)?;
                for decoder in &self.decoders {
                    let memory = Memory {
                        states: &memory,
                        mask: Some(&cross_mask),
                    };
                    hidden = decoder.forward(&hidden, Some(&causal), Some(memory), train)?;
                }
                self.norm.forward(&hidden, &self.policy)?
            }
        };

        let logits = self.lm_head.forward(&hidden, &self.policy)?;
        let loss = match labels {
            Some(labels) => shifted_cross_entropy(&logits, labels, self.config.pad_id)?,
            None => None,
        };
        Ok(ModelOutput { logits, loss })
    }
}
