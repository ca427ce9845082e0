use std::fmt;

use attention::{Attention, Config as AttentionConfig, ExactAttention};
use candle_core::{bail, Result, Tensor};
use candle_nn::VarBuilder;
use layers::{
    activations::ActivationKind,
    checks,
    dtypes::PrecisionPolicy,
    linear::{Linear, LinearConfig, LinearInit, LinearLayer},
    mlp::{FeedForward, FeedForwardConfig, FeedForwardLayer},
    norm::NormConfig,
    residual::{Dropout, ResidualNorm},
};

use crate::config::ModelConfig;

/// Multi-head attention with separate query and key/value inputs.
pub struct MultiHeadAttention {
    hidden_dim: usize,
    heads: usize,
    head_dim: usize,
    dropout_p: Option<f32>,
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    out_proj: Linear,
    attention: ExactAttention,
}

impl fmt::Debug for MultiHeadAttention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultiHeadAttention")
            .field("hidden_dim", &self.hidden_dim)
            .field("heads", &self.heads)
            .field("head_dim", &self.head_dim)
            .finish()
    }
}

impl MultiHeadAttention {
    pub fn load(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let dim = config.dim;
        let init = LinearInit::XavierUniform;
        let proj = |name: &str| Linear::load(LinearConfig::new(dim, dim), &init, vb.pp(name));
        Ok(Self {
            hidden_dim: dim,
            heads: config.head_num,
            head_dim: config.head_dim(),
            dropout_p: config.dropout,
            q_proj: proj("q_proj")?,
            k_proj: proj("k_proj")?,
            v_proj: proj("v_proj")?,
            out_proj: proj("out_proj")?,
            attention: ExactAttention::new(),
        })
    }

    fn expand_to_heads(&self, tensor: &Tensor) -> Result<Tensor> {
        let (batch, seq, _) = tensor.dims3()?;
        tensor
            .reshape((batch, seq, self.heads, self.head_dim))?
            .permute((0, 2, 1, 3))?
            .contiguous()
    }

    fn merge_from_heads(&self, tensor: &Tensor) -> Result<Tensor> {
        let (batch, _, seq, _) = tensor.dims4()?;
        tensor
            .permute((0, 2, 1, 3))?
            .reshape((batch, seq, self.hidden_dim))
    }

    /// Attends from `query` `(batch, q_len, hidden)` over `key_value` `(batch, k_len, hidden)`.
    pub fn forward(
        &self,
        query: &Tensor,
        key_value: &Tensor,
        mask: Option<&Tensor>,
        policy: &PrecisionPolicy,
        train: bool,
    ) -> Result<Tensor> {
        checks::expect_batch_seq_hidden("attention.query", query, self.hidden_dim)?;
        checks::expect_batch_seq_hidden("attention.key_value", key_value, self.hidden_dim)?;

        let q = self.expand_to_heads(&self.q_proj.forward(query, policy)?)?;
        let k = self.expand_to_heads(&self.k_proj.forward(key_value, policy)?)?;
        let v = self.expand_to_heads(&self.v_proj.forward(key_value, policy)?)?;

        let config = AttentionConfig::for_mode(self.dropout_p, train);
        let attended = self.attention.attend(&q, &k, &v, mask, &config)?;
        self.out_proj.forward(&self.merge_from_heads(&attended)?, policy)
    }
}

/// Which sublayers an [`AttentionBlock`] carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Self-attention over the source with a padding mask, then the FFN.
    Encoder,
    /// Causal self-attention, optional cross-attention to the encoder, then the FFN.
    Decoder { cross_attention: bool },
}

/// Encoder output and its additive padding mask, consumed by cross-attention.
#[derive(Debug, Clone, Copy)]
pub struct Memory<'a> {
    pub states: &'a Tensor,
    pub mask: Option<&'a Tensor>,
}

struct CrossSublayer {
    attention: MultiHeadAttention,
    residual: ResidualNorm,
}

/// Self-attention and feed-forward sublayers with post-norm residual merges.
pub struct AttentionBlock {
    kind: BlockKind,
    policy: PrecisionPolicy,
    self_attn: MultiHeadAttention,
    self_attn_residual: ResidualNorm,
    cross: Option<CrossSublayer>,
    ff: FeedForward,
    ff_residual: ResidualNorm,
}

impl fmt::Debug for AttentionBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttentionBlock")
            .field("kind", &self.kind)
            .field("self_attn", &self.self_attn)
            .finish()
    }
}

impl AttentionBlock {
    /// Builds the block's parameters under `vb` (e.g. `encoders.0`).
    pub fn load(kind: BlockKind, config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let policy = PrecisionPolicy::from_parameter_dtype(config.dtype);
        let norm = NormConfig::new(config.dim).with_epsilon(config.layer_norm_eps);
        let dropout = Dropout::new(config.dropout);

        let self_attn = MultiHeadAttention::load(config, vb.pp("self_attn"))?;
        let self_attn_residual = ResidualNorm::load(norm.clone(), dropout, vb.pp("self_attn_norm"))?;

        let cross = match kind {
            BlockKind::Decoder {
                cross_attention: true,
            } => Some(CrossSublayer {
                attention: MultiHeadAttention::load(config, vb.pp("cross_attn"))?,
                residual: ResidualNorm::load(norm.clone(), dropout, vb.pp("cross_attn_norm"))?,
            }),
            _ => None,
        };

        let mut ff_config = FeedForwardConfig::new(config.dim, config.ff_dim, ActivationKind::Gelu);
        ff_config.dropout_p = config.dropout;
        let ff = FeedForward::load(ff_config, &LinearInit::XavierUniform, vb.pp("ff"))?;
        let ff_residual = ResidualNorm::load(norm, dropout, vb.pp("ff_norm"))?;

        Ok(Self {
            kind,
            policy,
            self_attn,
            self_attn_residual,
            cross,
            ff,
            ff_residual,
        })
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    /// Forward pass through the block.
    ///
    /// `self_mask` is additive and broadcastable to `[batch, heads, seq, seq]`.
    /// `memory` is required exactly when the block was built with cross-attention.
    pub fn forward(
        &self,
        hidden: &Tensor,
        self_mask: Option<&Tensor>,
        memory: Option<Memory<'_>>,
        train: bool,
    ) -> Result<Tensor> {
        let policy = &self.policy;
        let attended = self.self_attn.forward(hidden, hidden, self_mask, policy, train)?;
        let mut hidden = self
            .self_attn_residual
            .forward(hidden, &attended, policy, train)?;

        match (&self.cross, memory) {
            (Some(cross), Some(memory)) => {
                let attended =
                    cross
                        .attention
                        .forward(&hidden, memory.states, memory.mask, policy, train)?;
                hidden = cross.residual.forward(&hidden, &attended, policy, train)?;
            }
            (Some(_), None) => bail!("cross-attention block requires encoder memory"),
            (None, Some(_)) => bail!("block {:?} has no cross-attention sublayer", self.kind),
            (None, None) => {}
        }

        let transformed = self.ff.forward(&hidden, policy, train)?;
        self.ff_residual.forward(&hidden, &transformed, policy, train)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DecoderMode;
    use attention::masks::build_causal_mask;
    use candle_core::{DType, Device};
    use candle_nn::VarMap;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            vocab_size: 16,
            dim: 8,
            encoder_depth: 1,
            decoder_depth: 1,
            max_seq_len: 8,
            head_num: 2,
            ff_dim: 16,
            dropout: Some(0.1),
            layer_norm_eps: 1e-5,
            decoder_mode: DecoderMode::EncoderOutput,
            pad_id: 0,
            dtype: DType::F32,
            device: Device::Cpu,
        }
    }

    #[test]
    fn encoder_block_keeps_shape_and_is_deterministic_in_eval() -> Result<()> {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = AttentionBlock::load(BlockKind::Encoder, &config, vb.pp("encoders.0"))?;

        let hidden = Tensor::randn(0f32, 1.0, (2, 5, 8), &Device::Cpu)?;
        let first = block.forward(&hidden, None, None, false)?;
        let second = block.forward(&hidden, None, None, false)?;
        assert_eq!(first.dims(), &[2, 5, 8]);
        let diff = first.sub(&second)?.abs()?.max_all()?.to_vec0::<f32>()?;
        assert_eq!(diff, 0.0);
        Ok(())
    }

    #[test]
    fn causal_mask_keeps_prefix_outputs_independent_of_future_tokens() -> Result<()> {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = AttentionBlock::load(
            BlockKind::Decoder {
                cross_attention: false,
            },
            &config,
            vb,
        )?;

        let prefix = Tensor::randn(0f32, 1.0, (1, 3, 8), &Device::Cpu)?;
        let tail_a = Tensor::randn(0f32, 1.0, (1, 2, 8), &Device::Cpu)?;
        let tail_b = Tensor::randn(0f32, 1.0, (1, 2, 8), &Device::Cpu)?;
        let mask = build_causal_mask(&Device::Cpu, 5, 5)?;

        let out_a = block.forward(&Tensor::cat(&[&prefix, &tail_a], 1)?, Some(&mask), None, false)?;
        let out_b = block.forward(&Tensor::cat(&[&prefix, &tail_b], 1)?, Some(&mask), None, false)?;
        let diff = out_a
            .narrow(1, 0, 3)?
            .sub(&out_b.narrow(1, 0, 3)?)?
            .abs()?
            .max_all()?
            .to_vec0::<f32>()?;
        assert!(diff < 1e-5);
        Ok(())
    }

    #[test]
    fn cross_attention_block_requires_memory() -> Result<()> {
        let config = tiny_config();
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        let block = AttentionBlock::load(
            BlockKind::Decoder {
                cross_attention: true,
            },
            &config,
            vb.pp("decoders.0"),
        )?;
        assert!(varmap
            .data()
            .lock()
            .unwrap()
            .contains_key("decoders.0.cross_attn.q_proj.weight"));

        let target = Tensor::randn(0f32, 1.0, (1, 2, 8), &Device::Cpu)?;
        let source = Tensor::randn(0f32, 1.0, (1, 6, 8), &Device::Cpu)?;
        assert!(block.forward(&target, None, None, false).is_err());

        let memory = Memory {
            states: &source,
            mask: None,
        };
        let out = block.forward(&target, None, Some(memory), false)?;
        assert_eq!(out.dims(), &[1, 2, 8]);
        Ok(())
    }
}
