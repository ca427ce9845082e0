//! Learned absolute position table (`max_seq_len` rows).
//!
//! Row `i` is added to the token embedding at sequence position `i`, so a
//! sequence may never be longer than the table.

use candle_core::{bail, Result, Tensor};
use candle_nn::{Init, VarBuilder};
use layers::checks::expect_batch_seq_hidden;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionEmbeddingConfig {
    pub max_seq_len: usize,
    pub hidden_dim: usize,
}

#[derive(Debug, Clone)]
pub struct PositionEmbedding {
    config: PositionEmbeddingConfig,
    weight: Tensor,
}

impl PositionEmbedding {
    pub fn load(config: PositionEmbeddingConfig, vb: VarBuilder) -> Result<Self> {
        if config.max_seq_len == 0 || config.hidden_dim == 0 {
            bail!("position embedding requires non-zero max_seq_len and hidden_dim");
        }
        let weight = vb.get_with_hints(
            (config.max_seq_len, config.hidden_dim),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: 0.02,
            },
        )?;
        Ok(Self { config, weight })
    }

    pub fn config(&self) -> &PositionEmbeddingConfig {
        &self.config
    }

    /// Returns rows `0..seq_len` shaped `(1, seq_len, hidden)` for broadcasting over batch.
    pub fn forward(&self, seq_len: usize) -> Result<Tensor> {
        if seq_len == 0 {
            bail!("position embedding requires seq_len > 0");
        }
        if seq_len > self.config.max_seq_len {
            bail!(
                "sequence length {seq_len} exceeds position table size {}",
                self.config.max_seq_len
            );
        }
        self.weight.narrow(0, 0, seq_len)?.unsqueeze(0)
    }

    /// Adds the position rows to `(batch, seq, hidden)` token embeddings.
    pub fn add_to(&self, embeddings: &Tensor) -> Result<Tensor> {
        expect_batch_seq_hidden("token embeddings", embeddings, self.config.hidden_dim)?;
        let (_, seq_len, _) = embeddings.dims3()?;
        let positions = self.forward(seq_len)?.to_dtype(embeddings.dtype())?;
        embeddings.broadcast_add(&positions)
    }
}
