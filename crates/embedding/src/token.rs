//! Token embedding layer.

use candle_core::{bail, DType, Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};

/// Configuration for building a token embedding table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEmbeddingConfig {
    /// Size of the vocabulary (number of distinct tokens).
    pub vocab_size: usize,
    /// Dimensionality of each embedding vector.
    pub hidden_dim: usize,
}

/// Learnable `(vocab_size, hidden_dim)` lookup table.
#[derive(Debug, Clone)]
pub struct TokenEmbedding {
    config: TokenEmbeddingConfig,
    weight: Tensor,
}

impl TokenEmbedding {
    /// Fetches `weight` under `vb`, sampling fresh parameters from `N(0, 1)`.
    pub fn load(config: TokenEmbeddingConfig, vb: VarBuilder) -> Result<Self> {
        if config.vocab_size == 0 {
            bail!("token embedding requires vocab_size > 0");
        }
        if config.hidden_dim == 0 {
            bail!("token embedding requires hidden_dim > 0");
        }
        let weight = vb.get_with_hints(
            (config.vocab_size, config.hidden_dim),
            "weight",
            Init::Randn {
                mean: 0.0,
                stdev: 1.0,
            },
        )?;
        Ok(Self { config, weight })
    }

    pub fn config(&self) -> &TokenEmbeddingConfig {
        &self.config
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Looks up embeddings for the provided token ids.
    ///
    /// Inputs must be shaped `(batch, seq)` with an integer dtype. Outputs follow the
    /// `(batch, seq, hidden)` layout in the parameter dtype.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = self.validate_token_ids(token_ids)?;

        let flat = token_ids.to_dtype(DType::I64)?.flatten_all()?;
        self.ensure_id_range(&flat)?;

        self.weight
            .index_select(&flat, 0)?
            .reshape((batch, seq, self.config.hidden_dim))
    }

    fn validate_token_ids(&self, token_ids: &Tensor) -> Result<(usize, usize)> {
        let (batch, seq) = match token_ids.dims() {
            [batch, seq] if *batch > 0 && *seq > 0 => (*batch, *seq),
            [_, _] => bail!("token_ids must have non-zero batch and seq dimensions"),
            dims => bail!("token_ids must be shaped [batch, seq], got {dims:?}"),
        };
        if !token_ids.dtype().is_int() {
            return Err(Error::Msg(format!(
                "token_ids expected integer dtype but received {:?}",
                token_ids.dtype()
            )));
        }
        Ok((batch, seq))
    }

    fn ensure_id_range(&self, flat_ids: &Tensor) -> Result<()> {
        let min_id = flat_ids.min_all()?.to_scalar::<i64>()?;
        if min_id < 0 {
            bail!("encountered negative token id {min_id}");
        }
        let max_id = flat_ids.max_all()?.to_scalar::<i64>()?;
        let vocab = self.config.vocab_size as i64;
        if max_id >= vocab {
            bail!("token id {max_id} exceeds vocab size {vocab}");
        }
        Ok(())
    }
}
