//! Linear and affine projection helpers.
//!
//! Linear layers expect inputs shaped `(batch, seq, in_dim)` or `(rows, in_dim)`
//! and return the same leading layout with `out_dim` features. Weights follow
//! the `(out_dim, in_dim)` convention so checkpoints exported from PyTorch
//! `nn.Linear` load without transposition. Matmuls run in
//! [`PrecisionPolicy::compute`] and results are cast back with
//! [`PrecisionPolicy::cast_to_storage`].

use candle_core::{Error, Result, Tensor};
use candle_nn::{Init, VarBuilder};

use crate::{checks, dtypes::PrecisionPolicy};

/// Configuration shared by dense projection layers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearConfig {
    /// Incoming feature dimension.
    pub input_dim: usize,
    /// Output feature dimension.
    pub output_dim: usize,
    /// Whether a learnable bias vector should be applied.
    pub bias: bool,
}

impl LinearConfig {
    /// Creates a configuration for a projection with bias.
    pub fn new(input_dim: usize, output_dim: usize) -> Self {
        Self {
            input_dim,
            output_dim,
            bias: true,
        }
    }

    /// Same projection without the bias term (used by the vocabulary head).
    pub fn without_bias(mut self) -> Self {
        self.bias = false;
        self
    }
}

/// Shared interface for affine projections.
pub trait LinearLayer: Send + Sync {
    /// Returns the static configuration used to validate inputs.
    fn config(&self) -> &LinearConfig;

    /// Applies the linear projection, promoting to the compute dtype when needed.
    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor>;
}

/// Supported weight initialisation policies for freshly constructed projections.
#[derive(Debug, Clone)]
pub enum LinearInit {
    /// Xavier/Glorot uniform initialisation.
    XavierUniform,
    /// Xavier/Glorot normal initialisation.
    XavierNormal,
    /// Zero-mean normal with an explicit standard deviation.
    Normal { std: f64 },
    /// Scales another policy to support deep network stabilisation.
    Scaled { base: Box<LinearInit>, scale: f64 },
}

impl LinearInit {
    /// Convenience helper to scale an existing policy.
    pub fn scaled(base: LinearInit, scale: f64) -> Self {
        Self::Scaled {
            base: Box::new(base),
            scale,
        }
    }

    /// Translates the policy into a `candle_nn::Init` hint for a `(fan_out, fan_in)` weight.
    pub fn to_init(&self, fan_in: usize, fan_out: usize) -> Init {
        let (fan_in, fan_out) = (fan_in as f64, fan_out as f64);
        match self {
            LinearInit::XavierUniform => {
                let bound = (6.0f64 / (fan_in + fan_out)).sqrt();
                Init::Uniform {
                    lo: -bound,
                    up: bound,
                }
            }
            LinearInit::XavierNormal => Init::Randn {
                mean: 0.0,
                stdev: (2.0f64 / (fan_in + fan_out)).sqrt(),
            },
            LinearInit::Normal { std } => Init::Randn {
                mean: 0.0,
                stdev: *std,
            },
            LinearInit::Scaled { base, scale } => {
                match base.to_init(fan_in as usize, fan_out as usize) {
                    Init::Uniform { lo, up } => Init::Uniform {
                        lo: lo * scale,
                        up: up * scale,
                    },
                    Init::Randn { mean, stdev } => Init::Randn {
                        mean: mean * scale,
                        stdev: stdev * scale,
                    },
                    Init::Const(value) => Init::Const(value * scale),
                    other => other,
                }
            }
        }
    }
}

/// Dense affine projection with optional bias and mixed-precision aware forward pass.
#[derive(Debug, Clone)]
pub struct Linear {
    config: LinearConfig,
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Constructs a linear layer from pre-existing parameters.
    pub fn new(config: LinearConfig, weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        Self::validate_weight(&config, &weight)?;
        Self::validate_bias(&config, bias.as_ref())?;
        Ok(Self {
            config,
            weight,
            bias,
        })
    }

    /// Fetches (or creates, following `init`) `weight` and `bias` under `vb`.
    pub fn load(config: LinearConfig, init: &LinearInit, vb: VarBuilder) -> Result<Self> {
        let weight = vb.get_with_hints(
            (config.output_dim, config.input_dim),
            "weight",
            init.to_init(config.input_dim, config.output_dim),
        )?;
        let bias = if config.bias {
            Some(vb.get_with_hints(config.output_dim, "bias", Init::Const(0.0))?)
        } else {
            None
        };
        Self::new(config, weight, bias)
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    fn validate_weight(config: &LinearConfig, weight: &Tensor) -> Result<()> {
        checks::expect_rank("linear.weight", weight, 2)?;
        checks::expect_shape(
            "linear.weight",
            weight,
            &[config.output_dim, config.input_dim],
        )?;
        checks::expect_dtype_in("linear.weight", weight, checks::FLOAT_DTYPES)
    }

    fn validate_bias(config: &LinearConfig, bias: Option<&Tensor>) -> Result<()> {
        match (config.bias, bias) {
            (true, Some(tensor)) => {
                checks::expect_shape("linear.bias", tensor, &[config.output_dim])?;
                checks::expect_dtype_in("linear.bias", tensor, checks::FLOAT_DTYPES)
            }
            (false, Some(_)) => Err(Error::Msg(
                "linear.bias: bias provided but config disables bias".into(),
            )),
            (true, None) => Err(Error::Msg(
                "linear.bias: config expects bias but none supplied".into(),
            )),
            (false, None) => Ok(()),
        }
    }

    fn validate_input(&self, hidden: &Tensor) -> Result<()> {
        match hidden.dims() {
            [_, _, _] => checks::expect_batch_seq_hidden("linear.input", hidden, self.config.input_dim),
            [_, hidden_dim] if *hidden_dim == self.config.input_dim => Ok(()),
            dims => Err(Error::Msg(format!(
                "linear.input: expected [B, T, {}] or [T, {}], got {:?}",
                self.config.input_dim, self.config.input_dim, dims
            ))),
        }
    }
}

impl LinearLayer for Linear {
    fn config(&self) -> &LinearConfig {
        &self.config
    }

    fn forward(&self, hidden: &Tensor, policy: &PrecisionPolicy) -> Result<Tensor> {
        self.validate_input(hidden)?;

        let input = policy.cast_for_matmul(hidden)?;
        let weight_t = policy.cast_for_matmul(&self.weight)?.t()?;

        let mut output = match input.dims() {
            [batch, seq, _] => {
                let (batch, seq) = (*batch, *seq);
                input
                    .reshape((batch * seq, self.config.input_dim))?
                    .matmul(&weight_t)?
                    .reshape((batch, seq, self.config.output_dim))?
            }
            _ => input.matmul(&weight_t)?,
        };

        if let Some(bias) = &self.bias {
            output = output.broadcast_add(&policy.cast_for_matmul(bias)?)?;
        }

        policy.cast_to_storage(&output)
    }
}
