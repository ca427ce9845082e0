use std::fs;
use std::path::{Path, PathBuf};

use candle_core::Device;
use layers::Precision;
use model::{DecoderMode, ModelConfig};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ConfigError;
use crate::sampling::SamplingStrategy;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatConfig {
    #[serde(default)]
    pub model: ModelSection,
    pub tokenizer: tokenizer::Config,
    #[serde(default)]
    pub weights: WeightsSection,
    #[serde(default)]
    pub decoding: DecodingSection,
    #[serde(default)]
    pub presentation: PresentationSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSection {
    /// Taken from the tokenizer when omitted.
    pub vocab_size: Option<usize>,
    pub dim: usize,
    pub encoder_depth: usize,
    pub decoder_depth: usize,
    pub max_seq_len: usize,
    pub head_num: usize,
    pub dropout: Option<f32>,
    /// Defaults to `4 * dim`.
    pub ff_dim: Option<usize>,
    pub layer_norm_eps: f64,
    pub decoder_mode: DecoderMode,
    pub precision: Precision,
}

impl Default for ModelSection {
    fn default() -> Self {
        Self {
            vocab_size: None,
            dim: DEFAULT_DIM,
            encoder_depth: DEFAULT_ENCODER_DEPTH,
            decoder_depth: DEFAULT_DECODER_DEPTH,
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            head_num: DEFAULT_HEAD_NUM,
            dropout: Some(DEFAULT_DROPOUT),
            ff_dim: None,
            layer_norm_eps: DEFAULT_LAYER_NORM_EPS,
            decoder_mode: DecoderMode::default(),
            precision: Precision::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightsSection {
    /// Safetensors checkpoint; without it the model keeps its random initialisation.
    pub path: Option<PathBuf>,
    pub sha256: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DecodingSection {
    pub strategy: SamplingStrategy,
    pub min_len: usize,
    pub seed: Option<u64>,
    pub user_marker: String,
    pub bot_marker: String,
    /// Rank whole candidate turns when the strategy is sample-and-rank.
    pub rank_whole_utterances: bool,
}

impl Default for DecodingSection {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            min_len: DEFAULT_MIN_LEN,
            seed: None,
            user_marker: DEFAULT_USER_MARKER.to_owned(),
            bot_marker: DEFAULT_BOT_MARKER.to_owned(),
            rank_whole_utterances: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationSection {
    pub speaker_label: String,
    pub segment_delay_ms: u64,
    pub greeting: String,
}

impl Default for PresentationSection {
    fn default() -> Self {
        Self {
            speaker_label: "Meena".to_owned(),
            segment_delay_ms: DEFAULT_SEGMENT_DELAY_MS,
            greeting: "Say something to Meena:".to_owned(),
        }
    }
}

const DEFAULT_DIM: usize = 2560;
const DEFAULT_ENCODER_DEPTH: usize = 1;
const DEFAULT_DECODER_DEPTH: usize = 13;
const DEFAULT_MAX_SEQ_LEN: usize = 128;
const DEFAULT_HEAD_NUM: usize = 32;
const DEFAULT_DROPOUT: f32 = 0.1;
const DEFAULT_LAYER_NORM_EPS: f64 = 1e-5;
const DEFAULT_MIN_LEN: usize = 15;
const DEFAULT_USER_MARKER: &str = "A :";
const DEFAULT_BOT_MARKER: &str = "B :";
const DEFAULT_SEGMENT_DELAY_MS: u64 = 1100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Json,
    Toml,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => Ok(Self::Json),
            Some("toml") | Some("tml") | None => Ok(Self::Toml),
            Some(other) => Err(ConfigError::Format(format!(
                "unsupported configuration extension '{other}'"
            ))),
        }
    }
}

impl ChatConfig {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::load::<&str>(path, &[])
    }

    /// Reads, applies `key.path=value` overrides, resolves relative paths
    /// against the file's directory and validates.
    pub fn load<S: AsRef<str>>(path: impl AsRef<Path>, overrides: &[S]) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)?;
        let mut config = Self::parse(&contents, ConfigFormat::from_path(path)?, overrides)?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        config.apply_base_path(base_dir);
        config.validate()?;
        Ok(config)
    }

    pub fn parse<S: AsRef<str>>(
        contents: &str,
        format: ConfigFormat,
        overrides: &[S],
    ) -> Result<Self, ConfigError> {
        let mut value: Value = match format {
            ConfigFormat::Json => serde_json::from_str(contents)?,
            ConfigFormat::Toml => toml::from_str(contents)?,
        };
        for spec in overrides {
            apply_override(&mut value, spec.as_ref())?;
        }
        Ok(serde_json::from_value(value)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        let model = &self.model;

        if let Some(0) = model.vocab_size {
            errors.push("model.vocab_size must be greater than 0".to_string());
        }
        if model.dim == 0 {
            errors.push("model.dim must be greater than 0".to_string());
        }
        if model.head_num == 0 {
            errors.push("model.head_num must be greater than 0".to_string());
        } else if model.dim % model.head_num != 0 {
            errors.push(format!(
                "model.dim {} must be divisible by model.head_num {}",
                model.dim, model.head_num
            ));
        }
        if model.encoder_depth == 0 {
            errors.push("model.encoder_depth must be greater than 0".to_string());
        }
        if model.decoder_depth == 0 {
            errors.push("model.decoder_depth must be greater than 0".to_string());
        }
        if model.max_seq_len < 2 {
            errors.push("model.max_seq_len must be at least 2".to_string());
        }
        if let Some(0) = model.ff_dim {
            errors.push("model.ff_dim must be greater than 0".to_string());
        }
        if let Some(dropout) = model.dropout {
            if !(0.0..1.0).contains(&dropout) {
                errors.push(format!("model.dropout must be in [0, 1) (got {dropout})"));
            }
        }
        if !(model.layer_norm_eps > 0.0) {
            errors.push("model.layer_norm_eps must be positive".to_string());
        }

        if self.tokenizer.vocab.is_none() && self.tokenizer.tokenizer_json.is_none() {
            errors.push("tokenizer must provide either `vocab` or `tokenizer_json` path".to_string());
        }

        if let Some(sha) = &self.weights.sha256 {
            if sha.len() != 64 || !sha.chars().all(|c| c.is_ascii_hexdigit()) {
                errors.push("weights.sha256 must be 64 hexadecimal characters".to_string());
            }
            if self.weights.path.is_none() {
                errors.push("weights.sha256 is set but weights.path is missing".to_string());
            }
        }

        let decoding = &self.decoding;
        if let Err(err) = decoding.strategy.validate() {
            errors.push(format!("decoding.strategy: {err}"));
        }
        if decoding.min_len >= model.max_seq_len {
            errors.push(format!(
                "decoding.min_len {} must be smaller than model.max_seq_len {}",
                decoding.min_len, model.max_seq_len
            ));
        }
        if decoding.user_marker.trim().is_empty() {
            errors.push("decoding.user_marker must not be empty".to_string());
        }
        if decoding.bot_marker.trim().is_empty() {
            errors.push("decoding.bot_marker must not be empty".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// Reports every configured file that does not exist.
    pub fn ensure_files(&self) -> Result<(), ConfigError> {
        let mut missing = Vec::new();
        let tokenizer_file = self
            .tokenizer
            .tokenizer_json
            .as_ref()
            .or(self.tokenizer.vocab.as_ref());
        for path in tokenizer_file.into_iter().chain(self.weights.path.as_ref()) {
            if !path.is_file() {
                missing.push(path.clone());
            }
        }
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::MissingFiles(missing))
        }
    }

    /// Builds the model hyperparameters once the tokenizer is known.
    pub fn resolve_model_config(
        &self,
        tokenizer_vocab_size: usize,
        pad_id: u32,
        device: Device,
    ) -> Result<ModelConfig, ConfigError> {
        let model = &self.model;
        let vocab_size = model.vocab_size.unwrap_or(tokenizer_vocab_size);
        if vocab_size < tokenizer_vocab_size {
            return Err(ConfigError::Validation(vec![format!(
                "model.vocab_size {vocab_size} is smaller than the tokenizer vocabulary {tokenizer_vocab_size}"
            )]));
        }

        let config = ModelConfig {
            vocab_size,
            dim: model.dim,
            encoder_depth: model.encoder_depth,
            decoder_depth: model.decoder_depth,
            max_seq_len: model.max_seq_len,
            head_num: model.head_num,
            ff_dim: model.ff_dim.unwrap_or(4 * model.dim),
            dropout: model.dropout.filter(|&p| p > 0.0),
            layer_norm_eps: model.layer_norm_eps,
            decoder_mode: model.decoder_mode,
            pad_id,
            dtype: model.precision.dtype(),
            device,
        };
        config
            .validate()
            .map_err(|err| ConfigError::Validation(vec![err.to_string()]))?;
        Ok(config)
    }

    fn apply_base_path(&mut self, base: &Path) {
        for path in [
            self.tokenizer.vocab.as_mut(),
            self.tokenizer.tokenizer_json.as_mut(),
            self.weights.path.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            absolutize_in_place(path, base);
        }
    }
}

fn absolutize_in_place(path: &mut PathBuf, base: &Path) {
    if path.is_relative() {
        *path = base.join(&*path);
    }
}

/// Sets `key.path` to `value`, parsed as JSON when possible and as a string otherwise.
pub fn apply_override(root: &mut Value, spec: &str) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::Override(spec.to_string(), reason.to_string());
    let (key, raw) = spec.split_once('=').ok_or_else(|| invalid("expected key.path=value"))?;
    let segments: Vec<&str> = key.trim().split('.').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(invalid("empty key segment"));
    }
    let raw = raw.trim();
    let parsed = serde_json::from_str::<Value>(raw).unwrap_or_else(|_| Value::String(raw.to_string()));

    let (last, parents) = segments
        .split_last()
        .ok_or_else(|| invalid("empty key"))?;
    let mut cursor = root;
    for segment in parents {
        let object = cursor
            .as_object_mut()
            .ok_or_else(|| invalid("path crosses a non-table value"))?;
        cursor = object
            .entry(segment.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
    }
    let object = cursor
        .as_object_mut()
        .ok_or_else(|| invalid("path crosses a non-table value"))?;
    object.insert(last.to_string(), parsed);
    Ok(())
}
