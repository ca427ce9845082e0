//! Safetensors weight store: all-or-nothing load, save, and checksum verification.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use candle_core::Tensor;
use sha2::{Digest, Sha256};

use crate::{config::ModelConfig, error::ModelError, model::Model};

impl Model {
    /// Constructs the model and assigns every named parameter from `path`.
    ///
    /// A missing parameter, a shape mismatch or an unused tensor in the file
    /// aborts the load; no partially initialised model is returned.
    pub fn load_weights(
        config: ModelConfig,
        path: impl AsRef<Path>,
        expected_sha256: Option<&str>,
    ) -> Result<Self, ModelError> {
        let path = path.as_ref();
        if let Some(expected) = expected_sha256 {
            verify_sha256(path, expected)?;
        }
        let model = Self::new(config)?;
        model.apply_weights(path)?;
        model.set_training(false);
        log::info!("loaded weights from {}", path.display());
        Ok(model)
    }

    /// Overwrites the current parameters with the tensors stored at `path`.
    pub fn apply_weights(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let device = &self.config().device;
        let mut by_name = candle_core::safetensors::load(path, device)
            .map_err(|err| ModelError::weight_load(path, err.to_string()))?;

        let params = self.parameters()?;
        let mut staged = Vec::with_capacity(params.len());
        for (name, var) in &params {
            let tensor = by_name
                .remove(name)
                .ok_or_else(|| ModelError::weight_load(path, format!("missing parameter {name}")))?;
            if tensor.dims() != var.dims() {
                return Err(ModelError::weight_load(
                    path,
                    format!(
                        "parameter {name} has shape {:?}, model expects {:?}",
                        tensor.dims(),
                        var.dims()
                    ),
                ));
            }
            let tensor = tensor
                .to_dtype(var.dtype())
                .map_err(|err| ModelError::weight_load(path, format!("{name}: {err}")))?;
            staged.push((name, var, tensor));
        }

        if !by_name.is_empty() {
            let mut extra: Vec<String> = by_name.into_keys().collect();
            extra.sort();
            return Err(ModelError::weight_load(
                path,
                format!("file contains unused parameters: {}", extra.join(", ")),
            ));
        }

        for (name, var, tensor) in staged {
            var.set(&tensor)
                .map_err(|err| ModelError::weight_load(path, format!("{name}: {err}")))?;
        }
        log::debug!("assigned {} parameters from {}", params.len(), path.display());
        Ok(())
    }

    /// Writes every named parameter to a safetensors file.
    pub fn save_weights(&self, path: impl AsRef<Path>) -> Result<(), ModelError> {
        let path = path.as_ref();
        let tensors: HashMap<String, Tensor> = self
            .parameters()?
            .into_iter()
            .map(|(name, var)| (name, var.as_tensor().clone()))
            .collect();
        candle_core::safetensors::save(&tensors, path).map_err(|err| ModelError::WeightSave {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })
    }
}

/// Hex-encoded SHA-256 digest of a file, read in 1 MiB chunks.
pub fn sha256_file(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 1024 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn verify_sha256(path: &Path, expected: &str) -> Result<(), ModelError> {
    let actual =
        sha256_file(path).map_err(|err| ModelError::weight_load(path, err.to_string()))?;
    if !actual.eq_ignore_ascii_case(expected.trim()) {
        return Err(ModelError::weight_load(
            path,
            format!("checksum mismatch: expected {expected}, found {actual}"),
        ));
    }
    Ok(())
}
