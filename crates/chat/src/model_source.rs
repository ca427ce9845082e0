use candle_core::Tensor;
use model::Model;

use crate::context::pad_to;
use crate::error::{ChatError, Result};
use crate::generation::LogitSource;

/// Runs the full forward pass with the context padded to `max_seq_len` and
/// returns the logits at the last position.
impl LogitSource for Model {
    fn vocab_size(&self) -> usize {
        self.config().vocab_size
    }

    fn next_token_logits(&self, source: &[u32], decoder: &[u32]) -> Result<Vec<f32>> {
        let config = self.config();
        if source.len() > config.max_seq_len {
            return Err(ChatError::Model(model::ModelError::Input(format!(
                "context of {} tokens exceeds max_seq_len {}",
                source.len(),
                config.max_seq_len
            ))));
        }
        let padded = pad_to(source, config.max_seq_len, config.pad_id);
        let device = &config.device;
        let source_ids = Tensor::from_vec(padded, (1, config.max_seq_len), device)?;
        let source_mask = source_ids.ne(config.pad_id)?;
        let decoder_ids = Tensor::from_vec(decoder.to_vec(), (1, decoder.len()), device)?;

        let output = self.forward(&source_ids, &decoder_ids, &source_mask, None)?;
        let (_, seq, _) = output.logits.dims3()?;
        let last = output.logits.get(0)?.get(seq - 1)?;
        Ok(last.to_dtype(candle_core::DType::F32)?.to_vec1::<f32>()?)
    }
}
