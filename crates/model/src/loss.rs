//! Next-token cross-entropy over shifted logits.

use candle_core::{DType, Tensor, D};

use crate::error::ModelError;

/// Cross-entropy between `logits[:, :-1]` and `labels[:, 1:]`.
///
/// Positions whose label equals `ignore_id` are excluded from both the sum and
/// the denominator. Returns `None` when no position remains.
pub fn shifted_cross_entropy(
    logits: &Tensor,
    labels: &Tensor,
    ignore_id: u32,
) -> Result<Option<Tensor>, ModelError> {
    let (batch, seq, vocab) = logits.dims3()?;
    if labels.dims() != [batch, seq] {
        return Err(ModelError::Input(format!(
            "labels must be [{batch}, {seq}] to match logits, got {:?}",
            labels.dims()
        )));
    }
    if seq < 2 {
        return Ok(None);
    }

    let rows = batch * (seq - 1);
    let shift_logits = logits
        .narrow(1, 0, seq - 1)?
        .to_dtype(DType::F32)?
        .reshape((rows, vocab))?;
    let shift_labels = labels.narrow(1, 1, seq - 1)?.to_dtype(DType::U32)?.flatten_all()?;

    let values = shift_labels.to_vec1::<u32>()?;
    if let Some(bad) = values.iter().find(|&&id| id != ignore_id && id as usize >= vocab) {
        return Err(ModelError::Input(format!(
            "label {bad} is outside the vocabulary of {vocab} tokens"
        )));
    }
    let keep: Vec<f32> = values
        .iter()
        .map(|&id| if id == ignore_id { 0.0 } else { 1.0 })
        .collect();
    let count = keep.iter().sum::<f32>();
    if count == 0.0 {
        return Ok(None);
    }
    let safe_ids: Vec<u32> = values
        .iter()
        .map(|&id| if id == ignore_id { 0 } else { id })
        .collect();

    let device = logits.device();
    let ids = Tensor::from_vec(safe_ids, (rows, 1), device)?;
    let keep = Tensor::from_vec(keep, rows, device)?;

    let log_probs = candle_nn::ops::log_softmax(&shift_logits, D::Minus1)?;
    let picked = log_probs.gather(&ids, 1)?.squeeze(1)?;
    let total = picked.mul(&keep)?.sum_all()?;
    Ok(Some(total.affine(-1.0 / f64::from(count), 0.0)?))
}
