//! Builders for padding masks used to drop padded keys.

use candle_core::{DType, Device, Error, Result, Tensor};

/// Construct a `[batch, 1, q_len, k_len]` mask from boolean padding indicators.
///
/// Each inner slice corresponds to a batch element and must share the same
/// length. `true` indicates a padded (masked) key position. A row made only of
/// padding is left unmasked so the softmax stays finite.
pub fn padding_mask_from_booleans(
    device: &Device,
    padding: &[Vec<bool>],
    q_len: usize,
) -> Result<Tensor> {
    let k_len = padding.first().map(Vec::len).unwrap_or(0);
    if padding.iter().any(|row| row.len() != k_len) {
        return Err(Error::Msg(
            "padding mask: all rows must share k_len".to_string(),
        ));
    }

    let batch = padding.len();
    let mut data = Vec::with_capacity(batch * q_len * k_len);
    for row in padding {
        let all_padding = row.iter().all(|&p| p);
        let keys: Vec<f32> = row
            .iter()
            .map(|&is_padding| {
                if is_padding && !all_padding {
                    f32::NEG_INFINITY
                } else {
                    0.0
                }
            })
            .collect();
        for _ in 0..q_len {
            data.extend_from_slice(&keys);
        }
    }

    Tensor::from_vec(data, (batch, 1, q_len, k_len), device)
}

/// Convert a `[batch, k_len]` keep-mask (nonzero = real token) into an additive
/// `[batch, 1, q_len, k_len]` mask without leaving the mask's device.
///
/// Rows without any real token stay unmasked, as in [`padding_mask_from_booleans`].
pub fn padding_mask_from_token_mask(keep: &Tensor, q_len: usize) -> Result<Tensor> {
    let (batch, k_len) = keep.dims2()?;
    let keep = keep.to_dtype(DType::F32)?;
    let padded = keep.eq(0f32)?.to_dtype(DType::F32)?;
    let has_real = keep.ne(0f32)?.to_dtype(DType::F32)?.max_keepdim(1)?;
    let hidden = padded.broadcast_mul(&has_real)?.ne(0f32)?;

    let neg_inf = Tensor::full(f32::NEG_INFINITY, (batch, k_len), keep.device())?;
    let zeros = Tensor::zeros((batch, k_len), DType::F32, keep.device())?;
    hidden
        .where_cond(&neg_inf, &zeros)?
        .reshape((batch, 1, 1, k_len))?
        .broadcast_as((batch, 1, q_len, k_len))?
        .contiguous()
}
