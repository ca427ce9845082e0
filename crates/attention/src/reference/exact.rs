//! Reference attention kernel.
//!
//! Scores, mask addition and softmax run in `f32`; the result is cast back to
//! the dtype of `q`.

use std::sync::OnceLock;

use candle_core::{DType, Tensor};
use candle_nn::ops::{dropout, softmax_last_dim};

use crate::core::{Attention, AttentionError, Config};
use crate::masks::MASK_DTYPE;

/// Numerically stable, portable attention kernel.
#[derive(Debug, Default)]
pub struct ExactAttention {
    first_call: OnceLock<()>,
}

impl ExactAttention {
    pub fn new() -> Self {
        Self::default()
    }
}

fn invalid(context: impl Into<String>) -> AttentionError {
    AttentionError::InvalidShape {
        context: context.into(),
    }
}

impl ExactAttention {
    fn validate(
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
    ) -> Result<(usize, usize, usize, usize, usize), AttentionError> {
        let device = q.device();
        if !device.same_device(k.device()) || !device.same_device(v.device()) {
            return Err(invalid("q, k, v must reside on the same device"));
        }

        let dtype = q.dtype();
        if dtype != k.dtype() || dtype != v.dtype() {
            return Err(invalid("q, k, v must share the same dtype"));
        }
        if !matches!(dtype, DType::F32 | DType::F16 | DType::BF16) {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("{dtype:?}"),
            });
        }

        let (batch, heads, q_len, head_dim) = q
            .dims4()
            .map_err(|_| invalid("q must have shape [batch, heads, q_len, head_dim]"))?;
        let (kb, kh, k_len, kd) = k
            .dims4()
            .map_err(|_| invalid("k must have shape [batch, heads, k_len, head_dim]"))?;
        let (vb, vh, vk, vd) = v
            .dims4()
            .map_err(|_| invalid("v must have shape [batch, heads, k_len, head_dim]"))?;

        if kb != batch || kh != heads || kd != head_dim {
            return Err(invalid(format!(
                "k shape mismatch: expected [{batch}, {heads}, ?, {head_dim}] got [{kb}, {kh}, {k_len}, {kd}]"
            )));
        }
        if vb != batch || vh != heads || vk != k_len || vd != head_dim {
            return Err(invalid(format!(
                "v shape mismatch: expected [{batch}, {heads}, {k_len}, {head_dim}] got [{vb}, {vh}, {vk}, {vd}]"
            )));
        }
        Ok((batch, heads, q_len, k_len, head_dim))
    }

    fn broadcast_mask(
        mask: &Tensor,
        q: &Tensor,
        dims: (usize, usize, usize, usize),
    ) -> Result<Tensor, AttentionError> {
        let (batch, heads, q_len, k_len) = dims;
        if !q.device().same_device(mask.device()) {
            return Err(invalid("mask must reside on the same device as q"));
        }
        if mask.dtype() != MASK_DTYPE {
            return Err(AttentionError::UnsupportedDType {
                requested: format!("mask expects dtype {MASK_DTYPE:?}, got {:?}", mask.dtype()),
            });
        }
        let (mb, mh, mq, mk) = mask
            .dims4()
            .map_err(|_| invalid("mask must have shape [batch|1, heads|1, q_len, k_len]"))?;
        if (mb != 1 && mb != batch) || (mh != 1 && mh != heads) || mq != q_len || mk != k_len {
            return Err(invalid(format!(
                "mask shape mismatch: expected [1|{batch}, 1|{heads}, {q_len}, {k_len}] got [{mb}, {mh}, {mq}, {mk}]"
            )));
        }
        Ok(mask.broadcast_as((batch, heads, q_len, k_len))?)
    }
}

impl Attention for ExactAttention {
    fn attend(
        &self,
        q: &Tensor,
        k: &Tensor,
        v: &Tensor,
        mask: Option<&Tensor>,
        config: &Config,
    ) -> Result<Tensor, AttentionError> {
        let (batch, heads, q_len, k_len, head_dim) = Self::validate(q, k, v)?;

        if self.first_call.set(()).is_ok() {
            log::info!(
                "attention::reference init heads={heads} head_dim={head_dim} dtype={:?} dropout={:?}",
                q.dtype(),
                config.dropout_p
            );
        }

        let merged = batch * heads;
        let q_work = q.to_dtype(DType::F32)?.reshape((merged, q_len, head_dim))?;
        let k_work = k.to_dtype(DType::F32)?.reshape((merged, k_len, head_dim))?;
        let v_work = v.to_dtype(DType::F32)?.reshape((merged, k_len, head_dim))?;

        let scale = 1.0 / (head_dim as f64).sqrt();
        let scores = q_work
            .matmul(&k_work.transpose(1, 2)?.contiguous()?)?
            .affine(scale, 0.0)?
            .reshape((batch, heads, q_len, k_len))?;

        let scores = match mask {
            Some(mask) => {
                let mask = Self::broadcast_mask(mask, q, (batch, heads, q_len, k_len))?;
                scores.add(&mask)?
            }
            None => scores,
        };

        let probs = softmax_last_dim(&scores.reshape((merged, q_len, k_len))?.contiguous()?)?;
        let probs = match config.dropout_p {
            Some(p) if !(0.0..1.0).contains(&p) => {
                return Err(invalid(format!(
                    "dropout probability must be in [0, 1), got {p}"
                )));
            }
            Some(p) if p > 0.0 => dropout(&probs, p)?,
            _ => probs,
        };

        let output = probs
            .matmul(&v_work)?
            .reshape((batch, heads, q_len, head_dim))?;
        Ok(output.to_dtype(q.dtype())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::masks::{build_causal_mask, padding_mask_from_booleans};
    use candle_core::{Device, Result as CandleResult};

    fn build_inputs(device: &Device) -> CandleResult<(Tensor, Tensor, Tensor)> {
        let data: Vec<f32> = (0..64).map(|i| (i as f32) * 0.01).collect();
        let q = Tensor::from_vec(data.clone(), (1, 2, 4, 8), device)?;
        let k = Tensor::from_vec(data.iter().map(|x| x * 0.5).collect::<Vec<_>>(), (1, 2, 4, 8), device)?;
        let v = Tensor::from_vec(data.iter().map(|x| 1.0 - x).collect::<Vec<_>>(), (1, 2, 4, 8), device)?;
        Ok((q, k, v))
    }

    fn naive_attention(q: &Tensor, k: &Tensor, v: &Tensor, mask: Option<&Tensor>) -> CandleResult<Tensor> {
        let (batch, heads, q_len, head_dim) = q.dims4()?;
        let (_, _, k_len, _) = k.dims4()?;
        let q_vec = q.flatten_all()?.to_vec1::<f32>()?;
        let k_vec = k.flatten_all()?.to_vec1::<f32>()?;
        let v_vec = v.flatten_all()?.to_vec1::<f32>()?;
        let mask_vec = match mask {
            Some(m) => Some(m.broadcast_as((batch, heads, q_len, k_len))?.flatten_all()?.to_vec1::<f32>()?),
            None => None,
        };
        let scale = 1.0 / (head_dim as f32).sqrt();
        let mut output = vec![0f32; batch * heads * q_len * head_dim];

        for bh in 0..batch * heads {
            for qi in 0..q_len {
                let mut row: Vec<f32> = (0..k_len)
                    .map(|ki| {
                        let dot: f32 = (0..head_dim)
                            .map(|d| q_vec[(bh * q_len + qi) * head_dim + d] * k_vec[(bh * k_len + ki) * head_dim + d])
                            .sum();
                        let bias = mask_vec.as_ref().map(|m| m[(bh * q_len + qi) * k_len + ki]).unwrap_or(0.0);
                        dot * scale + bias
                    })
                    .collect();
                let max = row.iter().copied().filter(|x| x.is_finite()).fold(f32::NEG_INFINITY, f32::max);
                let mut denom = 0.0;
                for value in row.iter_mut() {
                    *value = if value.is_finite() { (*value - max).exp() } else { 0.0 };
                    denom += *value;
                }
                for d in 0..head_dim {
                    output[(bh * q_len + qi) * head_dim + d] = (0..k_len)
                        .map(|ki| row[ki] / denom * v_vec[(bh * k_len + ki) * head_dim + d])
                        .sum();
                }
            }
        }
        Tensor::from_vec(output, (batch, heads, q_len, head_dim), q.device())
    }

    fn max_diff(a: &Tensor, b: &Tensor) -> CandleResult<f32> {
        a.to_dtype(DType::F32)?.sub(&b.to_dtype(DType::F32)?)?.abs()?.max_all()?.to_vec0::<f32>()
    }

    #[test]
    fn exact_attention_matches_naive_with_causal_mask() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let mask = build_causal_mask(&device, 4, 4)?;
        let output = ExactAttention::new().attend(&q, &k, &v, Some(&mask), &Config::default())?;
        let expected = naive_attention(&q, &k, &v, Some(&mask))?;
        assert!(max_diff(&output, &expected)? < 1e-4);
        Ok(())
    }

    #[test]
    fn cross_attention_lengths_may_differ() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let q = Tensor::randn(0f32, 1.0, (2, 2, 3, 4), &device)?;
        let k = Tensor::randn(0f32, 1.0, (2, 2, 5, 4), &device)?;
        let v = Tensor::randn(0f32, 1.0, (2, 2, 5, 4), &device)?;
        let padding = vec![
            vec![false, false, false, true, true],
            vec![false, false, false, false, false],
        ];
        let mask = padding_mask_from_booleans(&device, &padding, 3)?;
        let output = ExactAttention::new().attend(&q, &k, &v, Some(&mask), &Config::default())?;
        assert_eq!(output.dims(), &[2, 2, 3, 4]);
        let expected = naive_attention(&q, &k, &v, Some(&mask))?;
        assert!(max_diff(&output, &expected)? < 1e-4);
        Ok(())
    }

    #[test]
    fn padded_keys_do_not_influence_output() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let q = Tensor::randn(0f32, 1.0, (1, 1, 2, 4), &device)?;
        let k = Tensor::randn(0f32, 1.0, (1, 1, 3, 4), &device)?;
        let v = Tensor::randn(0f32, 1.0, (1, 1, 3, 4), &device)?;
        let mask = padding_mask_from_booleans(&device, &[vec![false, false, true]], 2)?;
        let full = ExactAttention::new().attend(&q, &k, &v, Some(&mask), &Config::default())?;
        let trimmed = ExactAttention::new().attend(
            &q,
            &k.narrow(2, 0, 2)?.contiguous()?,
            &v.narrow(2, 0, 2)?.contiguous()?,
            None,
            &Config::default(),
        )?;
        assert!(max_diff(&full, &trimmed)? < 1e-5);
        Ok(())
    }

    #[test]
    fn mismatched_shapes_error() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 2, 4, 8), DType::F32, &device)?;
        let k = Tensor::zeros((1, 2, 5, 8), DType::F32, &device)?;
        let v = Tensor::zeros((1, 2, 4, 8), DType::F32, &device)?;
        let err = ExactAttention::new().attend(&q, &k, &v, None, &Config::default());
        assert!(matches!(err, Err(AttentionError::InvalidShape { .. })));
        Ok(())
    }

    #[test]
    fn mask_shape_validation() -> CandleResult<()> {
        let device = Device::Cpu;
        let q = Tensor::zeros((1, 2, 4, 8), DType::F32, &device)?;
        let mask = Tensor::zeros((1, 3, 4, 4), DType::F32, &device)?;
        let err = ExactAttention::new().attend(&q, &q, &q, Some(&mask), &Config::default());
        assert!(matches!(err, Err(AttentionError::InvalidShape { .. })));
        Ok(())
    }

    #[test]
    fn reduced_precision_tracks_f32() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let mask = build_causal_mask(&device, 4, 4)?;
        let reference = ExactAttention::new().attend(&q, &k, &v, Some(&mask), &Config::default())?;
        for dtype in [DType::BF16, DType::F16] {
            let out = ExactAttention::new().attend(
                &q.to_dtype(dtype)?,
                &k.to_dtype(dtype)?,
                &v.to_dtype(dtype)?,
                Some(&mask),
                &Config::default(),
            )?;
            assert_eq!(out.dtype(), dtype);
            let max = max_diff(&out, &reference)?;
            assert!(max < 5e-2, "dtype {dtype:?} diverged by {max}");
        }
        Ok(())
    }

    #[test]
    fn numerical_stability() -> anyhow::Result<()> {
        let device = Device::Cpu;
        let q = Tensor::full(10_000.0f32, (1, 1, 4, 4), &device)?;
        let k = Tensor::full(-10_000.0f32, (1, 1, 4, 4), &device)?;
        let v = Tensor::ones((1, 1, 4, 4), DType::F32, &device)?;
        let out = ExactAttention::new()
            .attend(&q, &k, &v, None, &Config::default())?
            .flatten_all()?
            .to_vec1::<f32>()?;
        assert!(out.iter().all(|value| value.is_finite()));
        Ok(())
    }

    #[test]
    fn invalid_dropout_is_rejected() -> CandleResult<()> {
        let device = Device::Cpu;
        let (q, k, v) = build_inputs(&device)?;
        let config = Config { dropout_p: Some(1.5) };
        let err = ExactAttention::new().attend(&q, &k, &v, None, &config);
        assert!(matches!(err, Err(AttentionError::InvalidShape { .. })));
        assert_eq!(Config::for_mode(Some(0.1), false), Config::default());
        Ok(())
    }
}
