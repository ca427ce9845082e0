//! Lightweight validation helpers shared across layer components.
//!
//! Each helper takes a label naming the tensor under test so failures read
//! like `norm.input: expected (batch, seq, 8) layout, got [2, 3, 4]`.

use candle_core::{DType, Error, Result, Tensor};

/// Ensures a tensor has the expected number of dimensions.
pub fn expect_rank(label: &str, tensor: &Tensor, rank: usize) -> Result<()> {
    let actual = tensor.rank();
    if actual == rank {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected rank {rank}, got {actual} ({:?})",
            tensor.dims()
        )))
    }
}

/// Ensures a tensor matches the expected dimensions exactly.
pub fn expect_shape(label: &str, tensor: &Tensor, expected: &[usize]) -> Result<()> {
    let actual = tensor.dims();
    if actual == expected {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected shape {expected:?}, got {actual:?}"
        )))
    }
}

/// Validates the `(batch, seq, hidden)` convention with a known hidden size.
pub fn expect_batch_seq_hidden(label: &str, tensor: &Tensor, hidden: usize) -> Result<()> {
    match tensor.dims() {
        [batch, seq, actual_hidden] if *actual_hidden == hidden => {
            if *batch == 0 || *seq == 0 {
                Err(Error::Msg(format!(
                    "{label}: batch/seq dimensions must be non-zero, got {:?}",
                    tensor.dims()
                )))
            } else {
                Ok(())
            }
        }
        dims => Err(Error::Msg(format!(
            "{label}: expected (batch, seq, {hidden}) layout, got {dims:?}"
        ))),
    }
}

/// Checks the tensor dtype is one of the allowed values.
pub fn expect_dtype_in(label: &str, tensor: &Tensor, allowed: &[DType]) -> Result<()> {
    let dtype = tensor.dtype();
    if allowed.contains(&dtype) {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{label}: expected dtype in {allowed:?}, got {dtype:?}"
        )))
    }
}

/// Checks that two tensors can be combined without an implicit cast.
pub fn expect_same_dtype(left_label: &str, left: &Tensor, right_label: &str, right: &Tensor) -> Result<()> {
    if left.dtype() == right.dtype() {
        Ok(())
    } else {
        Err(Error::Msg(format!(
            "{left_label} ({:?}) and {right_label} ({:?}) must share a dtype",
            left.dtype(),
            right.dtype()
        )))
    }
}

/// Floating point dtypes accepted for parameters and activations.
pub const FLOAT_DTYPES: &[DType] = &[DType::F16, DType::BF16, DType::F32, DType::F64];
