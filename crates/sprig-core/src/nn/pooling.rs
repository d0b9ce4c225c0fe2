//! Pooling and normalization helpers applied after the forward pass.

use crate::error::{EmbedError, Result};
use candle_core::{DType, Tensor, D};

/// Masked mean over the sequence axis: `[batch, seq, hidden]` → `[batch, hidden]`.
///
/// With a mask, padded positions are zeroed and each row is divided by its
/// own valid-token count (clamped to 1e-9). Without one, a plain mean.
pub fn mean_pool(hidden: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
    let (batch, seq, _) = hidden.dims3()?;
    let Some(mask) = mask else {
        return Ok(hidden.mean(1)?);
    };
    if mask.dims() != [batch, seq] {
        return Err(EmbedError::ShapeMismatch(format!(
            "pooling mask: expected [{}, {}], got {:?}",
            batch,
            seq,
            mask.dims()
        )));
    }

    let weights = mask.to_dtype(hidden.dtype())?.unsqueeze(2)?;
    let summed = hidden.broadcast_mul(&weights)?.sum(1)?;
    let counts = weights.sum(1)?.maximum(1e-9)?;
    Ok(summed.broadcast_div(&counts)?)
}

/// First (CLS) position: `[batch, seq, hidden]` → `[batch, hidden]`.
pub fn first_token(hidden: &Tensor) -> Result<Tensor> {
    Ok(hidden.narrow(1, 0, 1)?.squeeze(1)?)
}

/// Divide each vector along the last axis by its L2 norm (clamped to 1e-12).
pub fn l2_normalize(x: &Tensor) -> Result<Tensor> {
    let x = if x.dtype() == DType::F32 {
        x.clone()
    } else {
        x.to_dtype(DType::F32)?
    };
    let norm = x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?.maximum(1e-12)?;
    Ok(x.broadcast_div(&norm)?)
}
