//! Scaled dot-product attention and additive mask construction.
//!
//! Masks are additive: allowed positions hold `0`, disallowed positions a
//! large finite negative value. A row whose keys are all masked therefore
//! degrades to uniform attention over that row instead of producing NaN.

use crate::error::{EmbedError, Result};
use candle_core::{DType, Device, Tensor, D};

/// Additive value for disallowed positions (causal, sliding window, padding).
pub const MASK_VALUE: f64 = -1e9;

/// Additive value used by the BERT-style extended attention mask.
pub const BERT_MASK_VALUE: f64 = -10000.0;

/// `softmax(Q·Kᵗ·scale + mask)·V`.
///
/// # Arguments
///
/// * `query` - [..., seq_q, head_dim]
/// * `key` - [..., seq_k, head_dim]
/// * `value` - [..., seq_k, value_dim]
/// * `mask` - Optional additive mask, broadcastable to [..., seq_q, seq_k]
/// * `scale` - Defaults to `1 / sqrt(head_dim)`
pub fn scaled_dot_product_attention(
    query: &Tensor,
    key: &Tensor,
    value: &Tensor,
    mask: Option<&Tensor>,
    scale: Option<f64>,
) -> Result<Tensor> {
    let rank = query.rank();
    if rank < 2 || key.rank() != rank || value.rank() != rank {
        return Err(EmbedError::ShapeMismatch(format!(
            "attention operands need equal rank >= 2, got query {:?}, key {:?}, value {:?}",
            query.dims(),
            key.dims(),
            value.dims()
        )));
    }

    let (q_dims, k_dims, v_dims) = (query.dims(), key.dims(), value.dims());
    if q_dims[rank - 1] != k_dims[rank - 1] {
        return Err(EmbedError::ShapeMismatch(format!(
            "query and key last dims differ: {:?} vs {:?}",
            q_dims, k_dims
        )));
    }
    if k_dims[rank - 2] != v_dims[rank - 2] {
        return Err(EmbedError::ShapeMismatch(format!(
            "key and value sequence lengths differ: {:?} vs {:?}",
            k_dims, v_dims
        )));
    }
    if q_dims[..rank - 2] != k_dims[..rank - 2] || k_dims[..rank - 2] != v_dims[..rank - 2] {
        return Err(EmbedError::ShapeMismatch(format!(
            "attention batch dims differ: {:?}, {:?}, {:?}",
            q_dims, k_dims, v_dims
        )));
    }

    let head_dim = q_dims[rank - 1];
    let scale = scale.unwrap_or_else(|| 1.0 / (head_dim as f64).sqrt());

    let key_t = key.t()?.contiguous()?;
    let scores = (query.contiguous()?.matmul(&key_t)? * scale)?;
    let scores = match mask {
        Some(mask) => scores.broadcast_add(mask)?,
        None => scores,
    };

    let weights = candle_nn::ops::softmax(&scores, D::Minus1)?;
    Ok(weights.matmul(&value.contiguous()?)?)
}

/// Check a `[batch, seq]` attention mask and cast it to f32.
fn mask_2d(mask: &Tensor) -> Result<(Tensor, usize, usize)> {
    match mask.dims() {
        &[b, s] => Ok((mask.to_dtype(DType::F32)?, b, s)),
        other => Err(EmbedError::ShapeMismatch(format!(
            "attention mask must be [batch, seq], got {:?}",
            other
        ))),
    }
}

/// BERT-style extended mask: `(1 - mask) * value`, shaped `[batch, 1, 1, seq]`.
pub fn extended_attention_mask(mask: &Tensor, value: f64) -> Result<Tensor> {
    let (mask, _, _) = mask_2d(mask)?;
    Ok(mask
        .affine(-1.0, 1.0)?
        .affine(value, 0.0)?
        .unsqueeze(1)?
        .unsqueeze(1)?)
}

/// Causal mask `[seq, seq]`: `MASK_VALUE` where the key is after the query.
pub fn causal_mask(seq_len: usize, device: &Device) -> Result<Tensor> {
    let data: Vec<f32> = (0..seq_len)
        .flat_map(|i| (0..seq_len).map(move |j| if j > i { MASK_VALUE as f32 } else { 0.0 }))
        .collect();
    Ok(Tensor::from_vec(data, (seq_len, seq_len), device)?)
}

/// Global and sliding-window masks for local/global attention.
///
/// Returns `(global, local)`, both `[batch, 1, seq, seq]`:
/// - `global` is `MASK_VALUE` wherever the key position is padding.
/// - `local` additionally masks `|i - j| > window / 2`, combined with
///   `global` by elementwise minimum.
///
/// Both are derived from the mask passed in and are never cached.
pub fn sliding_window_masks(mask: &Tensor, window: usize) -> Result<(Tensor, Tensor)> {
    let (mask, batch, seq_len) = mask_2d(mask)?;
    let device = mask.device();

    let global = mask
        .affine(-1.0, 1.0)?
        .affine(MASK_VALUE, 0.0)?
        .reshape((batch, 1, 1, seq_len))?
        .broadcast_as((batch, 1, seq_len, seq_len))?
        .contiguous()?;

    let half = window / 2;
    let band: Vec<f32> = (0..seq_len)
        .flat_map(|i| {
            (0..seq_len).map(move |j| if i.abs_diff(j) > half { MASK_VALUE as f32 } else { 0.0 })
        })
        .collect();
    let band = Tensor::from_vec(band, (seq_len, seq_len), device)?;
    let local = global.broadcast_minimum(&band)?;

    Ok((global, local))
}
