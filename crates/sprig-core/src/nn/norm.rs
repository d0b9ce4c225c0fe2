//! Layer normalization over the last axis.
//!
//! # Formula
//!
//! `LayerNorm(x) = (x - mean) / sqrt(var + eps) * weight + bias`
//!
//! Mean and (biased) variance are taken over the final axis only.

use super::last_dim;
use crate::error::{EmbedError, Result};
use candle_core::{DType, Device, Tensor, D};

/// Layer normalization.
#[derive(Debug, Clone)]
pub struct LayerNorm {
    /// Scale: [hidden_size]
    weight: Tensor,
    /// Shift: [hidden_size]
    bias: Tensor,
    /// Epsilon, injected from the checkpoint config.
    eps: f64,
    hidden_size: usize,
}

impl LayerNorm {
    /// Create a layer norm from bound weights.
    pub fn new(weight: Tensor, bias: Tensor, eps: f64) -> Result<Self> {
        let hidden_size = match weight.dims() {
            &[d] => d,
            other => {
                return Err(EmbedError::ShapeMismatch(format!(
                    "layer norm weight must be 1-D, got {:?}",
                    other
                )))
            }
        };
        if bias.dims() != weight.dims() {
            return Err(EmbedError::ShapeMismatch(format!(
                "layer norm bias: expected {:?}, got {:?}",
                weight.dims(),
                bias.dims()
            )));
        }

        Ok(Self {
            weight,
            bias,
            eps,
            hidden_size,
        })
    }

    /// Unit scale and zero shift.
    pub fn identity(hidden_size: usize, eps: f64, device: &Device) -> Result<Self> {
        let weight = Tensor::ones(hidden_size, DType::F32, device)?;
        let bias = Tensor::zeros(hidden_size, DType::F32, device)?;
        Self::new(weight, bias, eps)
    }

    /// Forward pass over `[..., hidden_size]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hidden = last_dim(x, "layer norm input")?;
        if hidden != self.hidden_size {
            return Err(EmbedError::ShapeMismatch(format!(
                "layer norm input: expected last dim {}, got {:?}",
                self.hidden_size,
                x.dims()
            )));
        }

        let mean = x.mean_keepdim(D::Minus1)?;
        let centered = x.broadcast_sub(&mean)?;
        let var = centered.sqr()?.mean_keepdim(D::Minus1)?;
        let denom = (var + self.eps)?.sqrt()?;
        let normed = centered.broadcast_div(&denom)?;

        Ok(normed
            .broadcast_mul(&self.weight)?
            .broadcast_add(&self.bias)?)
    }

    /// Epsilon.
    pub fn eps(&self) -> f64 {
        self.eps
    }

    /// Normalized width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
