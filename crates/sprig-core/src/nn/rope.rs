//! Rotary Position Embeddings (RoPE).
//!
//! RoPE encodes position information by rotating pairs of channels by an
//! angle proportional to the token position. Only the first `dims` channels
//! of the last axis are rotated; any channels beyond `dims` pass through
//! unchanged (partial rotary).
//!
//! Channel pairs use the non-interleaved "rotate half" layout: channel `i`
//! is paired with channel `i + dims / 2`.
//!
//! # Reference
//!
//! [RoFormer: Enhanced Transformer with Rotary Position Embedding](https://arxiv.org/abs/2104.09864)

use super::last_dim;
use crate::error::{EmbedError, Result};
use candle_core::{Device, Tensor, D};

/// Rotary Position Embedding implementation.
#[derive(Debug, Clone)]
pub struct RotaryEmbedding {
    /// Cosine cache for positions: [max_seq_len, dims / 2]
    cos_cache: Tensor,
    /// Sine cache for positions: [max_seq_len, dims / 2]
    sin_cache: Tensor,
    /// Number of rotated channels.
    dims: usize,
    /// Base frequency.
    base: f64,
    /// Maximum sequence length cached.
    max_seq_len: usize,
}

impl RotaryEmbedding {
    /// Create a new rotary embedding.
    ///
    /// # Arguments
    ///
    /// * `dims` - Number of leading channels to rotate (must be even)
    /// * `base` - Base frequency (10000.0 for most checkpoints)
    /// * `max_seq_len` - Positions to precompute; longer inputs are computed on the fly
    /// * `device` - Device for tensors
    pub fn new(dims: usize, base: f64, max_seq_len: usize, device: &Device) -> Result<Self> {
        if dims == 0 || dims % 2 != 0 {
            return Err(EmbedError::UnsupportedConfiguration(format!(
                "rotary dims must be a positive even number, got {}",
                dims
            )));
        }

        let (cos_cache, sin_cache) = Self::tables(dims, base, max_seq_len, device)?;

        Ok(Self {
            cos_cache,
            sin_cache,
            dims,
            base,
            max_seq_len,
        })
    }

    /// Compute cos/sin tables: theta = p * base^(-2i/dims).
    fn tables(dims: usize, base: f64, seq_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
        let half_dim = dims / 2;
        let inv_freq: Vec<f32> = (0..half_dim)
            .map(|i| base.powf(-2.0 * i as f64 / dims as f64) as f32)
            .collect();
        let inv_freq = Tensor::from_vec(inv_freq, (1, half_dim), device)?;

        let positions: Vec<f32> = (0..seq_len).map(|p| p as f32).collect();
        let positions = Tensor::from_vec(positions, (seq_len, 1), device)?;

        // freqs = positions * inv_freq -> [seq_len, half_dim]
        let freqs = positions.matmul(&inv_freq)?;
        Ok((freqs.cos()?, freqs.sin()?))
    }

    /// Apply rotary embeddings to `[..., seq_len, head_dim]`, positions starting at zero.
    pub fn apply(&self, x: &Tensor) -> Result<Tensor> {
        let rank = x.rank();
        if rank < 2 {
            return Err(EmbedError::ShapeMismatch(format!(
                "rotary input needs [..., seq, dim], got {:?}",
                x.dims()
            )));
        }
        let head_dim = last_dim(x, "rotary input")?;
        if head_dim < self.dims {
            return Err(EmbedError::ShapeMismatch(format!(
                "rotary dims {} exceed head dim {}",
                self.dims, head_dim
            )));
        }
        let seq_len = x.dims()[rank - 2];

        let (cos, sin) = if seq_len <= self.max_seq_len {
            (
                self.cos_cache.narrow(0, 0, seq_len)?,
                self.sin_cache.narrow(0, 0, seq_len)?,
            )
        } else {
            Self::tables(self.dims, self.base, seq_len, x.device())?
        };

        let half_dim = self.dims / 2;
        let x1 = x.narrow(D::Minus1, 0, half_dim)?;
        let x2 = x.narrow(D::Minus1, half_dim, half_dim)?;

        // [x1, x2] -> [x1*cos - x2*sin, x2*cos + x1*sin]
        let out1 = (x1.broadcast_mul(&cos)? - x2.broadcast_mul(&sin)?)?;
        let out2 = (x2.broadcast_mul(&cos)? + x1.broadcast_mul(&sin)?)?;

        if head_dim == self.dims {
            Ok(Tensor::cat(&[out1, out2], D::Minus1)?)
        } else {
            let pass = x.narrow(D::Minus1, self.dims, head_dim - self.dims)?;
            Ok(Tensor::cat(&[out1, out2, pass], D::Minus1)?)
        }
    }

    /// Apply to query and key together.
    pub fn apply_qk(&self, query: &Tensor, key: &Tensor) -> Result<(Tensor, Tensor)> {
        Ok((self.apply(query)?, self.apply(key)?))
    }

    /// Number of rotated channels.
    pub fn dims(&self) -> usize {
        self.dims
    }

    /// Base frequency.
    pub fn base(&self) -> f64 {
        self.base
    }

    /// Get the maximum sequence length cached.
    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Invariant: position 0 is the identity rotation.
        #[test]
        fn invariant_position_zero_is_identity(
            half in 1usize..16,
            values in prop::collection::vec(-10.0f32..10.0, 32),
        ) {
            let dims = half * 2;
            let rope = RotaryEmbedding::new(dims, 10000.0, 4, &Device::Cpu).unwrap();
            let x = Tensor::from_vec(values[..dims].to_vec(), (1, dims), &Device::Cpu).unwrap();
            let y = rope.apply(&x).unwrap().flatten_all().unwrap().to_vec1::<f32>().unwrap();
            prop_assert_eq!(y, values[..dims].to_vec());
        }
    }
}
