//! Multi-head self-attention shared by the transformer encoders.

use crate::error::{EmbedError, Result};
use crate::nn::{scaled_dot_product_attention, Linear, RotaryEmbedding};
use candle_core::{Device, Tensor};

/// Query/key/value projection layout.
#[derive(Debug, Clone)]
pub enum QkvProjection {
    /// One `[3 * hidden, hidden]` projection (ModernBERT, NomicBERT).
    Fused(Linear),
    /// Separate projections (BERT, CLIP).
    Separate {
        /// Query projection.
        query: Linear,
        /// Key projection.
        key: Linear,
        /// Value projection.
        value: Linear,
    },
}

/// Self-attention module.
#[derive(Debug, Clone)]
pub struct SelfAttention {
    qkv: QkvProjection,
    /// Output projection: [hidden_size, hidden_size]
    output: Linear,
    /// Rotary embedding applied to queries and keys.
    rotary: Option<RotaryEmbedding>,
    /// Number of attention heads.
    num_heads: usize,
    /// Head dimension.
    head_dim: usize,
    scale: f64,
}

impl SelfAttention {
    /// Create attention from bound projections.
    pub fn new(
        qkv: QkvProjection,
        output: Linear,
        rotary: Option<RotaryEmbedding>,
        num_heads: usize,
        head_dim: usize,
    ) -> Result<Self> {
        let all_head_size = num_heads * head_dim;
        let (in_width, out_width) = match &qkv {
            QkvProjection::Fused(l) => (l.in_features(), l.out_features() / 3),
            QkvProjection::Separate { query, key, value } => {
                if key.out_features() != query.out_features()
                    || value.out_features() != query.out_features()
                {
                    return Err(EmbedError::ShapeMismatch(
                        "query, key and value projections differ in width".to_string(),
                    ));
                }
                (query.in_features(), query.out_features())
            }
        };
        if out_width != all_head_size || output.in_features() != all_head_size {
            return Err(EmbedError::ShapeMismatch(format!(
                "attention: {} heads x {} dims does not match projections ({} in, {} per stream)",
                num_heads, head_dim, in_width, out_width
            )));
        }

        Ok(Self {
            qkv,
            output,
            rotary,
            num_heads,
            head_dim,
            scale: 1.0 / (head_dim as f64).sqrt(),
        })
    }

    /// Create attention with random weights (for testing).
    pub fn random(hidden_size: usize, num_heads: usize, device: &Device) -> Result<Self> {
        let head_dim = hidden_size / num_heads;
        Self::new(
            QkvProjection::Fused(Linear::random(hidden_size, 3 * hidden_size, false, device)?),
            Linear::random(hidden_size, hidden_size, false, device)?,
            None,
            num_heads,
            head_dim,
        )
    }

    /// Split projected streams into heads: [b, s, h*d] -> [b, h, s, d].
    fn heads(&self, x: &Tensor, batch: usize, seq: usize) -> Result<Tensor> {
        Ok(x
            .reshape((batch, seq, self.num_heads, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// Project hidden states to per-head query, key and value.
    fn project(&self, hidden: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let (batch, seq, _) = hidden.dims3()?;
        match &self.qkv {
            QkvProjection::Fused(wqkv) => {
                // [b, s, 3, h, d]
                let qkv = wqkv
                    .forward(hidden)?
                    .reshape((batch, seq, 3, self.num_heads, self.head_dim))?;
                let stream = |i: usize| -> Result<Tensor> {
                    Ok(qkv
                        .narrow(2, i, 1)?
                        .squeeze(2)?
                        .transpose(1, 2)?
                        .contiguous()?)
                };
                Ok((stream(0)?, stream(1)?, stream(2)?))
            }
            QkvProjection::Separate { query, key, value } => Ok((
                self.heads(&query.forward(hidden)?, batch, seq)?,
                self.heads(&key.forward(hidden)?, batch, seq)?,
                self.heads(&value.forward(hidden)?, batch, seq)?,
            )),
        }
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `hidden` - [batch, seq, hidden]
    /// * `mask` - Additive mask broadcastable to [batch, heads, seq, seq]
    pub fn forward(&self, hidden: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq, _) = hidden.dims3()?;
        let (query, key, value) = self.project(hidden)?;

        let (query, key) = match &self.rotary {
            Some(rope) => rope.apply_qk(&query, &key)?,
            None => (query, key),
        };

        let attended =
            scaled_dot_product_attention(&query, &key, &value, mask, Some(self.scale))?;

        // [b, h, s, d] -> [b, s, h*d]
        let merged = attended
            .transpose(1, 2)?
            .reshape((batch, seq, self.num_heads * self.head_dim))?;
        self.output.forward(&merged)
    }

    /// Number of attention heads.
    pub fn num_heads(&self) -> usize {
        self.num_heads
    }

    /// Head dimension.
    pub fn head_dim(&self) -> usize {
        self.head_dim
    }
}
