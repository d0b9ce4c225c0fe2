//! Embedding table lookup.

use crate::error::{EmbedError, Result};
use candle_core::{DType, Tensor};

/// Row gather from a `[vocab_size, hidden_size]` table.
///
/// Ids are validated before the gather: an id at or beyond `vocab_size`
/// raises [`EmbedError::InvalidInput`] instead of wrapping.
#[derive(Debug, Clone)]
pub struct Embedding {
    weight: Tensor,
    vocab_size: usize,
    hidden_size: usize,
}

impl Embedding {
    /// Create an embedding from a bound table.
    pub fn new(weight: Tensor) -> Result<Self> {
        let (vocab_size, hidden_size) = match weight.dims() {
            &[v, h] => (v, h),
            other => {
                return Err(EmbedError::ShapeMismatch(format!(
                    "embedding table must be 2-D, got {:?}",
                    other
                )))
            }
        };
        Ok(Self {
            weight,
            vocab_size,
            hidden_size,
        })
    }

    /// Look up `[...]` integer ids, producing `[..., hidden_size]`.
    pub fn forward(&self, ids: &Tensor) -> Result<Tensor> {
        let mut out_dims = ids.dims().to_vec();
        out_dims.push(self.hidden_size);

        let flat = ids.flatten_all()?.to_dtype(DType::U32)?;
        if flat.elem_count() == 0 {
            return Ok(Tensor::zeros(
                out_dims,
                self.weight.dtype(),
                self.weight.device(),
            )?);
        }

        let max_id = flat.max(0)?.to_scalar::<u32>()? as usize;
        if max_id >= self.vocab_size {
            return Err(EmbedError::InvalidInput(format!(
                "token id {} out of range for vocabulary of {}",
                max_id, self.vocab_size
            )));
        }

        Ok(self.weight.index_select(&flat, 0)?.reshape(out_dims)?)
    }

    /// Full table.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Number of rows.
    pub fn vocab_size(&self) -> usize {
        self.vocab_size
    }

    /// Row width.
    pub fn hidden_size(&self) -> usize {
        self.hidden_size
    }
}
