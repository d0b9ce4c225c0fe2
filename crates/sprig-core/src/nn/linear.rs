//! Dense projection `x · Wᵗ + b`.

use super::last_dim;
use crate::error::{EmbedError, Result};
use candle_core::{Device, Tensor};

/// Linear projection layer.
///
/// The weight follows the PyTorch layout `[out_features, in_features]`.
/// A missing bias is skipped entirely rather than added as zeros.
#[derive(Debug, Clone)]
pub struct Linear {
    /// Weight: [out_features, in_features]
    weight: Tensor,
    /// Optional bias: [out_features]
    bias: Option<Tensor>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    /// Create a linear layer from bound weights.
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        let (out_features, in_features) = match weight.dims() {
            &[out, inp] => (out, inp),
            other => {
                return Err(EmbedError::ShapeMismatch(format!(
                    "linear weight must be 2-D, got {:?}",
                    other
                )))
            }
        };
        if let Some(b) = &bias {
            if b.dims() != [out_features] {
                return Err(EmbedError::ShapeMismatch(format!(
                    "linear bias: expected [{}], got {:?}",
                    out_features,
                    b.dims()
                )));
            }
        }

        Ok(Self {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    /// Create a linear layer with random weights (for testing).
    pub fn random(
        in_features: usize,
        out_features: usize,
        with_bias: bool,
        device: &Device,
    ) -> Result<Self> {
        let weight = Tensor::randn(0.0f32, 0.02, &[out_features, in_features], device)?;
        let bias = if with_bias {
            Some(Tensor::randn(0.0f32, 0.02, &[out_features], device)?)
        } else {
            None
        };
        Self::new(weight, bias)
    }

    /// Forward pass.
    ///
    /// # Arguments
    ///
    /// * `x` - Input tensor [..., in_features]
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let hidden = last_dim(x, "linear input")?;
        if hidden != self.in_features {
            return Err(EmbedError::ShapeMismatch(format!(
                "linear input: expected last dim {}, got {:?}",
                self.in_features,
                x.dims()
            )));
        }

        // Flatten leading dims so a single matmul covers any rank
        let dims = x.dims();
        let rows: usize = dims[..dims.len() - 1].iter().product();
        let x_2d = x.reshape((rows, hidden))?;

        let mut output = x_2d.matmul(&self.weight.t()?)?;
        if let Some(bias) = &self.bias {
            output = output.broadcast_add(bias)?;
        }

        let mut out_dims = dims.to_vec();
        let last = out_dims.len() - 1;
        out_dims[last] = self.out_features;
        Ok(output.reshape(out_dims)?)
    }

    /// Weight tensor.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Bias tensor, if any.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Input width.
    pub fn in_features(&self) -> usize {
        self.in_features
    }

    /// Output width.
    pub fn out_features(&self) -> usize {
        self.out_features
    }
}
