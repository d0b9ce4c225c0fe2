//! Activation functions.
//!
//! Checkpoints are calibrated against a specific GELU flavour, so both the
//! erf form and the tanh approximation are exposed and selected by name.

use crate::error::{EmbedError, Result};
use candle_core::Tensor;

/// `1 / (1 + exp(-x))`.
pub fn sigmoid(x: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::sigmoid(x)?)
}

/// `x · sigmoid(x)`.
pub fn silu(x: &Tensor) -> Result<Tensor> {
    Ok(candle_nn::ops::silu(x)?)
}

/// Exact GELU: `0.5 · x · (1 + erf(x / √2))`.
pub fn gelu_precise(x: &Tensor) -> Result<Tensor> {
    Ok(x.gelu_erf()?)
}

/// Tanh approximation: `0.5 · x · (1 + tanh(√(2/π) · (x + 0.044715 · x³)))`.
pub fn gelu_fast(x: &Tensor) -> Result<Tensor> {
    Ok(x.gelu()?)
}

/// CLIP's `x · sigmoid(1.702 · x)`.
pub fn quick_gelu(x: &Tensor) -> Result<Tensor> {
    let gate = candle_nn::ops::sigmoid(&x.affine(1.702, 0.0)?)?;
    Ok((x * gate)?)
}

/// Activation selected from a checkpoint config string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// erf-based GELU.
    GeluPrecise,
    /// tanh-approximated GELU.
    GeluFast,
    /// `x · sigmoid(1.702x)`.
    QuickGelu,
    /// `x · sigmoid(x)`.
    Silu,
    /// `max(x, 0)`.
    Relu,
    /// Logistic sigmoid.
    Sigmoid,
}

impl Activation {
    /// Parse a HuggingFace activation name.
    pub fn from_name(name: &str) -> Result<Self> {
        match name {
            "gelu" | "gelu_python" => Ok(Self::GeluPrecise),
            "gelu_new" | "gelu_fast" | "gelu_pytorch_tanh" => Ok(Self::GeluFast),
            "quick_gelu" => Ok(Self::QuickGelu),
            "silu" | "swish" => Ok(Self::Silu),
            "relu" => Ok(Self::Relu),
            "sigmoid" => Ok(Self::Sigmoid),
            other => Err(EmbedError::UnsupportedConfiguration(format!(
                "activation '{}'",
                other
            ))),
        }
    }

    /// Apply elementwise.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        match self {
            Self::GeluPrecise => gelu_precise(x),
            Self::GeluFast => gelu_fast(x),
            Self::QuickGelu => quick_gelu(x),
            Self::Silu => silu(x),
            Self::Relu => Ok(x.relu()?),
            Self::Sigmoid => sigmoid(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn apply(f: impl Fn(&Tensor) -> Result<Tensor>, xs: &[f32]) -> Vec<f32> {
        let x = Tensor::new(xs, &Device::Cpu).unwrap();
        f(&x).unwrap().to_vec1().unwrap()
    }

    fn assert_close(actual: &[f32], expected: &[f32]) {
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-4, "{} vs {}", a, e);
        }
    }

    #[test]
    fn sigmoid_and_silu() {
        assert_close(&apply(sigmoid, &[0.0, 1.0, -1.0]), &[0.5, 0.7310586, 0.2689414]);
        assert_close(&apply(silu, &[0.0, 1.0, -1.0]), &[0.0, 0.7310586, -0.2689414]);
    }

    #[test]
    fn gelu_variants_differ_slightly() {
        let precise = apply(gelu_precise, &[1.0, -1.0, 2.0]);
        let fast = apply(gelu_fast, &[1.0, -1.0, 2.0]);
        assert_close(&precise, &[0.8413447, -0.1586553, 1.9544997]);
        assert_close(&fast, &[0.8411920, -0.1588080, 1.9545977]);
    }

    #[test]
    fn quick_gelu_values() {
        assert_close(&apply(quick_gelu, &[0.0, 1.0]), &[0.0, 0.8457930]);
    }

    #[test]
    fn activation_names() {
        assert_eq!(Activation::from_name("gelu").unwrap(), Activation::GeluPrecise);
        assert_eq!(
            Activation::from_name("gelu_pytorch_tanh").unwrap(),
            Activation::GeluFast
        );
        assert_eq!(Activation::from_name("quick_gelu").unwrap(), Activation::QuickGelu);
        assert!(matches!(
            Activation::from_name("mish"),
            Err(EmbedError::UnsupportedConfiguration(_))
        ));
    }
}
