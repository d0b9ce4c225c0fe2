//! Feed-forward blocks.
//!
//! - [`Mlp`]: `fc2(act(fc1(x)))`, used by BERT-family and CLIP layers
//! - [`GatedMlp`]: one fused projection split in half on the last axis,
//!   `down(act(first_half) * second_half)`
//!
//! # Gated layouts
//!
//! The activated half is the first half for both gated architectures:
//! - ModernBERT `mlp.Wi` → `[input, gate]`, GELU on `input`
//! - NomicBERT `mlp.gate_up_proj` (or `fc12 ‖ fc11`) → `[gate, up]`, SiLU on `gate`

use crate::error::{EmbedError, Result};
use crate::nn::{Activation, Linear};
use candle_core::{Device, Tensor, D};

/// Dense → activation → dense.
#[derive(Debug, Clone)]
pub struct Mlp {
    /// hidden -> intermediate
    fc1: Linear,
    /// intermediate -> hidden
    fc2: Linear,
    activation: Activation,
}

impl Mlp {
    /// Create from bound projections.
    pub fn new(fc1: Linear, fc2: Linear, activation: Activation) -> Result<Self> {
        if fc1.out_features() != fc2.in_features() {
            return Err(EmbedError::ShapeMismatch(format!(
                "mlp: fc1 produces {}, fc2 expects {}",
                fc1.out_features(),
                fc2.in_features()
            )));
        }
        Ok(Self {
            fc1,
            fc2,
            activation,
        })
    }

    /// Create with random weights (for testing).
    pub fn random(
        hidden_size: usize,
        intermediate_size: usize,
        activation: Activation,
        device: &Device,
    ) -> Result<Self> {
        Self::new(
            Linear::random(hidden_size, intermediate_size, true, device)?,
            Linear::random(intermediate_size, hidden_size, true, device)?,
            activation,
        )
    }

    /// Forward pass over `[..., hidden]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.activation.forward(&self.fc1.forward(x)?)?;
        self.fc2.forward(&h)
    }

    /// Get the intermediate size.
    pub fn intermediate_size(&self) -> usize {
        self.fc1.out_features()
    }
}

/// Gated feed-forward block (GeGLU / SwiGLU).
#[derive(Debug, Clone)]
pub struct GatedMlp {
    /// hidden -> 2 * intermediate
    gate_up: Linear,
    /// intermediate -> hidden
    down: Linear,
    activation: Activation,
}

impl GatedMlp {
    /// Create from bound projections.
    pub fn new(gate_up: Linear, down: Linear, activation: Activation) -> Result<Self> {
        let fused = gate_up.out_features();
        if fused % 2 != 0 || fused / 2 != down.in_features() {
            return Err(EmbedError::ShapeMismatch(format!(
                "gated mlp: fused projection of {} does not split onto down input {}",
                fused,
                down.in_features()
            )));
        }
        Ok(Self {
            gate_up,
            down,
            activation,
        })
    }

    /// Create with random weights (for testing).
    pub fn random(
        hidden_size: usize,
        intermediate_size: usize,
        activation: Activation,
        device: &Device,
    ) -> Result<Self> {
        Self::new(
            Linear::random(hidden_size, 2 * intermediate_size, false, device)?,
            Linear::random(intermediate_size, hidden_size, false, device)?,
            activation,
        )
    }

    /// Forward pass over `[..., hidden]`.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let fused = self.gate_up.forward(x)?;
        let split = self.intermediate_size();
        let activated = self.activation.forward(&fused.narrow(D::Minus1, 0, split)?)?;
        let other = fused.narrow(D::Minus1, split, split)?;
        self.down.forward(&(activated * other)?)
    }

    /// Get the intermediate size.
    pub fn intermediate_size(&self) -> usize {
        self.down.in_features()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gated_mlp_reference_values() {
        let device = Device::Cpu;
        let gate_up = Tensor::new(
            &[[1.0f32, 0.0], [0.0, 1.0], [1.0, 0.0], [0.0, 1.0]],
            &device,
        )
        .unwrap();
        let down = Tensor::new(&[[1.0f32, 0.0], [0.0, 1.0]], &device).unwrap();
        let mlp = GatedMlp::new(
            Linear::new(gate_up, None).unwrap(),
            Linear::new(down, None).unwrap(),
            Activation::Silu,
        )
        .unwrap();

        let x = Tensor::new(&[[1.0f32, 1.0]], &device).unwrap();
        let y = mlp.forward(&x).unwrap().to_vec2::<f32>().unwrap();
        for v in &y[0] {
            assert!((v - 0.7310586).abs() < 1e-6);
        }
    }

    #[test]
    fn gated_mlp_activates_first_half_only() {
        let device = Device::Cpu;
        // First half sees 2x, second half sees x
        let gate_up = Tensor::new(&[[2.0f32], [1.0]], &device).unwrap();
        let down = Tensor::new(&[[1.0f32]], &device).unwrap();
        let mlp = GatedMlp::new(
            Linear::new(gate_up, None).unwrap(),
            Linear::new(down, None).unwrap(),
            Activation::Relu,
        )
        .unwrap();

        let x = Tensor::new(&[[-3.0f32], [3.0]], &device).unwrap();
        let y = mlp.forward(&x).unwrap().to_vec2::<f32>().unwrap();
        assert_eq!(y, vec![vec![0.0], vec![18.0]]);
    }

    #[test]
    fn gated_mlp_rejects_bad_split() {
        let device = Device::Cpu;
        assert!(GatedMlp::new(
            Linear::random(4, 6, false, &device).unwrap(),
            Linear::random(4, 4, false, &device).unwrap(),
            Activation::Silu,
        )
        .is_err());
    }

    #[test]
    fn mlp_forward_3d() {
        let mlp = Mlp::random(16, 64, Activation::GeluPrecise, &Device::Cpu).unwrap();
        assert_eq!(mlp.intermediate_size(), 64);

        // [batch, seq, hidden]
        let x = Tensor::randn(0.0f32, 1.0, &[2, 5, 16], &Device::Cpu).unwrap();
        let output = mlp.forward(&x).unwrap();
        assert_eq!(output.dims(), &[2, 5, 16]);
    }
}
