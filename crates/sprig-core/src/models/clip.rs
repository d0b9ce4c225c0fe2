//! CLIP text tower.
//!
//! Pre-norm transformer with causal attention. The pooled output is the
//! final hidden state at the end-of-text token, optionally projected by
//! `text_projection`.

use super::attention::{QkvProjection, SelfAttention};
use super::config::ClipTextConfig;
use super::mlp::Mlp;
use crate::error::{EmbedError, Result};
use crate::nn::{
    causal_mask, extended_attention_mask, Activation, Embedding, LayerNorm, Linear, MASK_VALUE,
};
use crate::weights::WeightBinder;
use candle_core::{Device, IndexOp, Tensor};

#[derive(Debug, Clone)]
struct ClipLayer {
    layer_norm1: LayerNorm,
    attention: SelfAttention,
    layer_norm2: LayerNorm,
    mlp: Mlp,
}

impl ClipLayer {
    fn load(
        binder: &WeightBinder<'_>,
        config: &ClipTextConfig,
        activation: Activation,
    ) -> Result<Self> {
        let eps = config.layer_norm_eps;
        let attn = binder.pp("self_attn");
        let attention = SelfAttention::new(
            QkvProjection::Separate {
                query: attn.linear("q_proj", true)?,
                key: attn.linear("k_proj", true)?,
                value: attn.linear("v_proj", true)?,
            },
            attn.linear("out_proj", true)?,
            None,
            config.num_attention_heads,
            config.head_dim(),
        )?;
        let mlp = binder.pp("mlp");
        Ok(Self {
            layer_norm1: binder.layer_norm("layer_norm1", eps, true)?,
            attention,
            layer_norm2: binder.layer_norm("layer_norm2", eps, true)?,
            mlp: Mlp::new(mlp.linear("fc1", true)?, mlp.linear("fc2", true)?, activation)?,
        })
    }

    fn forward(&self, hidden: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let attended = self
            .attention
            .forward(&self.layer_norm1.forward(hidden)?, Some(mask))?;
        let hidden = (hidden + attended)?;
        let mlp_out = self.mlp.forward(&self.layer_norm2.forward(&hidden)?)?;
        Ok((hidden + mlp_out)?)
    }
}

/// CLIP text encoder.
#[derive(Debug, Clone)]
pub struct ClipText {
    config: ClipTextConfig,
    token_embedding: Embedding,
    position_embedding: Embedding,
    layers: Vec<ClipLayer>,
    final_layer_norm: LayerNorm,
    text_projection: Option<Linear>,
    device: Device,
}

impl ClipText {
    /// Bind weights under `text_model.*`; `text_projection` is taken when present.
    pub fn load(binder: &WeightBinder<'_>, config: ClipTextConfig) -> Result<Self> {
        config.validate()?;
        let activation = Activation::from_name(&config.hidden_act)?;
        let text = binder.pp("text_model");
        let emb = text.pp("embeddings");
        let token_embedding = emb.embedding("token_embedding")?;
        let position_embedding = emb.embedding("position_embedding")?;

        let layer_root = text.pp("encoder").pp("layers");
        let layers = (0..config.num_hidden_layers)
            .map(|i| ClipLayer::load(&layer_root.pp(i), &config, activation))
            .collect::<Result<Vec<_>>>()?;
        let final_layer_norm = text.layer_norm("final_layer_norm", config.layer_norm_eps, true)?;

        let text_projection = if binder.contains("text_projection.weight") {
            Some(binder.linear("text_projection", false)?)
        } else {
            None
        };

        tracing::info!(
            layers = layers.len(),
            hidden = config.hidden_size,
            projection = text_projection.is_some(),
            "bound clip text tower"
        );

        Ok(Self {
            config,
            token_embedding,
            position_embedding,
            layers,
            final_layer_norm,
            text_projection,
            device: binder.device().clone(),
        })
    }

    /// Last hidden state `[batch, seq, hidden]`, after the final layer norm.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq) = input_ids.dims2()?;
        if seq > self.config.max_position_embeddings {
            return Err(EmbedError::InvalidInput(format!(
                "clip text tower takes at most {} tokens, got {}",
                self.config.max_position_embeddings, seq
            )));
        }

        // [s, s] -> [1, 1, s, s], then fold in key padding
        let mut mask = causal_mask(seq, input_ids.device())?.unsqueeze(0)?.unsqueeze(0)?;
        if let Some(m) = attention_mask {
            let padding = extended_attention_mask(m, MASK_VALUE)?;
            mask = mask.broadcast_minimum(&padding)?;
        }

        let position_ids = Tensor::arange(0u32, seq as u32, input_ids.device())?
            .unsqueeze(0)?
            .broadcast_as((batch, seq))?
            .contiguous()?;
        let mut hidden = (self.token_embedding.forward(input_ids)?
            + self.position_embedding.forward(&position_ids)?)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &mask)?;
        }
        self.final_layer_norm.forward(&hidden)
    }

    /// Position of the end-of-text token in each row.
    ///
    /// With the legacy `eos_token_id == 2` the highest id wins (first on ties),
    /// otherwise the first occurrence of the eos id. Rows without eos pool
    /// position 0, as `argmax(ids == eos)` does in transformers.
    pub fn eos_positions(&self, input_ids: &Tensor) -> Result<Vec<usize>> {
        let eos = self.config.eos_token_id;
        let rows = input_ids.to_dtype(candle_core::DType::U32)?.to_vec2::<u32>()?;
        Ok(rows
            .iter()
            .map(|row| {
                if eos == 2 {
                    // reversed so ties resolve to the earliest position
                    row.iter()
                        .enumerate()
                        .rev()
                        .max_by_key(|(_, &id)| id)
                        .map_or(0, |(i, _)| i)
                } else {
                    row.iter()
                        .position(|&id| id == eos)
                        .unwrap_or(0)
                }
            })
            .collect())
    }

    /// Hidden state at the eos position, projected when the checkpoint has a projection.
    pub fn pool(&self, input_ids: &Tensor, hidden: &Tensor) -> Result<Tensor> {
        let positions = self.eos_positions(input_ids)?;
        let rows = positions
            .iter()
            .enumerate()
            .map(|(b, &p)| hidden.i((b, p)))
            .collect::<candle_core::Result<Vec<_>>>()?;
        let pooled = Tensor::stack(&rows, 0)?;
        match &self.text_projection {
            Some(projection) => projection.forward(&pooled),
            None => Ok(pooled),
        }
    }

    /// Model configuration.
    pub fn config(&self) -> &ClipTextConfig {
        &self.config
    }

    /// Hidden size.
    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    /// Width of pooled vectors.
    pub fn output_size(&self) -> usize {
        self.text_projection
            .as_ref()
            .map_or(self.config.hidden_size, Linear::out_features)
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
