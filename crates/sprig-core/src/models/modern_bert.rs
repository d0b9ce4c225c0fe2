//! ModernBERT encoder.
//!
//! Pre-norm layers with a fused `Wqkv` projection, rotary positions and a
//! GeGLU feed-forward. Every `global_attn_every_n_layers`-th layer (counting
//! from 0) attends over the whole sequence; the rest use a sliding window
//! of `local_attention` tokens and the local RoPE base.

use super::attention::{QkvProjection, SelfAttention};
use super::config::ModernBertConfig;
use super::mlp::GatedMlp;
use crate::error::Result;
use crate::nn::{sliding_window_masks, Activation, Embedding, LayerNorm, RotaryEmbedding};
use crate::weights::WeightBinder;
use candle_core::{DType, Device, Tensor};

/// One pre-norm encoder layer.
#[derive(Debug, Clone)]
struct ModernBertLayer {
    /// Absent on layer 0, which feeds the embedding norm output straight in.
    attention_norm: Option<LayerNorm>,
    attention: SelfAttention,
    mlp_norm: LayerNorm,
    mlp: GatedMlp,
    is_local: bool,
}

impl ModernBertLayer {
    fn load(
        binder: &WeightBinder<'_>,
        index: usize,
        config: &ModernBertConfig,
        activation: Activation,
        rotary: RotaryEmbedding,
    ) -> Result<Self> {
        let eps = config.norm_eps;
        let is_local = config.is_local_layer(index);
        let head_dim = config.head_dim();

        let attention_norm = if index == 0 {
            None
        } else {
            Some(binder.layer_norm("attn_norm", eps, config.norm_bias)?)
        };

        let attn = binder.pp("attn");
        let attention = SelfAttention::new(
            QkvProjection::Fused(attn.linear("Wqkv", config.attention_bias)?),
            attn.linear("Wo", config.attention_bias)?,
            Some(rotary),
            config.num_attention_heads,
            head_dim,
        )?;

        let mlp = binder.pp("mlp");
        let mlp = GatedMlp::new(
            mlp.linear("Wi", config.mlp_bias)?,
            mlp.linear("Wo", config.mlp_bias)?,
            activation,
        )?;

        Ok(Self {
            attention_norm,
            attention,
            mlp_norm: binder.layer_norm("mlp_norm", eps, config.norm_bias)?,
            mlp,
            is_local,
        })
    }

    fn forward(&self, hidden: &Tensor, global: &Tensor, local: &Tensor) -> Result<Tensor> {
        let normed = match &self.attention_norm {
            Some(norm) => norm.forward(hidden)?,
            None => hidden.clone(),
        };
        let mask = if self.is_local { local } else { global };
        let hidden = (self.attention.forward(&normed, Some(mask))? + hidden)?;
        let mlp_out = self.mlp.forward(&self.mlp_norm.forward(&hidden)?)?;
        Ok((mlp_out + hidden)?)
    }
}

/// ModernBERT encoder.
#[derive(Debug, Clone)]
pub struct ModernBert {
    config: ModernBertConfig,
    tok_embeddings: Embedding,
    embedding_norm: LayerNorm,
    layers: Vec<ModernBertLayer>,
    final_norm: LayerNorm,
    device: Device,
}

impl ModernBert {
    /// Bind every weight of the graph.
    pub fn load(binder: &WeightBinder<'_>, config: ModernBertConfig) -> Result<Self> {
        config.validate()?;
        let activation = Activation::from_name(&config.hidden_activation)?;
        let eps = config.norm_eps;

        let embeddings = binder.pp("embeddings");
        let tok_embeddings = embeddings.embedding("tok_embeddings")?;
        let embedding_norm = embeddings.layer_norm("norm", eps, config.norm_bias)?;

        // Cached tables are shared by every layer with the same base
        let rope = |theta: f64| {
            RotaryEmbedding::new(
                config.head_dim(),
                theta,
                config.max_position_embeddings,
                binder.device(),
            )
        };
        let global_rope = rope(config.global_rope_theta)?;
        let local_rope = rope(config.local_rope_theta)?;

        let layer_root = binder.pp("layers");
        let layers = (0..config.num_hidden_layers)
            .map(|i| {
                let rotary = if config.is_local_layer(i) {
                    local_rope.clone()
                } else {
                    global_rope.clone()
                };
                ModernBertLayer::load(&layer_root.pp(i), i, &config, activation, rotary)
            })
            .collect::<Result<Vec<_>>>()?;

        let final_norm = binder.layer_norm("final_norm", eps, config.norm_bias)?;

        tracing::info!(
            layers = layers.len(),
            hidden = config.hidden_size,
            local_layers = layers.iter().filter(|l| l.is_local).count(),
            window = config.local_attention,
            "bound modernbert encoder"
        );

        Ok(Self {
            config,
            tok_embeddings,
            embedding_norm,
            layers,
            final_norm,
            device: binder.device().clone(),
        })
    }

    /// Last hidden state `[batch, seq, hidden]`.
    ///
    /// Without a mask every position is treated as a real token. Both masks
    /// are rebuilt from the mask on every call.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: Option<&Tensor>) -> Result<Tensor> {
        let (batch, seq) = input_ids.dims2()?;
        let mask = match attention_mask {
            Some(m) => m.clone(),
            None => Tensor::ones((batch, seq), DType::F32, input_ids.device())?,
        };
        let (global, local) = sliding_window_masks(&mask, self.config.local_attention)?;

        let mut hidden = self
            .embedding_norm
            .forward(&self.tok_embeddings.forward(input_ids)?)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, &global, &local)?;
        }
        self.final_norm.forward(&hidden)
    }

    /// Model configuration.
    pub fn config(&self) -> &ModernBertConfig {
        &self.config
    }

    /// Hidden size.
    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    /// Number of layers using sliding-window attention.
    pub fn num_local_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_local).count()
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
