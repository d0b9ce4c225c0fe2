//! NomicBERT encoder.
//!
//! Fused `Wqkv` attention with (partial) rotary positions and a SwiGLU
//! feed-forward. Blocks are post-norm by default; `prenorm` in the config
//! switches the residual ordering.
//!
//! Gate/up weights come either fused (`mlp.gate_up_proj`) or split as
//! `mlp.fc11` (up) and `mlp.fc12` (gate). Split weights are concatenated
//! as `[fc12, fc11]` so the gate lands in the activated first half.

use super::attention::{QkvProjection, SelfAttention};
use super::config::NomicBertConfig;
use super::mlp::GatedMlp;
use crate::error::Result;
use crate::nn::{
    extended_attention_mask, Activation, Embedding, LayerNorm, Linear, RotaryEmbedding,
    BERT_MASK_VALUE,
};
use crate::weights::{fallback_on_missing, WeightBinder};
use candle_core::{DType, Device, Tensor};

/// Word + token type (+ absolute position) embeddings.
#[derive(Debug, Clone)]
struct NomicEmbeddings {
    word: Embedding,
    token_type: Embedding,
    /// Only present when rotary positions are disabled.
    position: Option<Embedding>,
}

impl NomicEmbeddings {
    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = input_ids.dims2()?;
        let token_type_ids = Tensor::zeros((batch, seq), DType::U32, input_ids.device())?;
        let mut embeddings =
            (self.word.forward(input_ids)? + self.token_type.forward(&token_type_ids)?)?;
        if let Some(position) = &self.position {
            let position_ids = Tensor::arange(0u32, seq as u32, input_ids.device())?
                .unsqueeze(0)?
                .broadcast_as((batch, seq))?
                .contiguous()?;
            embeddings = (embeddings + position.forward(&position_ids)?)?;
        }
        Ok(embeddings)
    }
}

/// One encoder block.
#[derive(Debug, Clone)]
struct NomicBlock {
    attention: SelfAttention,
    norm1: LayerNorm,
    mlp: GatedMlp,
    norm2: LayerNorm,
    prenorm: bool,
}

impl NomicBlock {
    fn load(
        binder: &WeightBinder<'_>,
        config: &NomicBertConfig,
        rotary: Option<RotaryEmbedding>,
    ) -> Result<Self> {
        let eps = config.layer_norm_epsilon;
        let attn = binder.pp("attn");
        let attention = SelfAttention::new(
            QkvProjection::Fused(attn.linear("Wqkv", config.qkv_proj_bias)?),
            attn.linear("out_proj", config.qkv_proj_bias)?,
            rotary,
            config.n_head,
            config.head_dim(),
        )?;

        Ok(Self {
            attention,
            norm1: binder.layer_norm("norm1", eps, true)?,
            mlp: Self::load_mlp(&binder.pp("mlp"), config)?,
            norm2: binder.layer_norm("norm2", eps, true)?,
            prenorm: config.prenorm,
        })
    }

    fn load_mlp(mlp: &WeightBinder<'_>, config: &NomicBertConfig) -> Result<GatedMlp> {
        let gate_up = fallback_on_missing(
            mlp.pp("gate_up_proj").get("weight").and_then(|weight| {
                let bias = if config.mlp_fc1_bias {
                    mlp.pp("gate_up_proj").get_optional("bias")
                } else {
                    None
                };
                Linear::new(weight, bias)
            }),
            || {
                let fc11 = mlp.pp("fc11").get("weight")?;
                let fc12 = mlp.pp("fc12").get("weight")?;
                tracing::debug!(key = %mlp.key("fc12.weight"), "concatenating split gate/up weights");
                let bias = if config.mlp_fc1_bias {
                    match (mlp.pp("fc12").get_optional("bias"), mlp.pp("fc11").get_optional("bias")) {
                        (Some(b12), Some(b11)) => Some(Tensor::cat(&[b12, b11], 0)?),
                        _ => None,
                    }
                } else {
                    None
                };
                Linear::new(Tensor::cat(&[fc12, fc11], 0)?, bias)
            },
        )?;

        let down_weight = mlp.get_first(&["down_proj.weight", "fc2.weight"])?;
        let down_bias = if config.mlp_fc2_bias {
            Some(mlp.get_first(&["down_proj.bias", "fc2.bias"])?)
        } else {
            None
        };
        GatedMlp::new(gate_up, Linear::new(down_weight, down_bias)?, Activation::Silu)
    }

    fn forward(&self, hidden: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        if self.prenorm {
            let attended = self.attention.forward(&self.norm1.forward(hidden)?, mask)?;
            let hidden = (hidden + attended)?;
            let mlp_out = self.mlp.forward(&self.norm2.forward(&hidden)?)?;
            Ok((hidden + mlp_out)?)
        } else {
            let attended = self.attention.forward(hidden, mask)?;
            let hidden = self.norm1.forward(&(hidden + attended)?)?;
            let mlp_out = self.mlp.forward(&hidden)?;
            self.norm2.forward(&(hidden + mlp_out)?)
        }
    }
}

/// NomicBERT encoder.
#[derive(Debug, Clone)]
pub struct NomicBert {
    config: NomicBertConfig,
    embeddings: NomicEmbeddings,
    embedding_norm: LayerNorm,
    layers: Vec<NomicBlock>,
    device: Device,
}

impl NomicBert {
    /// Bind every weight of the graph. Unsupported configs fail before any lookup.
    pub fn load(binder: &WeightBinder<'_>, config: NomicBertConfig) -> Result<Self> {
        config.validate()?;

        let emb = binder.pp("embeddings");
        let embeddings = NomicEmbeddings {
            word: emb.embedding("word_embeddings")?,
            token_type: emb.embedding("token_type_embeddings")?,
            position: if config.rotary_emb_fraction <= 0.0 {
                Some(emb.embedding("position_embeddings")?)
            } else {
                None
            },
        };
        let embedding_norm = binder.layer_norm("emb_ln", config.layer_norm_epsilon, true)?;

        let rotary_dims = config.rotary_dims();
        let rotary = if rotary_dims > 0 {
            Some(RotaryEmbedding::new(
                rotary_dims,
                config.rotary_emb_base,
                config.n_positions,
                binder.device(),
            )?)
        } else {
            None
        };

        let layer_root = binder.pp("encoder").pp("layers");
        let layers = (0..config.n_layer)
            .map(|i| NomicBlock::load(&layer_root.pp(i), &config, rotary.clone()))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            layers = layers.len(),
            hidden = config.n_embd,
            rotary_dims,
            prenorm = config.prenorm,
            "bound nomic_bert encoder"
        );

        Ok(Self {
            config,
            embeddings,
            embedding_norm,
            layers,
            device: binder.device().clone(),
        })
    }

    /// Last hidden state `[batch, seq, hidden]`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: Option<&Tensor>) -> Result<Tensor> {
        let mask = attention_mask
            .map(|m| extended_attention_mask(m, BERT_MASK_VALUE))
            .transpose()?;

        let mut hidden = self
            .embedding_norm
            .forward(&self.embeddings.forward(input_ids)?)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, mask.as_ref())?;
        }
        Ok(hidden)
    }

    /// Model configuration.
    pub fn config(&self) -> &NomicBertConfig {
        &self.config
    }

    /// Hidden size.
    pub fn hidden_size(&self) -> usize {
        self.config.n_embd
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}
