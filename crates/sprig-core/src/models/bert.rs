//! BERT, RoBERTa and XLM-RoBERTa encoders.
//!
//! The three share one graph: absolute position + token type embeddings,
//! post-norm layers with separate Q/K/V projections and a dense MLP. They
//! differ only in how position ids are derived:
//!
//! - BERT counts positions from zero
//! - RoBERTa / XLM-R offset positions from the padding id:
//!   `cumsum(ids != pad) * (ids != pad) + pad`

use super::attention::{QkvProjection, SelfAttention};
use super::config::{Architecture, BertConfig};
use super::mlp::Mlp;
use crate::error::{EmbedError, Result};
use crate::nn::{
    extended_attention_mask, first_token, Activation, Embedding, LayerNorm, Linear,
    BERT_MASK_VALUE,
};
use crate::weights::WeightBinder;
use candle_core::{DType, Device, Tensor};

/// How absolute position ids are derived from input ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionScheme {
    /// `0, 1, 2, ...` for every row.
    RunningIndex,
    /// Count of non-pad tokens so far, offset by the pad id.
    PaddingOffset {
        /// Padding token id.
        pad_token_id: u32,
    },
}

impl PositionScheme {
    /// Position ids for `[batch, seq]` input ids.
    pub fn position_ids(&self, input_ids: &Tensor) -> Result<Tensor> {
        let (batch, seq) = input_ids.dims2()?;
        let device = input_ids.device();
        match *self {
            Self::RunningIndex => Ok(Tensor::arange(0u32, seq as u32, device)?
                .unsqueeze(0)?
                .broadcast_as((batch, seq))?
                .contiguous()?),
            Self::PaddingOffset { pad_token_id } => {
                let pad = Tensor::full(pad_token_id, (batch, seq), device)?;
                let not_pad = input_ids.to_dtype(DType::U32)?.ne(&pad)?.to_dtype(DType::F32)?;
                let positions = (not_pad.cumsum(1)? * &not_pad)?;
                Ok(positions
                    .affine(1.0, pad_token_id as f64)?
                    .to_dtype(DType::U32)?)
            }
        }
    }
}

/// Word + position + token type embeddings followed by LayerNorm.
#[derive(Debug, Clone)]
struct BertEmbeddings {
    word: Embedding,
    position: Embedding,
    token_type: Embedding,
    norm: LayerNorm,
    positions: PositionScheme,
}

impl BertEmbeddings {
    fn load(binder: &WeightBinder<'_>, config: &BertConfig, positions: PositionScheme) -> Result<Self> {
        Ok(Self {
            word: binder.embedding("word_embeddings")?,
            position: binder.embedding("position_embeddings")?,
            token_type: binder.embedding("token_type_embeddings")?,
            norm: binder.layer_norm("LayerNorm", config.layer_norm_eps, true)?,
            positions,
        })
    }

    fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        let position_ids = self.positions.position_ids(input_ids)?;
        let token_type_ids = input_ids.zeros_like()?.to_dtype(DType::U32)?;

        let embeddings = (self.word.forward(input_ids)?
            + self.position.forward(&position_ids)?)?
            .add(&self.token_type.forward(&token_type_ids)?)?;
        self.norm.forward(&embeddings)
    }
}

/// One post-norm encoder layer.
#[derive(Debug, Clone)]
struct BertLayer {
    attention: SelfAttention,
    attention_norm: LayerNorm,
    mlp: Mlp,
    output_norm: LayerNorm,
}

impl BertLayer {
    fn load(binder: &WeightBinder<'_>, config: &BertConfig, activation: Activation) -> Result<Self> {
        let attn = binder.pp("attention");
        let qkv = attn.pp("self");
        let attention = SelfAttention::new(
            QkvProjection::Separate {
                query: qkv.linear("query", true)?,
                key: qkv.linear("key", true)?,
                value: qkv.linear("value", true)?,
            },
            attn.pp("output").linear("dense", true)?,
            None,
            config.num_attention_heads,
            config.head_dim(),
        )?;
        let attention_norm = attn
            .pp("output")
            .layer_norm("LayerNorm", config.layer_norm_eps, true)?;

        let mlp = Mlp::new(
            binder.pp("intermediate").linear("dense", true)?,
            binder.pp("output").linear("dense", true)?,
            activation,
        )?;
        let output_norm = binder
            .pp("output")
            .layer_norm("LayerNorm", config.layer_norm_eps, true)?;

        Ok(Self {
            attention,
            attention_norm,
            mlp,
            output_norm,
        })
    }

    fn forward(&self, hidden: &Tensor, mask: Option<&Tensor>) -> Result<Tensor> {
        let attended = self.attention.forward(hidden, mask)?;
        let hidden = self.attention_norm.forward(&(attended + hidden)?)?;
        let mlp_out = self.mlp.forward(&hidden)?;
        self.output_norm.forward(&(mlp_out + hidden)?)
    }
}

/// BERT-family encoder.
#[derive(Debug, Clone)]
pub struct Bert {
    architecture: Architecture,
    config: BertConfig,
    embeddings: BertEmbeddings,
    layers: Vec<BertLayer>,
    /// `pooler.dense`, when the checkpoint has one.
    pooler: Option<Linear>,
    device: Device,
}

impl Bert {
    /// Bind every weight of the graph.
    pub fn load(
        binder: &WeightBinder<'_>,
        config: BertConfig,
        architecture: Architecture,
    ) -> Result<Self> {
        config.validate()?;
        if config.position_embedding_type != "absolute" {
            return Err(EmbedError::UnsupportedConfiguration(format!(
                "position_embedding_type '{}'",
                config.position_embedding_type
            )));
        }
        let activation = Activation::from_name(&config.hidden_act)?;
        let positions = match architecture {
            Architecture::Bert => PositionScheme::RunningIndex,
            Architecture::Roberta | Architecture::XlmRoberta => PositionScheme::PaddingOffset {
                pad_token_id: config.pad_token_id,
            },
            other => {
                return Err(EmbedError::UnsupportedConfiguration(format!(
                    "{} is not a BERT-family architecture",
                    other
                )))
            }
        };

        let embeddings = BertEmbeddings::load(&binder.pp("embeddings"), &config, positions)?;
        let encoder = binder.pp("encoder").pp("layer");
        let layers = (0..config.num_hidden_layers)
            .map(|i| BertLayer::load(&encoder.pp(i), &config, activation))
            .collect::<Result<Vec<_>>>()?;

        let pooler = if binder.contains("pooler.dense.weight") {
            Some(binder.pp("pooler").linear_optional_bias("dense")?)
        } else {
            None
        };

        tracing::info!(
            %architecture,
            layers = layers.len(),
            hidden = config.hidden_size,
            pooler = pooler.is_some(),
            "bound encoder"
        );

        Ok(Self {
            architecture,
            config,
            embeddings,
            layers,
            pooler,
            device: binder.device().clone(),
        })
    }

    /// Last hidden state `[batch, seq, hidden]`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: Option<&Tensor>) -> Result<Tensor> {
        let mask = attention_mask
            .map(|m| extended_attention_mask(m, BERT_MASK_VALUE))
            .transpose()?;

        let mut hidden = self.embeddings.forward(input_ids)?;
        for layer in &self.layers {
            hidden = layer.forward(&hidden, mask.as_ref())?;
        }
        Ok(hidden)
    }

    /// `tanh(pooler.dense(hidden[:, 0]))`.
    pub fn pool(&self, hidden: &Tensor) -> Result<Tensor> {
        let pooler = self.pooler.as_ref().ok_or_else(|| {
            EmbedError::MissingWeight("pooler.dense.weight".to_string())
        })?;
        Ok(pooler.forward(&first_token(hidden)?)?.tanh()?)
    }

    /// Which member of the family this is.
    pub fn architecture(&self) -> Architecture {
        self.architecture
    }

    /// Model configuration.
    pub fn config(&self) -> &BertConfig {
        &self.config
    }

    /// Hidden size.
    pub fn hidden_size(&self) -> usize {
        self.config.hidden_size
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        &self.device
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tiny_bert_store, tiny_bert_config};
    use crate::weights::KeyTransform;

    #[test]
    fn running_index_positions() {
        let ids = Tensor::new(&[[5u32, 6, 7], [8, 0, 0]], &Device::Cpu).unwrap();
        let pos = PositionScheme::RunningIndex.position_ids(&ids).unwrap();
        assert_eq!(
            pos.to_vec2::<u32>().unwrap(),
            vec![vec![0, 1, 2], vec![0, 1, 2]]
        );
    }

    #[test]
    fn padding_offset_positions() {
        let ids = Tensor::new(&[[0u32, 9, 9, 2], [0, 9, 1, 1]], &Device::Cpu).unwrap();
        let scheme = PositionScheme::PaddingOffset { pad_token_id: 1 };
        let pos = scheme.position_ids(&ids).unwrap();
        assert_eq!(
            pos.to_vec2::<u32>().unwrap(),
            vec![vec![2, 3, 4, 5], vec![2, 3, 1, 1]]
        );
    }

    #[test]
    fn bert_forward_shape_and_pooler() {
        let config = tiny_bert_config(Architecture::Bert);
        let store = tiny_bert_store(&config, true, 7);
        let transform = KeyTransform::Identity;
        let model = Bert::load(
            &WeightBinder::new(&store, &transform),
            config,
            Architecture::Bert,
        )
        .unwrap();

        let ids = Tensor::new(&[[2u32, 5, 9, 3]], &Device::Cpu).unwrap();
        let hidden = model.forward(&ids, None).unwrap();
        assert_eq!(hidden.dims(), &[1, 4, model.hidden_size()]);

        let pooled = model.pool(&hidden).unwrap();
        assert_eq!(pooled.dims(), &[1, model.hidden_size()]);
        let values = pooled.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert!(values.iter().all(|v| v.abs() <= 1.0));
    }

    #[test]
    fn relative_positions_unsupported() {
        let mut config = tiny_bert_config(Architecture::Bert);
        let store = tiny_bert_store(&config, false, 7);
        config.position_embedding_type = "relative_key".to_string();
        let transform = KeyTransform::Identity;
        let result = Bert::load(
            &WeightBinder::new(&store, &transform),
            config,
            Architecture::Bert,
        );
        assert!(matches!(
            result,
            Err(EmbedError::UnsupportedConfiguration(_))
        ));
    }

    #[test]
    fn missing_layer_weight_is_reported() {
        let config = tiny_bert_config(Architecture::Roberta);
        let store = tiny_bert_store(&config, false, 7);
        let transform = KeyTransform::AddPrefix("roberta.".into());
        match Bert::load(
            &WeightBinder::new(&store, &transform),
            config,
            Architecture::Roberta,
        ) {
            Err(EmbedError::MissingWeight(key)) => assert!(key.starts_with("roberta.")),
            other => panic!("expected missing weight, got {:?}", other.map(|_| ())),
        }
    }
}
