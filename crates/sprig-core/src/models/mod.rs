//! Architecture graphs.
//!
//! Each family is an independent struct composed from the [`crate::nn`]
//! kernels; [`Model`] is the closed set the bundle dispatches over.

mod attention;
mod bert;
mod clip;
mod config;
mod mlp;
mod modern_bert;
mod nomic_bert;
mod static_embed;
mod word2vec;

pub use attention::{QkvProjection, SelfAttention};
pub use bert::{Bert, PositionScheme};
pub use clip::ClipText;
pub use config::{
    model_type_of, Architecture, BertConfig, ClipTextConfig, Model2VecConfig, ModernBertConfig,
    NomicBertConfig,
};
pub use mlp::{GatedMlp, Mlp};
pub use modern_bert::ModernBert;
pub use nomic_bert::NomicBert;
pub use static_embed::{Model2Vec, StaticEmbeddings};
pub use word2vec::{Word2Vec, Word2VecTokenizer};

use crate::error::{EmbedError, Result};
use candle_core::{Device, Tensor};

/// Any supported model.
#[derive(Debug, Clone)]
pub enum Model {
    /// BERT, RoBERTa or XLM-RoBERTa.
    Bert(Bert),
    /// ModernBERT.
    ModernBert(ModernBert),
    /// NomicBERT.
    NomicBert(NomicBert),
    /// CLIP text tower.
    Clip(ClipText),
    /// Model2Vec table.
    Model2Vec(Model2Vec),
    /// Word vectors.
    Word2Vec(Word2Vec),
    /// sentence-transformers static table.
    StaticEmbeddings(StaticEmbeddings),
}

impl Model {
    /// Architecture tag.
    pub fn architecture(&self) -> Architecture {
        match self {
            Model::Bert(m) => m.architecture(),
            Model::ModernBert(_) => Architecture::ModernBert,
            Model::NomicBert(_) => Architecture::NomicBert,
            Model::Clip(_) => Architecture::Clip,
            Model::Model2Vec(_) => Architecture::Model2Vec,
            Model::Word2Vec(_) => Architecture::Word2Vec,
            Model::StaticEmbeddings(_) => Architecture::StaticEmbeddings,
        }
    }

    /// Forward pass over `[batch, seq]` ids.
    ///
    /// Sequence models return their last hidden state; table models return
    /// the gathered token vectors. Either way `[batch, seq, hidden]`.
    pub fn forward(&self, input_ids: &Tensor, attention_mask: Option<&Tensor>) -> Result<Tensor> {
        if input_ids.rank() != 2 {
            return Err(EmbedError::ShapeMismatch(format!(
                "input ids must be [batch, seq], got {:?}",
                input_ids.dims()
            )));
        }
        match self {
            Model::Bert(m) => m.forward(input_ids, attention_mask),
            Model::ModernBert(m) => m.forward(input_ids, attention_mask),
            Model::NomicBert(m) => m.forward(input_ids, attention_mask),
            Model::Clip(m) => m.forward(input_ids, attention_mask),
            Model::Model2Vec(m) => m.forward(input_ids),
            Model::Word2Vec(m) => m.forward(input_ids),
            Model::StaticEmbeddings(m) => m.forward(input_ids),
        }
    }

    /// Width of the forward output.
    pub fn hidden_size(&self) -> usize {
        match self {
            Model::Bert(m) => m.hidden_size(),
            Model::ModernBert(m) => m.hidden_size(),
            Model::NomicBert(m) => m.hidden_size(),
            Model::Clip(m) => m.hidden_size(),
            Model::Model2Vec(m) => m.hidden_size(),
            Model::Word2Vec(m) => m.hidden_size(),
            Model::StaticEmbeddings(m) => m.hidden_size(),
        }
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        match self {
            Model::Bert(m) => m.device(),
            Model::ModernBert(m) => m.device(),
            Model::NomicBert(m) => m.device(),
            Model::Clip(m) => m.device(),
            Model::Model2Vec(m) => m.device(),
            Model::Word2Vec(m) => m.device(),
            Model::StaticEmbeddings(m) => m.device(),
        }
    }

    /// Id used to right-pad batches.
    pub fn pad_token_id(&self) -> u32 {
        match self {
            Model::Bert(m) => m.config().pad_token_id,
            Model::ModernBert(m) => m.config().pad_token_id,
            Model::NomicBert(m) => m.config().pad_token_id.unwrap_or(0),
            _ => 0,
        }
    }

    /// Whether tokenization should add the tokenizer's special tokens.
    pub fn add_special_tokens(&self) -> bool {
        !matches!(self, Model::Model2Vec(_) | Model::StaticEmbeddings(_))
    }

    /// Whether unknown-token ids are dropped before lookup.
    pub fn drops_unknown_tokens(&self) -> bool {
        matches!(self, Model::Model2Vec(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{tiny_model, ALL_ARCHITECTURES};

    #[test]
    fn every_architecture_forwards_to_hidden() {
        for &arch in ALL_ARCHITECTURES {
            let model = tiny_model(arch, 1);
            assert_eq!(model.architecture(), arch);
            let ids = Tensor::new(&[[2u32, 5, 6, 3], [2, 7, 3, 0]], &Device::Cpu).unwrap();
            let out = model.forward(&ids, None).unwrap();
            assert_eq!(out.dims(), &[2, 4, model.hidden_size()], "{}", arch);
        }
    }

    #[test]
    fn flat_ids_rejected() {
        let model = tiny_model(Architecture::Bert, 1);
        let ids = Tensor::new(&[2u32, 5, 6], &Device::Cpu).unwrap();
        assert!(matches!(
            model.forward(&ids, None),
            Err(EmbedError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn special_token_policy() {
        assert!(tiny_model(Architecture::Roberta, 1).add_special_tokens());
        assert!(!tiny_model(Architecture::Model2Vec, 1).add_special_tokens());
        assert!(tiny_model(Architecture::Model2Vec, 1).drops_unknown_tokens());
        assert!(!tiny_model(Architecture::StaticEmbeddings, 1).drops_unknown_tokens());
    }

    #[test]
    fn pad_ids_follow_config() {
        let roberta = tiny_model(Architecture::Roberta, 1);
        let Model::Bert(bert) = &roberta else {
            panic!("expected bert family");
        };
        assert_eq!(roberta.pad_token_id(), bert.config().pad_token_id);
        assert_eq!(tiny_model(Architecture::Clip, 1).pad_token_id(), 0);
    }
}
