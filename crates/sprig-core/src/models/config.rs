//! Model configuration.
//!
//! Each architecture decodes its HuggingFace `config.json`. Fields absent
//! from the document fall back to the published defaults of that
//! architecture, so a RoBERTa config without `layer_norm_eps` still gets
//! RoBERTa's 1e-5 rather than BERT's 1e-12.

use crate::error::{EmbedError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::Path;

/// Supported model families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Architecture {
    /// BERT.
    Bert,
    /// RoBERTa.
    Roberta,
    /// XLM-RoBERTa.
    XlmRoberta,
    /// ModernBERT.
    ModernBert,
    /// NomicBERT.
    NomicBert,
    /// CLIP text tower.
    Clip,
    /// Model2Vec static model.
    Model2Vec,
    /// Word vectors (GloVe / word2vec text format).
    Word2Vec,
    /// sentence-transformers static embeddings.
    StaticEmbeddings,
}

impl Architecture {
    /// Map a `model_type` string from `config.json`.
    pub fn from_model_type(model_type: &str) -> Option<Self> {
        match model_type {
            "bert" => Some(Self::Bert),
            "roberta" => Some(Self::Roberta),
            "xlm-roberta" | "xlm_roberta" => Some(Self::XlmRoberta),
            "modernbert" => Some(Self::ModernBert),
            "nomic_bert" => Some(Self::NomicBert),
            "clip" | "clip_text_model" => Some(Self::Clip),
            "model2vec" => Some(Self::Model2Vec),
            _ => None,
        }
    }

    /// Whether the model is a transformer over token sequences.
    pub fn is_sequence_model(&self) -> bool {
        !matches!(
            self,
            Self::Model2Vec | Self::Word2Vec | Self::StaticEmbeddings
        )
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Bert => "bert",
            Self::Roberta => "roberta",
            Self::XlmRoberta => "xlm-roberta",
            Self::ModernBert => "modernbert",
            Self::NomicBert => "nomic_bert",
            Self::Clip => "clip",
            Self::Model2Vec => "model2vec",
            Self::Word2Vec => "word2vec",
            Self::StaticEmbeddings => "static_embeddings",
        };
        f.write_str(name)
    }
}

/// Overlay a decoded JSON object on serialized defaults.
fn merge_defaults<T: Serialize + DeserializeOwned>(defaults: &T, doc: Value) -> Result<T> {
    let mut base = serde_json::to_value(defaults)?;
    match (&mut base, doc) {
        (Value::Object(base), Value::Object(doc)) => {
            for (key, value) in doc {
                // JSON null means "not set" in HF configs
                if !value.is_null() {
                    base.insert(key, value);
                }
            }
        }
        (_, other) => {
            return Err(EmbedError::InvalidInput(format!(
                "config must be a JSON object, got {}",
                other
            )))
        }
    }
    Ok(serde_json::from_value(base)?)
}

/// Heads must be non-zero and divide the hidden width.
fn check_heads(family: &str, hidden_size: usize, heads: usize) -> Result<()> {
    if heads == 0 {
        return Err(EmbedError::UnsupportedConfiguration(format!(
            "{} with zero attention heads",
            family
        )));
    }
    if hidden_size % heads != 0 {
        return Err(EmbedError::UnsupportedConfiguration(format!(
            "{} hidden size {} not divisible by {} heads",
            family, hidden_size, heads
        )));
    }
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let contents = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// Read `model_type` from a config document.
pub fn model_type_of(path: &Path) -> Result<Option<String>> {
    let doc = read_json(path)?;
    Ok(doc
        .get("model_type")
        .and_then(Value::as_str)
        .map(str::to_string))
}

/// Configuration shared by BERT, RoBERTa and XLM-RoBERTa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BertConfig {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden dimension.
    pub hidden_size: usize,
    /// Number of layers.
    pub num_hidden_layers: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Intermediate dimension (FFN).
    pub intermediate_size: usize,
    /// Activation name.
    pub hidden_act: String,
    /// Absolute position table size.
    pub max_position_embeddings: usize,
    /// Token type table size.
    pub type_vocab_size: usize,
    /// Layer norm epsilon.
    pub layer_norm_eps: f64,
    /// Padding token id (RoBERTa positions are offset from it).
    pub pad_token_id: u32,
    /// Only `absolute` is supported.
    pub position_embedding_type: String,
    /// Model architecture type.
    pub model_type: String,
}

impl Default for BertConfig {
    fn default() -> Self {
        // bert-base-uncased
        Self {
            vocab_size: 30522,
            hidden_size: 768,
            num_hidden_layers: 12,
            num_attention_heads: 12,
            intermediate_size: 3072,
            hidden_act: "gelu".to_string(),
            max_position_embeddings: 512,
            type_vocab_size: 2,
            layer_norm_eps: 1e-12,
            pad_token_id: 0,
            position_embedding_type: "absolute".to_string(),
            model_type: "bert".to_string(),
        }
    }
}

impl BertConfig {
    /// roberta-base defaults.
    pub fn roberta() -> Self {
        Self {
            vocab_size: 50265,
            max_position_embeddings: 514,
            type_vocab_size: 1,
            layer_norm_eps: 1e-5,
            pad_token_id: 1,
            model_type: "roberta".to_string(),
            ..Default::default()
        }
    }

    /// xlm-roberta-base defaults.
    pub fn xlm_roberta() -> Self {
        Self {
            vocab_size: 250002,
            model_type: "xlm-roberta".to_string(),
            ..Self::roberta()
        }
    }

    /// Defaults for one of the BERT-family architectures.
    pub fn defaults_for(architecture: Architecture) -> Self {
        match architecture {
            Architecture::Roberta => Self::roberta(),
            Architecture::XlmRoberta => Self::xlm_roberta(),
            _ => Self::default(),
        }
    }

    /// Decode JSON over the defaults of `architecture`.
    pub fn from_json(json: &str, architecture: Architecture) -> Result<Self> {
        let config: Self =
            merge_defaults(&Self::defaults_for(architecture), serde_json::from_str(json)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file.
    pub fn from_file(path: &Path, architecture: Architecture) -> Result<Self> {
        let config: Self = merge_defaults(&Self::defaults_for(architecture), read_json(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail on shapes with no numeric path.
    pub fn validate(&self) -> Result<()> {
        check_heads(&self.model_type, self.hidden_size, self.num_attention_heads)
    }

    /// Calculate head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

/// ModernBERT configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModernBertConfig {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden dimension.
    pub hidden_size: usize,
    /// Intermediate dimension; `mlp.Wi` projects to twice this.
    pub intermediate_size: usize,
    /// Number of layers.
    pub num_hidden_layers: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Maximum sequence length.
    pub max_position_embeddings: usize,
    /// Layer norm epsilon.
    pub norm_eps: f64,
    /// Whether norms carry a bias.
    pub norm_bias: bool,
    /// Padding token id.
    pub pad_token_id: u32,
    /// RoPE base for global layers.
    pub global_rope_theta: f64,
    /// RoPE base for local layers.
    pub local_rope_theta: f64,
    /// Every n-th layer (starting at 0) attends globally.
    pub global_attn_every_n_layers: usize,
    /// Sliding window size for local layers.
    pub local_attention: usize,
    /// Whether attention projections carry a bias.
    pub attention_bias: bool,
    /// Whether MLP projections carry a bias.
    pub mlp_bias: bool,
    /// Activation name.
    pub hidden_activation: String,
    /// Model architecture type.
    pub model_type: String,
}

impl Default for ModernBertConfig {
    fn default() -> Self {
        // ModernBERT-base
        Self {
            vocab_size: 50368,
            hidden_size: 768,
            intermediate_size: 1152,
            num_hidden_layers: 22,
            num_attention_heads: 12,
            max_position_embeddings: 8192,
            norm_eps: 1e-5,
            norm_bias: false,
            pad_token_id: 50283,
            global_rope_theta: 160000.0,
            local_rope_theta: 10000.0,
            global_attn_every_n_layers: 3,
            local_attention: 128,
            attention_bias: false,
            mlp_bias: false,
            hidden_activation: "gelu".to_string(),
            model_type: "modernbert".to_string(),
        }
    }
}

impl ModernBertConfig {
    /// Decode JSON over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = merge_defaults(&Self::default(), serde_json::from_str(json)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = merge_defaults(&Self::default(), read_json(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail on shapes with no numeric path.
    pub fn validate(&self) -> Result<()> {
        check_heads("modernbert", self.hidden_size, self.num_attention_heads)?;
        if self.global_attn_every_n_layers == 0 {
            return Err(EmbedError::UnsupportedConfiguration(
                "modernbert with global_attn_every_n_layers = 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Calculate head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Whether layer `index` uses sliding-window attention.
    pub fn is_local_layer(&self, index: usize) -> bool {
        index % self.global_attn_every_n_layers != 0
    }
}

/// NomicBERT configuration (GPT-2 style field names).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NomicBertConfig {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden dimension.
    pub n_embd: usize,
    /// Number of attention heads.
    pub n_head: usize,
    /// Number of layers.
    pub n_layer: usize,
    /// Intermediate dimension; `4 * n_embd` when absent.
    pub n_inner: Option<usize>,
    /// Maximum sequence length.
    pub n_positions: usize,
    /// Token type table size.
    pub type_vocab_size: usize,
    /// Layer norm epsilon.
    pub layer_norm_epsilon: f64,
    /// RoPE base.
    pub rotary_emb_base: f64,
    /// Fraction of each head that is rotated; `<= 0` means absolute positions.
    pub rotary_emb_fraction: f64,
    /// Interleaved rotary layout (unsupported).
    pub rotary_emb_interleaved: bool,
    /// Bias on `Wqkv` and `out_proj`.
    pub qkv_proj_bias: bool,
    /// Bias on the gate/up projection.
    pub mlp_fc1_bias: bool,
    /// Bias on the down projection.
    pub mlp_fc2_bias: bool,
    /// Pre-norm blocks instead of post-norm.
    pub prenorm: bool,
    /// RMS norm (unsupported).
    pub use_rms_norm: bool,
    /// Activation; only `swiglu` is supported.
    pub activation_function: String,
    /// Padding token id.
    pub pad_token_id: Option<u32>,
    /// Model architecture type.
    pub model_type: String,
}

impl Default for NomicBertConfig {
    fn default() -> Self {
        Self {
            vocab_size: 30522,
            n_embd: 768,
            n_head: 12,
            n_layer: 12,
            n_inner: None,
            n_positions: 2048,
            type_vocab_size: 2,
            layer_norm_epsilon: 1e-12,
            rotary_emb_base: 10000.0,
            rotary_emb_fraction: 1.0,
            rotary_emb_interleaved: false,
            qkv_proj_bias: false,
            mlp_fc1_bias: false,
            mlp_fc2_bias: false,
            prenorm: false,
            use_rms_norm: false,
            activation_function: "swiglu".to_string(),
            pad_token_id: None,
            model_type: "nomic_bert".to_string(),
        }
    }
}

impl NomicBertConfig {
    /// Decode JSON over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = merge_defaults(&Self::default(), serde_json::from_str(json)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config: Self = merge_defaults(&Self::default(), read_json(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Intermediate dimension.
    pub fn intermediate_size(&self) -> usize {
        self.n_inner.unwrap_or(self.n_embd * 4)
    }

    /// Calculate head dimension.
    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// Rotated channels per head: `floor(head_dim * fraction)` rounded down to even.
    pub fn rotary_dims(&self) -> usize {
        let dims = (self.head_dim() as f64 * self.rotary_emb_fraction).max(0.0) as usize;
        (dims / 2) * 2
    }

    /// Fail on combinations with no numeric path.
    pub fn validate(&self) -> Result<()> {
        check_heads("nomic_bert", self.n_embd, self.n_head)?;
        if self.use_rms_norm {
            return Err(EmbedError::UnsupportedConfiguration(
                "nomic_bert with use_rms_norm".to_string(),
            ));
        }
        if !self.activation_function.eq_ignore_ascii_case("swiglu") {
            return Err(EmbedError::UnsupportedConfiguration(format!(
                "nomic_bert activation '{}'",
                self.activation_function
            )));
        }
        if self.rotary_emb_interleaved {
            return Err(EmbedError::UnsupportedConfiguration(
                "nomic_bert with interleaved rotary embeddings".to_string(),
            ));
        }
        Ok(())
    }
}

/// CLIP text tower configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClipTextConfig {
    /// Vocabulary size.
    pub vocab_size: usize,
    /// Hidden dimension.
    pub hidden_size: usize,
    /// Intermediate dimension (FFN).
    pub intermediate_size: usize,
    /// Number of layers.
    pub num_hidden_layers: usize,
    /// Number of attention heads.
    pub num_attention_heads: usize,
    /// Maximum sequence length.
    pub max_position_embeddings: usize,
    /// Activation name.
    pub hidden_act: String,
    /// Layer norm epsilon.
    pub layer_norm_eps: f64,
    /// End-of-text token id; 2 selects the legacy argmax pooling.
    pub eos_token_id: u32,
    /// Output width of `text_projection`, when present.
    pub projection_dim: Option<usize>,
}

impl Default for ClipTextConfig {
    fn default() -> Self {
        // clip-vit-base-patch32 text tower
        Self {
            vocab_size: 49408,
            hidden_size: 512,
            intermediate_size: 2048,
            num_hidden_layers: 12,
            num_attention_heads: 8,
            max_position_embeddings: 77,
            hidden_act: "quick_gelu".to_string(),
            layer_norm_eps: 1e-5,
            eos_token_id: 2,
            projection_dim: None,
        }
    }
}

impl ClipTextConfig {
    fn from_value(doc: Value) -> Result<Self> {
        // Full CLIP configs nest the text tower and keep projection_dim at the top
        match doc {
            Value::Object(mut top) => match top.remove("text_config") {
                Some(Value::Object(mut text)) => {
                    if let Some(dim) = top.get("projection_dim") {
                        text.entry("projection_dim").or_insert(dim.clone());
                    }
                    merge_defaults(&Self::default(), Value::Object(text))
                }
                _ => merge_defaults(&Self::default(), Value::Object(top)),
            },
            other => merge_defaults(&Self::default(), other),
        }
    }

    /// Decode JSON over the defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config = Self::from_value(serde_json::from_str(json)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let config = Self::from_value(read_json(path)?)?;
        config.validate()?;
        Ok(config)
    }

    /// Fail on shapes with no numeric path.
    pub fn validate(&self) -> Result<()> {
        check_heads("clip", self.hidden_size, self.num_attention_heads)
    }

    /// Calculate head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }
}

/// Model2Vec configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Model2VecConfig {
    /// L2-normalize pooled vectors.
    #[serde(default)]
    pub normalize: Option<bool>,
}

impl Model2VecConfig {
    /// Load from JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roberta_defaults_survive_partial_config() {
        let cfg = BertConfig::from_json(
            r#"{"hidden_size": 64, "num_attention_heads": 4, "extra_field": true}"#,
            Architecture::Roberta,
        )
        .unwrap();
        assert_eq!(cfg.hidden_size, 64);
        assert_eq!(cfg.head_dim(), 16);
        assert_eq!(cfg.layer_norm_eps, 1e-5);
        assert_eq!(cfg.pad_token_id, 1);
        assert_eq!(cfg.type_vocab_size, 1);
    }

    #[test]
    fn bert_defaults() {
        let cfg = BertConfig::from_json("{}", Architecture::Bert).unwrap();
        assert_eq!(cfg.layer_norm_eps, 1e-12);
        assert_eq!(cfg.vocab_size, 30522);
        assert_eq!(cfg.hidden_act, "gelu");
    }

    #[test]
    fn null_fields_fall_back() {
        let cfg = ModernBertConfig::from_json(r#"{"local_attention": null, "norm_bias": true}"#)
            .unwrap();
        assert_eq!(cfg.local_attention, 128);
        assert!(cfg.norm_bias);
    }

    #[test]
    fn modern_bert_local_layers() {
        let cfg = ModernBertConfig::default();
        let local: Vec<bool> = (0..6).map(|i| cfg.is_local_layer(i)).collect();
        assert_eq!(local, vec![false, true, true, false, true, true]);
    }

    #[test]
    fn nomic_derived_values() {
        let cfg = NomicBertConfig::from_json(
            r#"{"n_embd": 96, "n_head": 4, "rotary_emb_fraction": 0.5}"#,
        )
        .unwrap();
        assert_eq!(cfg.head_dim(), 24);
        assert_eq!(cfg.rotary_dims(), 12);
        assert_eq!(cfg.intermediate_size(), 384);

        let odd = NomicBertConfig {
            n_embd: 60,
            n_head: 4,
            rotary_emb_fraction: 0.5,
            ..Default::default()
        };
        // floor(15 * 0.5) = 7, rounded down to 6
        assert_eq!(odd.rotary_dims(), 6);
    }

    #[test]
    fn nomic_unsupported_combinations() {
        for json in [
            r#"{"use_rms_norm": true}"#,
            r#"{"activation_function": "gelu"}"#,
            r#"{"rotary_emb_interleaved": true}"#,
            r#"{"n_head": 0}"#,
            r#"{"n_embd": 100, "n_head": 12}"#,
        ] {
            assert!(
                matches!(
                    NomicBertConfig::from_json(json),
                    Err(EmbedError::UnsupportedConfiguration(_))
                ),
                "{}",
                json
            );
        }
        assert!(NomicBertConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_heads_rejected() {
        let unsupported = |r: Result<()>| matches!(r, Err(EmbedError::UnsupportedConfiguration(_)));

        let bert = BertConfig::from_json(r#"{"num_attention_heads": 0}"#, Architecture::Bert);
        assert!(unsupported(bert.map(|_| ())));
        let modern = ModernBertConfig::from_json(r#"{"num_attention_heads": 0}"#);
        assert!(unsupported(modern.map(|_| ())));
        let clip = ClipTextConfig::from_json(r#"{"text_config": {"num_attention_heads": 0}}"#);
        assert!(unsupported(clip.map(|_| ())));
    }

    #[test]
    fn indivisible_hidden_size_rejected() {
        let unsupported = |r: Result<()>| matches!(r, Err(EmbedError::UnsupportedConfiguration(_)));

        let bert = BertConfig::from_json(
            r#"{"hidden_size": 100, "num_attention_heads": 12}"#,
            Architecture::Roberta,
        );
        assert!(unsupported(bert.map(|_| ())));
        let modern = ModernBertConfig::from_json(r#"{"hidden_size": 770}"#);
        assert!(unsupported(modern.map(|_| ())));
        let clip = ClipTextConfig::from_json(r#"{"hidden_size": 500}"#);
        assert!(unsupported(clip.map(|_| ())));
    }

    #[test]
    fn global_every_zero_layers_rejected() {
        assert!(matches!(
            ModernBertConfig::from_json(r#"{"global_attn_every_n_layers": 0}"#),
            Err(EmbedError::UnsupportedConfiguration(_))
        ));
        let built = ModernBertConfig {
            global_attn_every_n_layers: 0,
            ..Default::default()
        };
        assert!(built.validate().is_err());
    }

    #[test]
    fn clip_nested_text_config() {
        let cfg = ClipTextConfig::from_json(
            r#"{"projection_dim": 256, "text_config": {"hidden_size": 128, "eos_token_id": 49407}}"#,
        )
        .unwrap();
        assert_eq!(cfg.hidden_size, 128);
        assert_eq!(cfg.eos_token_id, 49407);
        assert_eq!(cfg.projection_dim, Some(256));
        assert_eq!(cfg.max_position_embeddings, 77);
    }

    #[test]
    fn architecture_names() {
        assert_eq!(
            Architecture::from_model_type("xlm-roberta"),
            Some(Architecture::XlmRoberta)
        );
        assert_eq!(Architecture::from_model_type("llama"), None);
        assert!(!Architecture::Model2Vec.is_sequence_model());
        assert_eq!(Architecture::NomicBert.to_string(), "nomic_bert");
    }

    #[test]
    fn config_must_be_object() {
        assert!(ModernBertConfig::from_json("[1, 2]").is_err());
    }
}
