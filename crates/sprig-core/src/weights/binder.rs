//! Binding logical parameter names to stored tensors.
//!
//! Architectures ask for weights by their canonical HuggingFace name
//! (`encoder.layer.0.attention.self.query.weight`). A [`KeyTransform`]
//! maps that name onto the key a particular checkpoint actually uses
//! before the lookup in the [`WeightStore`].

use super::WeightStore;
use crate::error::{EmbedError, Result};
use crate::nn::{Embedding, LayerNorm, Linear};
use candle_core::{DType, Device, Tensor};
use std::fmt;
use std::sync::Arc;

/// Maps a logical weight key to a checkpoint key.
#[derive(Clone, Default)]
pub enum KeyTransform {
    /// Use keys unchanged.
    #[default]
    Identity,
    /// Prepend a fixed prefix, e.g. `roberta.` or `model.`.
    AddPrefix(String),
    /// Original Google BERT checkpoints: `bert.` prefix and
    /// `LayerNorm.gamma` / `LayerNorm.beta` instead of `weight` / `bias`.
    GoogleBert,
    /// Arbitrary mapping.
    Custom(Arc<dyn Fn(&str) -> String + Send + Sync>),
}

impl KeyTransform {
    /// Wrap a closure.
    pub fn custom(f: impl Fn(&str) -> String + Send + Sync + 'static) -> Self {
        Self::Custom(Arc::new(f))
    }

    /// Apply the transform.
    pub fn apply(&self, key: &str) -> String {
        match self {
            Self::Identity => key.to_string(),
            Self::AddPrefix(prefix) => format!("{}{}", prefix, key),
            Self::GoogleBert => {
                let key = key
                    .replace("LayerNorm.weight", "LayerNorm.gamma")
                    .replace("LayerNorm.bias", "LayerNorm.beta");
                format!("bert.{}", key)
            }
            Self::Custom(f) => f(key),
        }
    }
}

impl fmt::Debug for KeyTransform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => f.write_str("Identity"),
            Self::AddPrefix(p) => f.debug_tuple("AddPrefix").field(p).finish(),
            Self::GoogleBert => f.write_str("GoogleBert"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// File names and key transform used when loading a model directory.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Weights file, relative to the model directory.
    pub weights_file_name: String,
    /// Config file, relative to the model directory.
    pub config_file_name: String,
    /// Tokenizer file, relative to the model directory.
    pub tokenizer_file_name: String,
    /// Applied to every logical weight key.
    pub key_transform: KeyTransform,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            weights_file_name: "model.safetensors".to_string(),
            config_file_name: "config.json".to_string(),
            tokenizer_file_name: "tokenizer.json".to_string(),
            key_transform: KeyTransform::Identity,
        }
    }
}

impl LoadConfig {
    /// Checkpoints saved from a task head wrapper (`roberta.`, `model.`).
    pub fn add_weight_key_prefix(prefix: impl Into<String>) -> Self {
        Self {
            key_transform: KeyTransform::AddPrefix(prefix.into()),
            ..Default::default()
        }
    }

    /// `google-bert/*` checkpoints.
    pub fn google_bert() -> Self {
        Self {
            key_transform: KeyTransform::GoogleBert,
            ..Default::default()
        }
    }

    /// sentence-transformers static embedding repos.
    pub fn static_embeddings() -> Self {
        Self {
            weights_file_name: "0_StaticEmbedding/model.safetensors".to_string(),
            tokenizer_file_name: "0_StaticEmbedding/tokenizer.json".to_string(),
            ..Default::default()
        }
    }

    /// Replace the key transform.
    pub fn with_key_transform(mut self, transform: KeyTransform) -> Self {
        self.key_transform = transform;
        self
    }
}

/// Run `fallback` only when `first` failed with [`EmbedError::MissingWeight`].
///
/// Any other error is returned as-is.
pub fn fallback_on_missing<T>(first: Result<T>, fallback: impl FnOnce() -> Result<T>) -> Result<T> {
    match first {
        Err(e) if e.is_missing_weight() => fallback(),
        other => other,
    }
}

/// Resolves weights under a key prefix.
#[derive(Debug, Clone)]
pub struct WeightBinder<'a> {
    store: &'a WeightStore,
    transform: &'a KeyTransform,
    prefix: String,
}

impl<'a> WeightBinder<'a> {
    /// Root binder over a store.
    pub fn new(store: &'a WeightStore, transform: &'a KeyTransform) -> Self {
        Self {
            store,
            transform,
            prefix: String::new(),
        }
    }

    /// Binder for a nested scope: `pp("encoder").pp(3)` resolves `encoder.3.*`.
    pub fn pp(&self, segment: impl fmt::Display) -> Self {
        Self {
            store: self.store,
            transform: self.transform,
            prefix: self.logical(&segment.to_string()),
        }
    }

    fn logical(&self, name: &str) -> String {
        if self.prefix.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", self.prefix, name)
        }
    }

    /// Checkpoint key a logical name resolves to.
    pub fn key(&self, name: &str) -> String {
        self.transform.apply(&self.logical(name))
    }

    /// Device of the underlying store.
    pub fn device(&self) -> &Device {
        self.store.device()
    }

    /// Whether a weight is present.
    pub fn contains(&self, name: &str) -> bool {
        self.store.contains(&self.key(name))
    }

    /// Resolve a required weight.
    pub fn get(&self, name: &str) -> Result<Tensor> {
        let key = self.key(name);
        self.store.get(&key).cloned().ok_or_else(|| {
            let logical = self.logical(name);
            if logical == key {
                EmbedError::MissingWeight(key)
            } else {
                EmbedError::MissingWeight(format!("{} (from {})", key, logical))
            }
        })
    }

    /// Resolve a weight that a checkpoint may omit.
    pub fn get_optional(&self, name: &str) -> Option<Tensor> {
        self.store.get(&self.key(name)).cloned()
    }

    /// Resolve the first candidate present, in order.
    pub fn get_first(&self, candidates: &[&str]) -> Result<Tensor> {
        for (i, name) in candidates.iter().enumerate() {
            match self.get(name) {
                Ok(t) => {
                    if i > 0 {
                        tracing::debug!(key = %self.key(name), "resolved fallback weight");
                    }
                    return Ok(t);
                }
                Err(e) if e.is_missing_weight() => continue,
                Err(e) => return Err(e),
            }
        }
        let tried: Vec<String> = candidates.iter().map(|n| self.key(n)).collect();
        Err(EmbedError::MissingWeight(tried.join(" | ")))
    }

    /// Resolve a weight and check its shape.
    pub fn get_with_shape(&self, name: &str, shape: &[usize]) -> Result<Tensor> {
        let tensor = self.get(name)?;
        if tensor.dims() != shape {
            return Err(EmbedError::ShapeMismatch(format!(
                "{}: expected {:?}, got {:?}",
                self.key(name),
                shape,
                tensor.dims()
            )));
        }
        Ok(tensor)
    }

    /// `{name}.weight` and, when `bias`, a required `{name}.bias`.
    pub fn linear(&self, name: &str, bias: bool) -> Result<Linear> {
        let scope = self.pp(name);
        let weight = scope.get("weight")?;
        let bias = if bias { Some(scope.get("bias")?) } else { None };
        Linear::new(weight, bias)
    }

    /// `{name}.weight` with whatever bias the checkpoint carries.
    pub fn linear_optional_bias(&self, name: &str) -> Result<Linear> {
        let scope = self.pp(name);
        Linear::new(scope.get("weight")?, scope.get_optional("bias"))
    }

    /// `{name}.weight` / `{name}.bias`; a bias declared absent is zeros, not looked up.
    pub fn layer_norm(&self, name: &str, eps: f64, bias: bool) -> Result<LayerNorm> {
        let scope = self.pp(name);
        let weight = scope.get("weight")?;
        let bias = if bias {
            scope.get("bias")?
        } else {
            Tensor::zeros(weight.dims(), DType::F32, weight.device())?
        };
        LayerNorm::new(weight, bias, eps)
    }

    /// `{name}.weight` as an embedding table.
    pub fn embedding(&self, name: &str) -> Result<Embedding> {
        Embedding::new(self.pp(name).get("weight")?)
    }
}
