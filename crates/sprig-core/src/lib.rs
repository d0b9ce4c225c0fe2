//! # Sprig Core
//!
//! On-device inference for text embedding models.
//!
//! This crate provides:
//! - **Kernels** (`nn`): linear, layer norm, embedding lookup, RoPE, scaled
//!   dot-product attention, activations, pooling and distances
//! - **Weight binding** (`weights`): safetensors store plus key remapping
//! - **Architecture graphs** (`models`): BERT, RoBERTa, XLM-RoBERTa,
//!   ModernBERT, NomicBERT, the CLIP text tower, Model2Vec, Word2Vec and
//!   static embeddings
//! - **Encoding** (`bundle`, `tokenizer`): text in, vectors out, with
//!   batch padding that matches single-text encoding

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod bundle;
pub mod error;
pub mod models;
pub mod nn;
pub mod parity;
pub mod tokenizer;
pub mod weights;

#[cfg(test)]
mod test_support;

pub use error::{EmbedError, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bundle::{ModelBundle, PostProcess};
    pub use crate::error::{EmbedError, Result};
    pub use crate::models::{Architecture, Model};
    pub use crate::tokenizer::{BatchTokenizeResult, HfTokenizer, TextTokenizer};
    pub use crate::weights::{KeyTransform, LoadConfig, WeightBinder, WeightStore};
}
