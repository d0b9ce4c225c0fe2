//! # Sprig
//!
//! On-device inference for small transformer text embedding models.
//!
//! - **Architectures**: BERT, RoBERTa, XLM-RoBERTa, ModernBERT, NomicBERT,
//!   the CLIP text tower and static tables (Model2Vec, Word2Vec,
//!   sentence-transformers static embeddings)
//! - **Loading**: a HuggingFace model directory becomes a [`ModelBundle`]
//!   with [`BundleLoader`]
//! - **Batching**: padded batches produce the same vectors as single texts
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use sprig::prelude::*;
//!
//! fn main() -> anyhow::Result<()> {
//!     let bundle = BundleLoader::new("models/all-MiniLM-L6-v2").build()?;
//!     let vectors = bundle.batch_encode(
//!         &["first text", "second text"],
//!         bundle.model().pad_token_id(),
//!         Some(512),
//!         PostProcess::MeanPoolAndNormalize,
//!     )?;
//!     println!("{:?}", vectors.dims());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

// Re-export core crate
pub use sprig_core::*;

mod loader;

pub use bundle::{ModelBundle, PostProcess};
pub use loader::{load_word2vec, BundleLoader, LoaderConfig};

/// Commonly used types.
pub mod prelude {
    pub use crate::loader::{load_word2vec, BundleLoader, LoaderConfig};
    pub use crate::{
        bundle::{ModelBundle, PostProcess},
        error::{EmbedError, Result},
        models::{Architecture, Model},
        nn::{cosine_similarity, euclidean_distance},
        parity::{ParityCase, ParityHarness, ParitySummary},
        tokenizer::{HfTokenizer, TextTokenizer},
        weights::{KeyTransform, LoadConfig},
    };

    // Re-export useful external types
    pub use anyhow;
    pub use candle_core::{Device, Tensor};
    pub use tracing;
}
