//! Static embedding tables: Model2Vec and sentence-transformers StaticEmbedding.
//!
//! No transformer here. `forward` gathers token vectors from one table;
//! the bundle pools them, truncates and normalizes.

use crate::error::Result;
use crate::nn::{l2_normalize, Embedding};
use crate::weights::WeightBinder;
use candle_core::{Device, Tensor};

/// Model2Vec distilled embeddings.
#[derive(Debug, Clone)]
pub struct Model2Vec {
    embeddings: Embedding,
    normalize: bool,
}

impl Model2Vec {
    /// Bind the `embeddings` table.
    pub fn load(binder: &WeightBinder<'_>, normalize: bool) -> Result<Self> {
        let embeddings = Embedding::new(binder.get("embeddings")?)?;
        tracing::info!(
            vocab = embeddings.vocab_size(),
            dim = embeddings.hidden_size(),
            normalize,
            "bound model2vec table"
        );
        Ok(Self {
            embeddings,
            normalize,
        })
    }

    /// Per-token vectors `[batch, seq, dim]`.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.embeddings.forward(input_ids)
    }

    /// Apply the configured normalization to pooled `[n, dim]` vectors.
    pub fn finish(&self, pooled: &Tensor) -> Result<Tensor> {
        if self.normalize {
            l2_normalize(pooled)
        } else {
            Ok(pooled.clone())
        }
    }

    /// Vector width.
    pub fn hidden_size(&self) -> usize {
        self.embeddings.hidden_size()
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        self.embeddings.weight().device()
    }
}

/// sentence-transformers `StaticEmbedding` module.
#[derive(Debug, Clone)]
pub struct StaticEmbeddings {
    embedding: Embedding,
}

impl StaticEmbeddings {
    /// Bind the `embedding.weight` table.
    pub fn load(binder: &WeightBinder<'_>) -> Result<Self> {
        let embedding = binder.embedding("embedding")?;
        tracing::info!(
            vocab = embedding.vocab_size(),
            dim = embedding.hidden_size(),
            "bound static embedding table"
        );
        Ok(Self { embedding })
    }

    /// Per-token vectors `[batch, seq, dim]`.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(input_ids)
    }

    /// Vector width.
    pub fn hidden_size(&self) -> usize {
        self.embedding.hidden_size()
    }

    /// Get device.
    pub fn device(&self) -> &Device {
        self.embedding.weight().device()
    }
}
