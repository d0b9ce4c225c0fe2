//! Tensor kernels shared by every architecture graph.
//!
//! All kernels are stateless apart from the weights they hold, operate on
//! `f32` tensors and report precondition violations as
//! [`EmbedError::ShapeMismatch`](crate::EmbedError::ShapeMismatch).

mod activation;
mod attention;
mod distance;
mod embedding;
mod linear;
mod norm;
mod pooling;
mod rope;

pub use activation::{gelu_fast, gelu_precise, quick_gelu, sigmoid, silu, Activation};
pub use attention::{
    causal_mask, extended_attention_mask, scaled_dot_product_attention, sliding_window_masks,
    BERT_MASK_VALUE, MASK_VALUE,
};
pub use distance::{cosine_distance, cosine_similarity, dot_product, euclidean_distance, norm};
pub use embedding::Embedding;
pub use linear::Linear;
pub use norm::LayerNorm;
pub use pooling::{first_token, l2_normalize, mean_pool};
pub use rope::RotaryEmbedding;

use crate::error::{EmbedError, Result};
use candle_core::Tensor;

/// Size of the last axis, or a shape error for rank-0 tensors.
pub(crate) fn last_dim(x: &Tensor, what: &str) -> Result<usize> {
    x.dims().last().copied().ok_or_else(|| {
        EmbedError::ShapeMismatch(format!("{} must have at least one dimension", what))
    })
}
