//! Similarity and distance helpers for evaluating embeddings.
//!
//! All functions take row-major matrices `x: [n, d]` and `y: [m, d]` and
//! return the pairwise `[n, m]` matrix. They are not used inside forward passes.

use crate::error::{EmbedError, Result};
use candle_core::{Tensor, D};

fn check_pair(x: &Tensor, y: &Tensor) -> Result<()> {
    match (x.dims(), y.dims()) {
        (&[_, dx], &[_, dy]) if dx == dy => Ok(()),
        (a, b) => Err(EmbedError::ShapeMismatch(format!(
            "expected [n, d] and [m, d], got {:?} and {:?}",
            a, b
        ))),
    }
}

/// Euclidean norm along the last axis, keeping it as size 1.
pub fn norm(x: &Tensor) -> Result<Tensor> {
    Ok(x.sqr()?.sum_keepdim(D::Minus1)?.sqrt()?)
}

/// `x · yᵗ`, the pairwise `[n, m]` matrix.
///
/// Row-wise products of matched rows are its diagonal.
pub fn dot_product(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    check_pair(x, y)?;
    Ok(x.matmul(&y.t()?)?)
}

/// `x · yᵗ / (|x| |y|ᵗ)`.
pub fn cosine_similarity(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    let dots = dot_product(x, y)?;
    let norms = norm(x)?.matmul(&norm(y)?.t()?)?;
    Ok((dots / norms)?)
}

/// `1 - cosine_similarity`.
pub fn cosine_distance(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    Ok(cosine_similarity(x, y)?.affine(-1.0, 1.0)?)
}

/// `sqrt(sum((x_i - y_j)²))` for every pair of rows, as an `[n, m]` matrix.
///
/// Row-wise distances of matched rows are its diagonal.
pub fn euclidean_distance(x: &Tensor, y: &Tensor) -> Result<Tensor> {
    check_pair(x, y)?;
    let diff = x.unsqueeze(1)?.broadcast_sub(&y.unsqueeze(0)?)?;
    Ok(diff.sqr()?.sum(D::Minus1)?.sqrt()?)
}
