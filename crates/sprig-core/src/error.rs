//! Error types for Sprig Core.

use thiserror::Error;

/// Result type alias for Sprig operations.
pub type Result<T> = std::result::Result<T, EmbedError>;

/// Errors that can occur while loading or running an embedding model.
#[derive(Error, Debug)]
pub enum EmbedError {
    /// A required weight was not found after key transform and fallbacks.
    #[error("missing weight: {0}")]
    MissingWeight(String),

    /// The decoded config asks for something with no numeric path.
    #[error("configuration not supported: {0}")]
    UnsupportedConfiguration(String),

    /// Kernel or binder shape precondition violated.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Malformed input payload (ids, config, word vectors).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Error surfaced by the tokenizer library.
    #[error("tokenizer error: {0}")]
    Tokenizer(String),

    /// SafeTensors parse or write error.
    #[error("safetensors error: {0}")]
    SafeTensors(String),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("tensor error: {0}")]
    Tensor(#[from] candle_core::Error),
}

impl EmbedError {
    /// Whether this error is a missing weight, the only error fallback probing may swallow.
    pub fn is_missing_weight(&self) -> bool {
        matches!(self, EmbedError::MissingWeight(_))
    }
}
