//! Tokenization adapter.
//!
//! [`TextTokenizer`] is the contract the bundle encodes through: single
//! texts become id lists truncated from the back, batches are right-padded
//! to the longest sequence actually produced.
//!
//! [`HfTokenizer`] wraps the HuggingFace tokenizers library.

use crate::error::{EmbedError, Result};
use candle_core::{Device, Tensor};
use std::path::Path;
use tokenizers::Tokenizer;

/// Padded batch of token ids.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTokenizeResult {
    /// Row-major ids, `batch * longest` long.
    pub tokens: Vec<u32>,
    /// 1.0 for real tokens, 0.0 for padding.
    pub attention_mask: Vec<f32>,
    /// `(batch, longest)`.
    pub shape: (usize, usize),
}

impl BatchTokenizeResult {
    /// Ids `[batch, longest]` (u32) and mask `[batch, longest]` (f32).
    pub fn to_tensors(&self, device: &Device) -> Result<(Tensor, Tensor)> {
        let ids = Tensor::from_slice(&self.tokens, self.shape, device)?;
        let mask = Tensor::from_slice(&self.attention_mask, self.shape, device)?;
        Ok((ids, mask))
    }

    /// Number of sequences.
    pub fn batch_size(&self) -> usize {
        self.shape.0
    }

    /// Padded length.
    pub fn longest(&self) -> usize {
        self.shape.1
    }
}

/// Right-pad `sequences` with `pad_token_id` to the longest one.
pub fn pad_to_longest(sequences: &[Vec<u32>], pad_token_id: u32) -> BatchTokenizeResult {
    let longest = sequences.iter().map(Vec::len).max().unwrap_or(0);
    let mut tokens = Vec::with_capacity(longest * sequences.len());
    let mut attention_mask = Vec::with_capacity(longest * sequences.len());
    for seq in sequences {
        tokens.extend_from_slice(seq);
        attention_mask.extend(std::iter::repeat(1.0).take(seq.len()));
        let padding = longest - seq.len();
        tokens.extend(std::iter::repeat(pad_token_id).take(padding));
        attention_mask.extend(std::iter::repeat(0.0).take(padding));
    }
    BatchTokenizeResult {
        tokens,
        attention_mask,
        shape: (sequences.len(), longest),
    }
}

/// Text to token ids.
pub trait TextTokenizer: Send + Sync {
    /// Encode one text. With `max_length`, trailing ids past it are dropped.
    fn tokenize(
        &self,
        text: &str,
        max_length: Option<usize>,
        add_special_tokens: bool,
    ) -> Result<Vec<u32>>;

    /// Id of the unknown token, when the vocabulary has one.
    fn unknown_token_id(&self) -> Option<u32>;

    /// Encode every text independently, then right-pad to the longest.
    ///
    /// One failing text fails the batch.
    fn tokenize_batch(
        &self,
        texts: &[&str],
        pad_token_id: u32,
        max_length: Option<usize>,
        add_special_tokens: bool,
    ) -> Result<BatchTokenizeResult> {
        let sequences = texts
            .iter()
            .map(|text| self.tokenize(text, max_length, add_special_tokens))
            .collect::<Result<Vec<_>>>()?;
        Ok(pad_to_longest(&sequences, pad_token_id))
    }
}

/// HuggingFace `tokenizer.json` tokenizer.
#[derive(Clone)]
pub struct HfTokenizer {
    inner: Tokenizer,
    unknown_token_id: Option<u32>,
}

impl HfTokenizer {
    /// Load from a `tokenizer.json` file.
    ///
    /// Padding and truncation baked into the file are turned off; batching
    /// and length limits are applied here instead.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path).map_err(|e| {
            EmbedError::Tokenizer(format!("failed to load {}: {}", path.display(), e))
        })?;
        Self::new(inner)
    }

    /// Wrap an already constructed tokenizer.
    pub fn new(mut inner: Tokenizer) -> Result<Self> {
        inner.with_padding(None);
        inner
            .with_truncation(None)
            .map_err(|e| EmbedError::Tokenizer(e.to_string()))?;

        let unknown_token_id = ["[UNK]", "<unk>", "<UNK>"]
            .iter()
            .find_map(|t| inner.token_to_id(t));

        Ok(Self {
            inner,
            unknown_token_id,
        })
    }

    /// Get vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.inner.get_vocab_size(true)
    }

    /// String to token ID.
    pub fn token_to_id(&self, token: &str) -> Option<u32> {
        self.inner.token_to_id(token)
    }

    /// Underlying tokenizer.
    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }
}

impl TextTokenizer for HfTokenizer {
    fn tokenize(
        &self,
        text: &str,
        max_length: Option<usize>,
        add_special_tokens: bool,
    ) -> Result<Vec<u32>> {
        let encoding = self
            .inner
            .encode(text, add_special_tokens)
            .map_err(|e| EmbedError::Tokenizer(format!("failed to encode text: {}", e)))?;
        let mut ids = encoding.get_ids().to_vec();
        if let Some(max) = max_length {
            ids.truncate(max);
        }
        Ok(ids)
    }

    fn unknown_token_id(&self) -> Option<u32> {
        self.unknown_token_id
    }
}

impl std::fmt::Debug for HfTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HfTokenizer")
            .field("vocab_size", &self.vocab_size())
            .field("unknown_token_id", &self.unknown_token_id)
            .finish()
    }
}
