//! Word2Vec / GloVe word vectors.
//!
//! Parsed from the plain text format (`word v1 v2 ...` per line, with an
//! optional `count dim` header). Lookup is by exact word.

use crate::error::{EmbedError, Result};
use crate::nn::{cosine_similarity, Embedding};
use crate::tokenizer::TextTokenizer;
use candle_core::{Device, Tensor};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

/// Word vectors with a vocabulary.
#[derive(Debug, Clone)]
pub struct Word2Vec {
    vocab: Arc<HashMap<String, u32>>,
    words: Vec<String>,
    embedding: Embedding,
}

impl Word2Vec {
    /// Read a text vector file.
    pub fn from_file(path: &Path, device: &Device) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let model = Self::from_text(&contents, device)?;
        tracing::info!(
            path = %path.display(),
            words = model.len(),
            dim = model.hidden_size(),
            "loaded word vectors"
        );
        Ok(model)
    }

    /// Parse the text format. Duplicate words keep their first vector.
    pub fn from_text(text: &str, device: &Device) -> Result<Self> {
        let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty()).peekable();

        let mut declared_dim = None;
        if let Some((_, first)) = lines.peek() {
            let fields: Vec<&str> = first.split_whitespace().collect();
            if let [count, dim] = fields.as_slice() {
                if let (Ok(_), Ok(dim)) = (count.parse::<usize>(), dim.parse::<usize>()) {
                    declared_dim = Some(dim);
                    lines.next();
                }
            }
        }

        let mut vocab = HashMap::new();
        let mut words = Vec::new();
        let mut data: Vec<f32> = Vec::new();
        let mut dim = declared_dim;

        for (line_no, line) in lines {
            let mut fields = line.split_whitespace();
            let Some(word) = fields.next() else { continue };
            let values = fields
                .map(|f| f.parse::<f32>())
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| {
                    EmbedError::InvalidInput(format!("line {}: bad value ({})", line_no + 1, e))
                })?;

            let expected = *dim.get_or_insert(values.len());
            if values.len() != expected || expected == 0 {
                return Err(EmbedError::InvalidInput(format!(
                    "line {}: expected {} values, got {}",
                    line_no + 1,
                    expected,
                    values.len()
                )));
            }
            if vocab.contains_key(word) {
                continue;
            }
            vocab.insert(word.to_string(), words.len() as u32);
            words.push(word.to_string());
            data.extend_from_slice(&values);
        }

        let Some(dim) = dim.filter(|_| !words.is_empty()) else {
            return Err(EmbedError::InvalidInput("no word vectors found".to_string()));
        };
        let weight = Tensor::from_vec(data, (words.len(), dim), device)?;
        Ok(Self {
            vocab: Arc::new(vocab),
            words,
            embedding: Embedding::new(weight)?,
        })
    }

    /// Vector `[dim]` for `word`, or `None` when out of vocabulary.
    pub fn encode(&self, word: &str) -> Result<Option<Tensor>> {
        match self.vocab.get(word) {
            Some(&id) => Ok(Some(self.embedding.weight().get(id as usize)?)),
            None => Ok(None),
        }
    }

    /// Per-token vectors `[batch, seq, dim]`.
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.embedding.forward(input_ids)
    }

    /// The `top_k` words closest to `word` by cosine similarity, best first.
    ///
    /// `word` itself is excluded. Unknown words give an empty list.
    pub fn most_similar(&self, word: &str, top_k: usize) -> Result<Vec<(String, f32)>> {
        let Some(&id) = self.vocab.get(word) else {
            return Ok(Vec::new());
        };
        let table = self.embedding.weight();
        let query = table.get(id as usize)?.unsqueeze(0)?;
        let scores = cosine_similarity(&query, table)?.squeeze(0)?.to_vec1::<f32>()?;

        let mut ranked: Vec<(usize, f32)> = scores
            .into_iter()
            .enumerate()
            .filter(|&(i, _)| i != id as usize)
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(ranked
            .into_iter()
            .take(top_k)
            .map(|(i, s)| (self.words[i].clone(), s))
            .collect())
    }

    /// Id of `word`.
    pub fn word_id(&self, word: &str) -> Option<u32> {
        self.vocab.get(word).copied()
    }

    /// Whitespace tokenizer over this vocabulary.
    pub fn tokenizer(&self) -> Word2VecTokenizer {
        Word2VecTokenizer {
            vocab: Arc::clone(&self.vocab),
        }
    }

    /// Vocabulary size.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Whether the vocabulary is empty.
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
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

/// Splits on whitespace and maps known words to ids; unknown words are skipped.
#[derive(Debug, Clone)]
pub struct Word2VecTokenizer {
    vocab: Arc<HashMap<String, u32>>,
}

impl TextTokenizer for Word2VecTokenizer {
    fn tokenize(
        &self,
        text: &str,
        max_length: Option<usize>,
        _add_special_tokens: bool,
    ) -> Result<Vec<u32>> {
        let mut ids: Vec<u32> = text
            .split_whitespace()
            .filter_map(|w| self.vocab.get(w).copied())
            .collect();
        if let Some(max) = max_length {
            ids.truncate(max);
        }
        Ok(ids)
    }

    fn unknown_token_id(&self) -> Option<u32> {
        None
    }
}
