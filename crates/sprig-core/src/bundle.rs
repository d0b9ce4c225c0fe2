//! Model bundle: a tokenizer and a model encoding text end to end.

use crate::error::{EmbedError, Result};
use crate::models::{Model, Word2Vec};
use crate::nn::{first_token, l2_normalize, mean_pool};
use crate::tokenizer::{pad_to_longest, TextTokenizer};
use candle_core::{DType, Tensor};
use std::fmt;

/// What to do with the forward output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostProcess {
    /// Raw `[batch, seq, hidden]` output.
    None,
    /// Masked mean over the sequence.
    #[default]
    MeanPool,
    /// Masked mean, then L2 normalization.
    MeanPoolAndNormalize,
    /// First (CLS) token.
    FirstToken,
    /// The architecture's own pooler (BERT dense+tanh, CLIP eos + projection).
    Pooler,
}

/// Tokenizer plus model. Immutable once built, so shared use needs no locking.
pub struct ModelBundle {
    model: Model,
    tokenizer: Box<dyn TextTokenizer>,
    truncate_dimension: Option<usize>,
}

impl ModelBundle {
    /// Pair a model with its tokenizer.
    pub fn new(model: Model, tokenizer: impl TextTokenizer + 'static) -> Self {
        Self {
            model,
            tokenizer: Box::new(tokenizer),
            truncate_dimension: None,
        }
    }

    /// Word vectors with their own whitespace tokenizer.
    pub fn word2vec(model: Word2Vec) -> Self {
        let tokenizer = model.tokenizer();
        Self::new(Model::Word2Vec(model), tokenizer)
    }

    /// Keep only the leading `dim` channels of pooled vectors.
    pub fn with_truncate_dimension(mut self, dim: Option<usize>) -> Self {
        self.truncate_dimension = dim;
        self
    }

    /// Wrapped model.
    pub fn model(&self) -> &Model {
        &self.model
    }

    /// Wrapped tokenizer.
    pub fn tokenizer(&self) -> &dyn TextTokenizer {
        self.tokenizer.as_ref()
    }

    /// Token ids for one text as the model expects them.
    pub fn token_ids(&self, text: &str, max_length: Option<usize>) -> Result<Vec<u32>> {
        let mut ids =
            self.tokenizer
                .tokenize(text, max_length, self.model.add_special_tokens())?;
        if self.model.drops_unknown_tokens() {
            if let Some(unk) = self.tokenizer.unknown_token_id() {
                let before = ids.len();
                ids.retain(|&id| id != unk);
                if before > 0 && ids.is_empty() {
                    tracing::warn!(text, "every token was unknown; encoding as zeros");
                }
            }
        }
        Ok(ids)
    }

    /// Encode one text.
    ///
    /// Output is `[1, seq, hidden]` for [`PostProcess::None`], else `[1, dim]`.
    pub fn encode(
        &self,
        text: &str,
        max_length: Option<usize>,
        post: PostProcess,
    ) -> Result<Tensor> {
        let ids = self.token_ids(text, max_length)?;
        if ids.is_empty() {
            return self.zeros(1, post);
        }
        let input_ids = Tensor::new(ids.as_slice(), self.model.device())?.unsqueeze(0)?;
        let hidden = self.model.forward(&input_ids, None)?;
        self.post_process(&hidden, &input_ids, None, post)
    }

    /// Encode texts as one padded batch.
    ///
    /// Rows equal [`encode`](Self::encode) of the same text up to float
    /// rounding: the mask reaches both attention and pooling.
    pub fn batch_encode(
        &self,
        texts: &[&str],
        pad_token_id: u32,
        max_length: Option<usize>,
        post: PostProcess,
    ) -> Result<Tensor> {
        let sequences = texts
            .iter()
            .map(|text| self.token_ids(text, max_length))
            .collect::<Result<Vec<_>>>()?;
        let batch = pad_to_longest(&sequences, pad_token_id);
        if batch.batch_size() == 0 || batch.longest() == 0 {
            return self.zeros(batch.batch_size(), post);
        }

        let (input_ids, mask) = batch.to_tensors(self.model.device())?;
        let hidden = self.model.forward(&input_ids, Some(&mask))?;
        self.post_process(&hidden, &input_ids, Some(&mask), post)
    }

    fn post_process(
        &self,
        hidden: &Tensor,
        input_ids: &Tensor,
        mask: Option<&Tensor>,
        post: PostProcess,
    ) -> Result<Tensor> {
        if post == PostProcess::None {
            return Ok(hidden.clone());
        }

        let pooled = match (&self.model, post) {
            (Model::Model2Vec(m), _) => m.finish(&mean_pool(hidden, mask)?)?,
            (Model::StaticEmbeddings(_) | Model::Word2Vec(_), _) => mean_pool(hidden, mask)?,
            (_, PostProcess::FirstToken) => first_token(hidden)?,
            (Model::Bert(m), PostProcess::Pooler) => m.pool(hidden)?,
            (Model::Clip(m), PostProcess::Pooler) => m.pool(input_ids, hidden)?,
            (m, PostProcess::Pooler) => {
                return Err(EmbedError::UnsupportedConfiguration(format!(
                    "{} has no pooler",
                    m.architecture()
                )))
            }
            _ => mean_pool(hidden, mask)?,
        };

        let pooled = self.truncate(pooled)?;
        if post == PostProcess::MeanPoolAndNormalize {
            l2_normalize(&pooled)
        } else {
            Ok(pooled)
        }
    }

    fn truncate(&self, pooled: Tensor) -> Result<Tensor> {
        match self.truncate_dimension {
            Some(0) => Err(EmbedError::InvalidInput(
                "truncate_dimension must be positive".to_string(),
            )),
            Some(d) if d < pooled.dim(1)? => Ok(pooled.narrow(1, 0, d)?),
            _ => Ok(pooled),
        }
    }

    /// Width of pooled output for `post`.
    pub fn output_size(&self, post: PostProcess) -> usize {
        let width = match (&self.model, post) {
            (Model::Clip(m), PostProcess::Pooler) => m.output_size(),
            (m, _) => m.hidden_size(),
        };
        match (post, self.truncate_dimension) {
            (PostProcess::None, _) => width,
            (_, Some(d)) if d > 0 => width.min(d),
            _ => width,
        }
    }

    fn zeros(&self, rows: usize, post: PostProcess) -> Result<Tensor> {
        let device = self.model.device();
        let hidden = self.model.hidden_size();
        Ok(match post {
            PostProcess::None => Tensor::zeros((rows, 0, hidden), DType::F32, device)?,
            _ => Tensor::zeros((rows, self.output_size(post)), DType::F32, device)?,
        })
    }
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("architecture", &self.model.architecture())
            .field("hidden_size", &self.model.hidden_size())
            .field("truncate_dimension", &self.truncate_dimension)
            .finish()
    }
}
