//! Tiny in-process checkpoints and tokenizers for tests.
//!
//! Weights come from a splitmix64 stream keyed by tensor name and seed, so
//! the same `(config, seed)` always rebuilds byte-identical stores.

use crate::bundle::ModelBundle;
use crate::error::Result;
use crate::models::{
    Architecture, Bert, BertConfig, ClipText, ClipTextConfig, Model, Model2Vec, ModernBert,
    ModernBertConfig, NomicBert, NomicBertConfig, StaticEmbeddings, Word2Vec,
};
use crate::tokenizer::TextTokenizer;
use crate::weights::{KeyTransform, WeightBinder, WeightStore};
use candle_core::{Device, Tensor};
use std::collections::HashMap;

pub(crate) const TINY_VOCAB: usize = 64;
const TINY_HIDDEN: usize = 16;
const TINY_HEADS: usize = 2;
const TINY_INTERMEDIATE: usize = 32;

pub(crate) const ALL_ARCHITECTURES: &[Architecture] = &[
    Architecture::Bert,
    Architecture::Roberta,
    Architecture::XlmRoberta,
    Architecture::ModernBert,
    Architecture::NomicBert,
    Architecture::Clip,
    Architecture::Model2Vec,
    Architecture::Word2Vec,
    Architecture::StaticEmbeddings,
];

const WORDS: &[&str] = &[
    "alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta", "iota", "kappa",
    "lambda", "mu", "nu", "xi", "omicron", "pi", "rho", "sigma", "tau", "upsilon", "phi", "chi",
    "psi", "omega",
];

const PAD: u32 = 0;
const UNK: u32 = 1;
const CLS: u32 = 2;
const SEP: u32 = 3;
const FIRST_WORD: u32 = 4;

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9e37_79b9_7f4a_7c15);
    x = (x ^ (x >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    x = (x ^ (x >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    x ^ (x >> 31)
}

fn fnv1a(s: &str) -> u64 {
    s.bytes().fold(0xcbf2_9ce4_8422_2325, |h, b| {
        (h ^ b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

/// Uniform values in `[center - scale, center + scale]`.
fn seeded_values(name: &str, seed: u64, len: usize, center: f32, scale: f32) -> Vec<f32> {
    let base = fnv1a(name) ^ splitmix64(seed);
    (0..len as u64)
        .map(|i| {
            let bits = splitmix64(base.wrapping_add(i));
            let unit = (bits >> 40) as f32 / (1u64 << 24) as f32;
            center + scale * (2.0 * unit - 1.0)
        })
        .collect()
}

/// Builds a store of deterministic pseudo-random weights.
pub(crate) struct StoreBuilder {
    tensors: HashMap<String, Tensor>,
    seed: u64,
}

impl StoreBuilder {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            tensors: HashMap::new(),
            seed,
        }
    }

    /// Values for `name` without storing them.
    pub(crate) fn generate(&self, name: &str, shape: &[usize], center: f32, scale: f32) -> Tensor {
        let len = shape.iter().product();
        let values = seeded_values(name, self.seed, len, center, scale);
        Tensor::from_vec(values, shape, &Device::Cpu).unwrap()
    }

    pub(crate) fn tensor(&mut self, name: &str, shape: &[usize], center: f32, scale: f32) {
        let tensor = self.generate(name, shape, center, scale);
        self.insert(name, tensor);
    }

    pub(crate) fn insert(&mut self, name: &str, tensor: Tensor) {
        self.tensors.insert(name.to_string(), tensor);
    }

    fn embedding(&mut self, name: &str, rows: usize, dim: usize) {
        self.tensor(&format!("{}.weight", name), &[rows, dim], 0.0, 0.5);
    }

    fn linear(&mut self, name: &str, out: usize, inp: usize, bias: bool) {
        let scale = 1.0 / (inp as f32).sqrt();
        self.tensor(&format!("{}.weight", name), &[out, inp], 0.0, scale);
        if bias {
            self.tensor(&format!("{}.bias", name), &[out], 0.0, 0.02);
        }
    }

    fn layer_norm(&mut self, name: &str, dim: usize, bias: bool) {
        self.tensor(&format!("{}.weight", name), &[dim], 1.0, 0.1);
        if bias {
            self.tensor(&format!("{}.bias", name), &[dim], 0.0, 0.02);
        }
    }

    pub(crate) fn build(self) -> WeightStore {
        WeightStore::from_tensors(self.tensors, &Device::Cpu)
    }
}

pub(crate) fn tiny_bert_config(architecture: Architecture) -> BertConfig {
    BertConfig {
        vocab_size: TINY_VOCAB,
        hidden_size: TINY_HIDDEN,
        num_hidden_layers: 2,
        num_attention_heads: TINY_HEADS,
        intermediate_size: TINY_INTERMEDIATE,
        max_position_embeddings: 64,
        ..BertConfig::defaults_for(architecture)
    }
}

pub(crate) fn tiny_bert_store(config: &BertConfig, with_pooler: bool, seed: u64) -> WeightStore {
    let h = config.hidden_size;
    let mut b = StoreBuilder::new(seed);
    b.embedding("embeddings.word_embeddings", config.vocab_size, h);
    b.embedding("embeddings.position_embeddings", config.max_position_embeddings, h);
    b.embedding("embeddings.token_type_embeddings", config.type_vocab_size, h);
    b.layer_norm("embeddings.LayerNorm", h, true);
    for i in 0..config.num_hidden_layers {
        let p = format!("encoder.layer.{}", i);
        for proj in ["query", "key", "value"] {
            b.linear(&format!("{}.attention.self.{}", p, proj), h, h, true);
        }
        b.linear(&format!("{}.attention.output.dense", p), h, h, true);
        b.layer_norm(&format!("{}.attention.output.LayerNorm", p), h, true);
        b.linear(&format!("{}.intermediate.dense", p), config.intermediate_size, h, true);
        b.linear(&format!("{}.output.dense", p), h, config.intermediate_size, true);
        b.layer_norm(&format!("{}.output.LayerNorm", p), h, true);
    }
    if with_pooler {
        b.linear("pooler.dense", h, h, true);
    }
    b.build()
}

pub(crate) fn tiny_modern_bert_config() -> ModernBertConfig {
    ModernBertConfig {
        vocab_size: TINY_VOCAB,
        hidden_size: TINY_HIDDEN,
        intermediate_size: TINY_INTERMEDIATE,
        num_hidden_layers: 3,
        num_attention_heads: TINY_HEADS,
        max_position_embeddings: 64,
        pad_token_id: PAD,
        global_attn_every_n_layers: 3,
        local_attention: 4,
        ..ModernBertConfig::default()
    }
}

pub(crate) fn tiny_modern_bert_store(config: &ModernBertConfig, seed: u64) -> WeightStore {
    let h = config.hidden_size;
    let inter = config.intermediate_size;
    let mut b = StoreBuilder::new(seed);
    b.embedding("embeddings.tok_embeddings", config.vocab_size, h);
    b.layer_norm("embeddings.norm", h, config.norm_bias);
    for i in 0..config.num_hidden_layers {
        let p = format!("layers.{}", i);
        if i > 0 {
            b.layer_norm(&format!("{}.attn_norm", p), h, config.norm_bias);
        }
        b.linear(&format!("{}.attn.Wqkv", p), 3 * h, h, config.attention_bias);
        b.linear(&format!("{}.attn.Wo", p), h, h, config.attention_bias);
        b.layer_norm(&format!("{}.mlp_norm", p), h, config.norm_bias);
        b.linear(&format!("{}.mlp.Wi", p), 2 * inter, h, config.mlp_bias);
        b.linear(&format!("{}.mlp.Wo", p), h, inter, config.mlp_bias);
    }
    b.layer_norm("final_norm", h, config.norm_bias);
    b.build()
}

/// How the NomicBERT gate/up weights are laid out in a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NomicMlpLayout {
    /// `mlp.gate_up_proj` + `mlp.down_proj`.
    Fused,
    /// `mlp.fc11` (up) + `mlp.fc12` (gate) + `mlp.fc2`.
    Split,
}

pub(crate) fn tiny_nomic_config() -> NomicBertConfig {
    NomicBertConfig {
        vocab_size: TINY_VOCAB,
        n_embd: TINY_HIDDEN,
        n_head: TINY_HEADS,
        n_layer: 2,
        n_inner: Some(TINY_INTERMEDIATE),
        n_positions: 64,
        ..NomicBertConfig::default()
    }
}

pub(crate) fn tiny_nomic_store(
    config: &NomicBertConfig,
    layout: NomicMlpLayout,
    seed: u64,
) -> WeightStore {
    let h = config.n_embd;
    let inter = config.intermediate_size();
    let mut b = StoreBuilder::new(seed);
    b.embedding("embeddings.word_embeddings", config.vocab_size, h);
    b.embedding("embeddings.token_type_embeddings", config.type_vocab_size, h);
    if config.rotary_emb_fraction <= 0.0 {
        b.embedding("embeddings.position_embeddings", config.n_positions, h);
    }
    b.layer_norm("emb_ln", h, true);
    for i in 0..config.n_layer {
        let p = format!("encoder.layers.{}", i);
        b.linear(&format!("{}.attn.Wqkv", p), 3 * h, h, config.qkv_proj_bias);
        b.linear(&format!("{}.attn.out_proj", p), h, h, config.qkv_proj_bias);
        b.layer_norm(&format!("{}.norm1", p), h, true);
        b.layer_norm(&format!("{}.norm2", p), h, true);

        // Same values in both layouts: gate rows first, then up rows
        let fused = b.generate(&format!("{}.mlp.gate_up", p), &[2 * inter, h], 0.0, 0.25);
        let down = b.generate(&format!("{}.mlp.down", p), &[h, inter], 0.0, 0.18);
        match layout {
            NomicMlpLayout::Fused => {
                b.insert(&format!("{}.mlp.gate_up_proj.weight", p), fused);
                b.insert(&format!("{}.mlp.down_proj.weight", p), down);
            }
            NomicMlpLayout::Split => {
                let gate = fused.narrow(0, 0, inter).unwrap();
                let up = fused.narrow(0, inter, inter).unwrap();
                b.insert(&format!("{}.mlp.fc12.weight", p), gate);
                b.insert(&format!("{}.mlp.fc11.weight", p), up);
                b.insert(&format!("{}.mlp.fc2.weight", p), down);
            }
        }
    }
    b.build()
}

pub(crate) fn tiny_clip_config() -> ClipTextConfig {
    ClipTextConfig {
        vocab_size: TINY_VOCAB,
        hidden_size: TINY_HIDDEN,
        intermediate_size: TINY_INTERMEDIATE,
        num_hidden_layers: 2,
        num_attention_heads: TINY_HEADS,
        max_position_embeddings: 32,
        projection_dim: Some(8),
        ..ClipTextConfig::default()
    }
}

pub(crate) fn tiny_clip_store(config: &ClipTextConfig, with_projection: bool, seed: u64) -> WeightStore {
    let h = config.hidden_size;
    let mut b = StoreBuilder::new(seed);
    b.embedding("text_model.embeddings.token_embedding", config.vocab_size, h);
    b.embedding("text_model.embeddings.position_embedding", config.max_position_embeddings, h);
    for i in 0..config.num_hidden_layers {
        let p = format!("text_model.encoder.layers.{}", i);
        b.layer_norm(&format!("{}.layer_norm1", p), h, true);
        for proj in ["q_proj", "k_proj", "v_proj", "out_proj"] {
            b.linear(&format!("{}.self_attn.{}", p, proj), h, h, true);
        }
        b.layer_norm(&format!("{}.layer_norm2", p), h, true);
        b.linear(&format!("{}.mlp.fc1", p), config.intermediate_size, h, true);
        b.linear(&format!("{}.mlp.fc2", p), h, config.intermediate_size, true);
    }
    b.layer_norm("text_model.final_layer_norm", h, true);
    if with_projection {
        b.linear("text_projection", config.projection_dim.unwrap_or(h), h, false);
    }
    b.build()
}

fn tiny_table(name: &str, seed: u64) -> WeightStore {
    let mut b = StoreBuilder::new(seed);
    b.tensor(name, &[TINY_VOCAB, TINY_HIDDEN], 0.0, 0.5);
    b.build()
}

pub(crate) fn tiny_word2vec(seed: u64) -> Word2Vec {
    let text: String = WORDS
        .iter()
        .map(|w| {
            let values = seeded_values(w, seed, TINY_HIDDEN, 0.0, 1.0);
            let fields: Vec<String> = values.iter().map(|v| v.to_string()).collect();
            format!("{} {}\n", w, fields.join(" "))
        })
        .collect();
    Word2Vec::from_text(&text, &Device::Cpu).unwrap()
}

fn load_model(architecture: Architecture, seed: u64) -> Result<Model> {
    let transform = KeyTransform::Identity;
    Ok(match architecture {
        Architecture::Bert | Architecture::Roberta | Architecture::XlmRoberta => {
            let config = tiny_bert_config(architecture);
            let store = tiny_bert_store(&config, true, seed);
            Model::Bert(Bert::load(&WeightBinder::new(&store, &transform), config, architecture)?)
        }
        Architecture::ModernBert => {
            let config = tiny_modern_bert_config();
            let store = tiny_modern_bert_store(&config, seed);
            Model::ModernBert(ModernBert::load(&WeightBinder::new(&store, &transform), config)?)
        }
        Architecture::NomicBert => {
            let config = tiny_nomic_config();
            let store = tiny_nomic_store(&config, NomicMlpLayout::Fused, seed);
            Model::NomicBert(NomicBert::load(&WeightBinder::new(&store, &transform), config)?)
        }
        Architecture::Clip => {
            let config = tiny_clip_config();
            let store = tiny_clip_store(&config, true, seed);
            Model::Clip(ClipText::load(&WeightBinder::new(&store, &transform), config)?)
        }
        Architecture::Model2Vec => {
            let store = tiny_table("embeddings", seed);
            Model::Model2Vec(Model2Vec::load(&WeightBinder::new(&store, &transform), false)?)
        }
        Architecture::StaticEmbeddings => {
            let store = tiny_table("embedding.weight", seed);
            Model::StaticEmbeddings(StaticEmbeddings::load(&WeightBinder::new(&store, &transform))?)
        }
        Architecture::Word2Vec => Model::Word2Vec(tiny_word2vec(seed)),
    })
}

pub(crate) fn tiny_model(architecture: Architecture, seed: u64) -> Model {
    load_model(architecture, seed).unwrap()
}

pub(crate) fn tiny_bundle(architecture: Architecture, seed: u64) -> ModelBundle {
    match tiny_model(architecture, seed) {
        Model::Word2Vec(w2v) => ModelBundle::word2vec(w2v),
        model => ModelBundle::new(model, WordHashTokenizer::new(TINY_VOCAB)),
    }
}

/// `n` space-separated words.
pub(crate) fn sentence_of(n: usize) -> String {
    (0..n)
        .map(|i| WORDS[(i * 7 + n) % WORDS.len()])
        .collect::<Vec<_>>()
        .join(" ")
}

/// Distinct unordered word pairs; no two share the same token multiset.
pub(crate) fn degenerate_probe_strings() -> Vec<String> {
    let words = &WORDS[..15];
    let mut probes = Vec::new();
    for i in 0..words.len() {
        for j in (i + 1)..words.len() {
            probes.push(format!("{} {}", words[i], words[j]));
        }
    }
    probes
}

/// Whitespace tokenizer with BERT-like specials.
///
/// Known words get fixed ids, anything else hashes into the remaining
/// vocabulary; `[UNK]` maps to the unknown id.
#[derive(Debug, Clone)]
pub(crate) struct WordHashTokenizer {
    vocab_size: u32,
}

impl WordHashTokenizer {
    pub(crate) fn new(vocab_size: usize) -> Self {
        assert!(vocab_size > FIRST_WORD as usize);
        Self {
            vocab_size: vocab_size as u32,
        }
    }

    fn word_id(&self, word: &str) -> u32 {
        if word == "[UNK]" {
            return UNK;
        }
        let known = WORDS.len() as u32;
        match WORDS.iter().position(|w| *w == word) {
            Some(i) if FIRST_WORD + (i as u32) < self.vocab_size => FIRST_WORD + i as u32,
            _ => {
                let (start, span) = if FIRST_WORD + known < self.vocab_size {
                    (FIRST_WORD + known, self.vocab_size - FIRST_WORD - known)
                } else {
                    (FIRST_WORD, self.vocab_size - FIRST_WORD)
                };
                start + (fnv1a(word) % span as u64) as u32
            }
        }
    }
}

impl TextTokenizer for WordHashTokenizer {
    fn tokenize(
        &self,
        text: &str,
        max_length: Option<usize>,
        add_special_tokens: bool,
    ) -> Result<Vec<u32>> {
        let words = text.split_whitespace().map(|w| self.word_id(w));
        let mut ids: Vec<u32> = if add_special_tokens {
            std::iter::once(CLS)
                .chain(words)
                .chain(std::iter::once(SEP))
                .collect()
        } else {
            words.collect()
        };
        if let Some(max) = max_length {
            ids.truncate(max);
        }
        Ok(ids)
    }

    fn unknown_token_id(&self) -> Option<u32> {
        Some(UNK)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_are_reproducible() {
        let config = tiny_bert_config(Architecture::Bert);
        let a = tiny_bert_store(&config, false, 9);
        let b = tiny_bert_store(&config, false, 9);
        let c = tiny_bert_store(&config, false, 10);
        let name = "encoder.layer.1.attention.self.query.weight";
        let values = |s: &WeightStore| {
            s.get_tensor(name)
                .unwrap()
                .flatten_all()
                .unwrap()
                .to_vec1::<f32>()
                .unwrap()
        };
        assert_eq!(values(&a), values(&b));
        assert_ne!(values(&a), values(&c));
    }
}
