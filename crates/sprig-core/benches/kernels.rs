//! Kernel and forward-pass benchmarks.
//!
//! Shapes follow a MiniLM-sized encoder (hidden 384, 12 heads) so numbers
//! are comparable with published CPU latencies for that family.

use candle_core::{DType, Device, Tensor};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use sprig_core::models::{Architecture, Bert, BertConfig, Model};
use sprig_core::nn::{mean_pool, scaled_dot_product_attention, LayerNorm};
use sprig_core::weights::{KeyTransform, WeightBinder, WeightStore};
use std::collections::HashMap;

const HIDDEN: usize = 384;
const HEADS: usize = 12;

fn randn(shape: &[usize]) -> Tensor {
    Tensor::randn(0.0f32, 0.02, shape, &Device::Cpu).unwrap()
}

/// Random BERT weights under the canonical HuggingFace names.
fn bert_store(config: &BertConfig) -> WeightStore {
    let h = config.hidden_size;
    let i = config.intermediate_size;
    let mut t = HashMap::new();
    let mut put = |name: String, shape: &[usize]| {
        t.insert(name, randn(shape));
    };

    put("embeddings.word_embeddings.weight".into(), &[config.vocab_size, h]);
    put(
        "embeddings.position_embeddings.weight".into(),
        &[config.max_position_embeddings, h],
    );
    put(
        "embeddings.token_type_embeddings.weight".into(),
        &[config.type_vocab_size, h],
    );
    let mut norms = vec!["embeddings.LayerNorm".to_string()];
    for l in 0..config.num_hidden_layers {
        let p = format!("encoder.layer.{}", l);
        for proj in ["query", "key", "value"] {
            put(format!("{}.attention.self.{}.weight", p, proj), &[h, h]);
            put(format!("{}.attention.self.{}.bias", p, proj), &[h]);
        }
        put(format!("{}.attention.output.dense.weight", p), &[h, h]);
        put(format!("{}.attention.output.dense.bias", p), &[h]);
        put(format!("{}.intermediate.dense.weight", p), &[i, h]);
        put(format!("{}.intermediate.dense.bias", p), &[i]);
        put(format!("{}.output.dense.weight", p), &[h, i]);
        put(format!("{}.output.dense.bias", p), &[h]);
        norms.push(format!("{}.attention.output.LayerNorm", p));
        norms.push(format!("{}.output.LayerNorm", p));
    }
    for n in norms {
        let ones = Tensor::ones(h, DType::F32, &Device::Cpu).unwrap();
        t.insert(format!("{}.weight", n), ones);
        t.insert(format!("{}.bias", n), Tensor::zeros(h, DType::F32, &Device::Cpu).unwrap());
    }
    WeightStore::from_tensors(t, &Device::Cpu)
}

fn bench_layer_norm(c: &mut Criterion) {
    let mut group = c.benchmark_group("layer_norm");
    let ln = LayerNorm::identity(HIDDEN, 1e-12, &Device::Cpu).unwrap();

    for seq in [16, 128, 512] {
        let x = randn(&[1, seq, HIDDEN]);
        group.throughput(Throughput::Elements((seq * HIDDEN) as u64));
        group.bench_with_input(BenchmarkId::new("seq", seq), &x, |b, x| {
            b.iter(|| black_box(ln.forward(black_box(x)).unwrap()))
        });
    }
    group.finish();
}

fn bench_attention(c: &mut Criterion) {
    let mut group = c.benchmark_group("sdpa");
    let head_dim = HIDDEN / HEADS;

    for seq in [16, 128, 512] {
        let q = randn(&[1, HEADS, seq, head_dim]);
        let k = randn(&[1, HEADS, seq, head_dim]);
        let v = randn(&[1, HEADS, seq, head_dim]);
        group.throughput(Throughput::Elements(seq as u64));
        group.bench_function(BenchmarkId::new("seq", seq), |b| {
            b.iter(|| black_box(scaled_dot_product_attention(&q, &k, &v, None, None).unwrap()))
        });
    }
    group.finish();
}

fn bench_mean_pool(c: &mut Criterion) {
    let hidden = randn(&[32, 128, HIDDEN]);
    let mask = Tensor::ones((32, 128), DType::F32, &Device::Cpu).unwrap();
    c.bench_function("mean_pool_32x128", |b| {
        b.iter(|| black_box(mean_pool(&hidden, Some(&mask)).unwrap()))
    });
}

fn bench_bert_forward(c: &mut Criterion) {
    let config = BertConfig {
        vocab_size: 1024,
        hidden_size: HIDDEN,
        num_hidden_layers: 6,
        num_attention_heads: HEADS,
        intermediate_size: HIDDEN * 4,
        ..BertConfig::defaults_for(Architecture::Bert)
    };
    let store = bert_store(&config);
    let transform = KeyTransform::Identity;
    let binder = WeightBinder::new(&store, &transform);
    let model = Model::Bert(Bert::load(&binder, config, Architecture::Bert).unwrap());

    let mut group = c.benchmark_group("bert_forward");
    group.sample_size(20);
    for (batch, seq) in [(1, 16), (1, 128), (8, 128)] {
        let ids: Vec<u32> = (0..batch * seq).map(|i| (i % 1000) as u32 + 4).collect();
        let ids = Tensor::from_vec(ids, (batch, seq), &Device::Cpu).unwrap();
        let mask = Tensor::ones((batch, seq), DType::F32, &Device::Cpu).unwrap();
        group.throughput(Throughput::Elements((batch * seq) as u64));
        group.bench_function(BenchmarkId::new(format!("b{}", batch), seq), |b| {
            b.iter(|| black_box(model.forward(&ids, Some(&mask)).unwrap()))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_layer_norm,
    bench_attention,
    bench_mean_pool,
    bench_bert_forward
);
criterion_main!(benches);
