//! Encode example.
//!
//! Loads a model directory and prints pairwise cosine similarities of the
//! texts given on the command line.
//!
//! ```text
//! RUST_LOG=sprig_core=debug cargo run --example encode -- models/bge-small-en "a cat" "a kitten"
//! ```

use anyhow::{bail, Result};
use sprig::prelude::*;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let mut args = std::env::args().skip(1);
    let Some(model_dir) = args.next() else {
        bail!("usage: encode <model-dir> <text>...");
    };
    let texts: Vec<String> = args.collect();
    if texts.is_empty() {
        bail!("no texts given");
    }

    let bundle = BundleLoader::new(&model_dir).build()?;
    println!(
        "Loaded {} ({} dims)",
        bundle.model().architecture(),
        bundle.output_size(PostProcess::MeanPoolAndNormalize)
    );

    let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
    let vectors = bundle.batch_encode(
        &refs,
        bundle.model().pad_token_id(),
        Some(512),
        PostProcess::MeanPoolAndNormalize,
    )?;
    let similarities = cosine_similarity(&vectors, &vectors)?.to_vec2::<f32>()?;

    for (i, row) in similarities.iter().enumerate() {
        for (j, s) in row.iter().enumerate().skip(i + 1) {
            println!("{:.4}  {:?} ~ {:?}", s, texts[i], texts[j]);
        }
    }
    Ok(())
}
