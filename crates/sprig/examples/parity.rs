//! Reference vector validation.
//!
//! Encodes each case's text with a model directory and compares the result
//! against vectors dumped from the reference framework, first one text at a
//! time and then as a single padded batch.
//!
//! Cases file (JSON):
//!
//! ```text
//! [{"name": "plain", "text": "Text to encode", "expected": [0.01, ...], "tolerance": 1e-5}]
//! ```
//!
//! Run:
//!    cargo run -p sprig --example parity -- /path/to/model cases.json [mean|normalize|cls|pooler]

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use sprig::prelude::*;
use std::fs;

#[derive(Debug, Deserialize)]
struct JsonCase {
    name: String,
    text: String,
    expected: Vec<f32>,
    #[serde(default)]
    tolerance: Option<f32>,
    #[serde(default)]
    tags: Vec<String>,
}

impl From<JsonCase> for ParityCase {
    fn from(json: JsonCase) -> Self {
        let mut case = ParityCase::new(json.name, json.text, json.expected);
        if let Some(tolerance) = json.tolerance {
            case = case.with_tolerance(tolerance);
        }
        json.tags.into_iter().fold(case, |c, tag| c.with_tag(tag))
    }
}

fn post_process(name: Option<&str>) -> Result<PostProcess> {
    Ok(match name.unwrap_or("mean") {
        "none" => PostProcess::None,
        "mean" => PostProcess::MeanPool,
        "normalize" => PostProcess::MeanPoolAndNormalize,
        "cls" => PostProcess::FirstToken,
        "pooler" => PostProcess::Pooler,
        other => bail!("unknown post-processing '{}'", other),
    })
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 3 {
        eprintln!("Usage: parity <model_dir> <cases.json> [mean|normalize|cls|pooler|none]");
        std::process::exit(1);
    }
    let post = post_process(args.get(3).map(String::as_str))?;

    let content = fs::read_to_string(&args[2])
        .with_context(|| format!("failed to read {}", args[2]))?;
    let cases: Vec<JsonCase> = serde_json::from_str(&content)?;

    let mut harness = ParityHarness::new();
    harness.add_cases(cases.into_iter().map(ParityCase::from));
    println!("Loaded {} cases", harness.cases().len());

    let bundle = BundleLoader::new(&args[1]).build()?;
    println!("Model: {}\n", bundle.model().architecture());

    let single = harness.run_bundle(&bundle, None, post);
    println!("Single\n{}", single);

    let batch = harness.run_bundle_batch(&bundle, bundle.model().pad_token_id(), None, post);
    println!("Batch\n{}", batch);

    for summary in [&single, &batch] {
        for result in summary.results.values().filter(|r| !r.passed) {
            println!(
                "  {}: max |diff| {:.2e}, cosine {:.6}, len {} vs {}",
                result.name,
                result.max_abs_diff,
                result.cosine,
                result.actual_len,
                result.expected_len
            );
            if let Some(ref err) = result.error {
                println!("    error: {}", err);
            }
        }
    }

    if single.all_passed() && batch.all_passed() {
        println!("\nAll cases match");
        Ok(())
    } else {
        eprintln!(
            "\n{} single and {} batch failures",
            single.failed, batch.failed
        );
        std::process::exit(1);
    }
}
