//! Reference parity harness.
//!
//! Compares embeddings produced here against vectors dumped from the
//! reference frameworks (one float per line, row-major for batches).
//!
//! # Example
//!
//! ```rust,ignore
//! use sprig_core::parity::{ParityCase, ParityHarness};
//!
//! let mut harness = ParityHarness::new();
//! harness.add_case(ParityCase::from_lines("plain", "Text to encode", &dump));
//!
//! let summary = harness.run_bundle(&bundle, Some(512), PostProcess::FirstToken);
//! assert!(summary.all_passed(), "{}", summary);
//! ```

use crate::bundle::{ModelBundle, PostProcess};
use crate::error::Result;
use std::collections::HashMap;
use std::fmt;

/// Inputs every architecture is checked on: plain text, empty text and multi-byte text.
pub const REFERENCE_TEXTS: [&str; 3] = ["Text to encode", "", "🪐 Text to encode 🔥"];

/// Default absolute tolerance.
pub const DEFAULT_TOLERANCE: f32 = 1e-5;

/// Whether every element of `a` is within `atol` of `b`; lengths must match.
pub fn all_close(a: &[f32], b: &[f32], atol: f32) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() <= atol)
}

fn max_abs_diff(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).abs()).fold(0.0, f32::max)
}

fn cosine(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 && nb == 0.0 {
        1.0
    } else {
        dot / (na * nb).max(1e-12)
    }
}

/// One reference vector.
#[derive(Debug, Clone)]
pub struct ParityCase {
    /// Case name.
    pub name: String,
    /// Input text.
    pub text: String,
    /// Reference output, flattened.
    pub expected: Vec<f32>,
    /// Absolute tolerance.
    pub tolerance: f32,
    /// Optional description.
    pub description: Option<String>,
    /// Tags for filtering.
    pub tags: Vec<String>,
}

impl ParityCase {
    /// Case with the default tolerance.
    pub fn new(name: impl Into<String>, text: impl Into<String>, expected: Vec<f32>) -> Self {
        Self {
            name: name.into(),
            text: text.into(),
            expected,
            tolerance: DEFAULT_TOLERANCE,
            description: None,
            tags: Vec::new(),
        }
    }

    /// Case from a whitespace/newline separated dump. Unparseable fields are skipped.
    pub fn from_lines(name: impl Into<String>, text: impl Into<String>, dump: &str) -> Self {
        let expected = dump
            .split_whitespace()
            .filter_map(|v| v.parse().ok())
            .collect();
        Self::new(name, text, expected)
    }

    /// Set tolerance.
    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Add a tag to the case.
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set description.
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }
}

/// Outcome of one case.
#[derive(Debug, Clone)]
pub struct ParityResult {
    /// Case name.
    pub name: String,
    /// Whether the case passed.
    pub passed: bool,
    /// Largest elementwise difference.
    pub max_abs_diff: f32,
    /// Cosine similarity of the two vectors.
    pub cosine: f32,
    /// Reference length.
    pub expected_len: usize,
    /// Produced length.
    pub actual_len: usize,
    /// Error message, for failures.
    pub error: Option<String>,
    /// Execution time in milliseconds.
    pub time_ms: f64,
}

impl ParityResult {
    /// Compare `actual` against a case.
    pub fn compare(case: &ParityCase, actual: &[f32], time_ms: f64) -> Self {
        let expected = &case.expected;
        let same_len = expected.len() == actual.len();
        let max_abs_diff = if same_len {
            max_abs_diff(expected, actual)
        } else {
            f32::INFINITY
        };
        let passed = same_len && all_close(expected, actual, case.tolerance);
        let error = if !same_len {
            Some(format!(
                "length mismatch: expected {}, got {}",
                expected.len(),
                actual.len()
            ))
        } else if !passed {
            Some(format!(
                "max abs diff {:.3e} exceeds {:.1e}",
                max_abs_diff, case.tolerance
            ))
        } else {
            None
        };

        Self {
            name: case.name.clone(),
            passed,
            max_abs_diff,
            cosine: if same_len { cosine(expected, actual) } else { 0.0 },
            expected_len: expected.len(),
            actual_len: actual.len(),
            error,
            time_ms,
        }
    }

    /// Create an error result.
    pub fn error(name: String, error: String) -> Self {
        Self {
            name,
            passed: false,
            max_abs_diff: f32::INFINITY,
            cosine: 0.0,
            expected_len: 0,
            actual_len: 0,
            error: Some(error),
            time_ms: 0.0,
        }
    }
}

impl fmt::Display for ParityResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.passed { "PASS" } else { "FAIL" };
        write!(
            f,
            "[{}] {} ({:.1}ms, max diff {:.2e}, cosine {:.6})",
            status, self.name, self.time_ms, self.max_abs_diff, self.cosine
        )?;
        if let Some(ref err) = self.error {
            write!(f, "\n  Error: {}", err)?;
        }
        Ok(())
    }
}

/// Summary of a run.
#[derive(Debug, Clone, Default)]
pub struct ParitySummary {
    /// Total number of cases.
    pub total: usize,
    /// Number of passed cases.
    pub passed: usize,
    /// Number of failed cases.
    pub failed: usize,
    /// Total execution time in milliseconds.
    pub total_time_ms: f64,
    /// Results by name.
    pub results: HashMap<String, ParityResult>,
}

impl ParitySummary {
    /// Create from results.
    pub fn from_results(results: Vec<ParityResult>) -> Self {
        let total = results.len();
        let passed = results.iter().filter(|r| r.passed).count();
        let total_time_ms = results.iter().map(|r| r.time_ms).sum();
        Self {
            total,
            passed,
            failed: total - passed,
            total_time_ms,
            results: results.into_iter().map(|r| (r.name.clone(), r)).collect(),
        }
    }

    /// Check if all cases passed.
    pub fn all_passed(&self) -> bool {
        self.failed == 0
    }

    /// Failure rate in percent.
    pub fn failure_rate(&self) -> f32 {
        if self.total == 0 {
            return 0.0;
        }
        (self.failed as f32 / self.total as f32) * 100.0
    }
}

impl fmt::Display for ParitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Parity Summary")?;
        writeln!(f, "==============")?;
        writeln!(f, "Total:  {}", self.total)?;
        writeln!(f, "Passed: {}", self.passed)?;
        writeln!(f, "Failed: {} ({:.1}%)", self.failed, self.failure_rate())?;
        writeln!(f, "Time:   {:.1}ms", self.total_time_ms)?;

        if self.failed > 0 {
            writeln!(f, "\nFailed cases:")?;
            let mut names: Vec<&String> = self.results.keys().collect();
            names.sort();
            for name in names {
                let result = &self.results[name];
                if !result.passed {
                    writeln!(f, "  - {}", result)?;
                }
            }
        }
        Ok(())
    }
}

/// Collection of parity cases.
#[derive(Debug, Clone, Default)]
pub struct ParityHarness {
    cases: Vec<ParityCase>,
}

impl ParityHarness {
    /// Empty harness.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a case.
    pub fn add_case(&mut self, case: ParityCase) {
        self.cases.push(case);
    }

    /// Add multiple cases.
    pub fn add_cases(&mut self, cases: impl IntoIterator<Item = ParityCase>) {
        self.cases.extend(cases);
    }

    /// All cases.
    pub fn cases(&self) -> &[ParityCase] {
        &self.cases
    }

    /// Cases carrying `tag`.
    pub fn filter_by_tag(&self, tag: &str) -> Vec<&ParityCase> {
        self.cases
            .iter()
            .filter(|c| c.tags.iter().any(|t| t == tag))
            .collect()
    }

    /// Run every case through `embed`, one text at a time.
    pub fn run_with<F>(&self, mut embed: F) -> ParitySummary
    where
        F: FnMut(&str) -> Result<Vec<f32>>,
    {
        let results = self
            .cases
            .iter()
            .map(|case| {
                let start = std::time::Instant::now();
                match embed(&case.text) {
                    Ok(actual) => {
                        let elapsed = start.elapsed().as_secs_f64() * 1000.0;
                        ParityResult::compare(case, &actual, elapsed)
                    }
                    Err(e) => ParityResult::error(case.name.clone(), e.to_string()),
                }
            })
            .collect();
        ParitySummary::from_results(results)
    }

    /// Single-text encode through a bundle.
    pub fn run_bundle(
        &self,
        bundle: &ModelBundle,
        max_length: Option<usize>,
        post: PostProcess,
    ) -> ParitySummary {
        self.run_with(|text| {
            Ok(bundle
                .encode(text, max_length, post)?
                .flatten_all()?
                .to_vec1::<f32>()?)
        })
    }

    /// All texts in one padded batch; row `i` is compared with case `i`.
    pub fn run_bundle_batch(
        &self,
        bundle: &ModelBundle,
        pad_token_id: u32,
        max_length: Option<usize>,
        post: PostProcess,
    ) -> ParitySummary {
        let texts: Vec<&str> = self.cases.iter().map(|c| c.text.as_str()).collect();
        let start = std::time::Instant::now();
        let rows = bundle
            .batch_encode(&texts, pad_token_id, max_length, post)
            .and_then(|t| Ok(t.flatten(1, t.rank().saturating_sub(1))?.to_vec2::<f32>()?));
        let elapsed = start.elapsed().as_secs_f64() * 1000.0;

        let results = match rows {
            Ok(rows) => self
                .cases
                .iter()
                .zip(rows)
                .map(|(case, row)| ParityResult::compare(case, &row, elapsed))
                .collect(),
            Err(e) => self
                .cases
                .iter()
                .map(|case| ParityResult::error(case.name.clone(), e.to_string()))
                .collect(),
        };
        ParitySummary::from_results(results)
    }
}
