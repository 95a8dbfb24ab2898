//! Behavioral equivalence between original and translated modules.
//!
//! Comparison is pure: both sides are executed elsewhere and their captured
//! outputs are compared here. The match score lives in `[0.0, 1.0]`.

use serde::{Deserialize, Serialize};

/// How many characters of each output are kept for feedback and reports.
const OUTPUT_PREFIX_CHARS: usize = 400;

/// Captured result of running one side in the sandbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Whether the process ran to completion with a zero exit code.
    pub succeeded: bool,
    pub stdout: String,
    pub stderr: String,
    /// `None` when the process was killed (timeout) or never started.
    pub exit_code: Option<i32>,
}

impl ExecutionRecord {
    /// Record for a run that never produced usable output.
    pub fn failed(stderr: impl Into<String>) -> Self {
        Self {
            succeeded: false,
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code: None,
        }
    }
}

/// Outcome of comparing the two sides' outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehaviorComparison {
    /// Similarity in `[0.0, 1.0]`; `1.0` iff the trimmed outputs are equal.
    pub match_score: f64,
    pub exact_match: bool,
    /// True when either side failed to execute at all.
    pub execution_failed: bool,
    /// Leading slice of each output, for feedback prompts and reports.
    pub original_prefix: String,
    pub candidate_prefix: String,
}

/// Compare the outputs of the original and candidate runs.
///
/// Any execution failure on either side forces a score of `0.0`; there is no
/// partial credit for output produced before a crash. Otherwise equality of
/// the trimmed stdout is exact (`1.0`) and anything else scores by line
/// overlap.
pub fn compare_outputs(original: &ExecutionRecord, candidate: &ExecutionRecord) -> BehaviorComparison {
    let original_prefix = prefix(&original.stdout);
    let candidate_prefix = prefix(&candidate.stdout);

    if !original.succeeded || !candidate.succeeded {
        return BehaviorComparison {
            match_score: 0.0,
            exact_match: false,
            execution_failed: true,
            original_prefix,
            candidate_prefix,
        };
    }

    let left = original.stdout.trim();
    let right = candidate.stdout.trim();
    if left == right {
        return BehaviorComparison {
            match_score: 1.0,
            exact_match: true,
            execution_failed: false,
            original_prefix,
            candidate_prefix,
        };
    }

    BehaviorComparison {
        match_score: line_overlap(left, right).min(0.99),
        exact_match: false,
        execution_failed: false,
        original_prefix,
        candidate_prefix,
    }
}

/// Dice coefficient over line multisets: `2 * |common| / (|a| + |b|)`.
fn line_overlap(left: &str, right: &str) -> f64 {
    let left_lines: Vec<&str> = left.lines().map(str::trim_end).collect();
    let mut right_lines: Vec<Option<&str>> =
        right.lines().map(str::trim_end).map(Some).collect();

    let total = left_lines.len() + right_lines.len();
    if total == 0 {
        return 0.0;
    }

    let mut common = 0usize;
    for line in &left_lines {
        if let Some(slot) = right_lines
            .iter_mut()
            .find(|slot| slot.as_deref() == Some(line))
        {
            *slot = None;
            common += 1;
        }
    }

    (2 * common) as f64 / total as f64
}

fn prefix(output: &str) -> String {
    output.chars().take(OUTPUT_PREFIX_CHARS).collect()
}
