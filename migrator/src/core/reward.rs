//! Reward and penalty scoring for generated candidates.
//!
//! All coefficients live on one [`ScoringPolicy`] so the acceptance rules
//! are named and configurable instead of scattered magic numbers. Scoring is
//! a pure function of its inputs and never touches I/O.

use serde::{Deserialize, Serialize};

use crate::core::behavior::BehaviorComparison;
use crate::core::context::RetrievedSnippet;
use crate::core::guidance::Guidance;

/// Minimum total for the guided acceptance gate.
pub const GUIDED_MIN_TOTAL: f64 = 8.0;
/// Behavior match score a candidate must exceed under either gate.
pub const BEHAVIOR_MATCH_THRESHOLD: f64 = 0.8;
/// Match score below which the state-divergence penalty applies.
pub const DIVERGENCE_THRESHOLD: f64 = 0.5;

/// How many leading tokens of a snippet count toward pattern alignment.
const SNIPPET_LEADING_TOKENS: usize = 10;

/// Acceptance rule applied to a scored candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcceptanceGate {
    /// Full guided scoring: total >= [`GUIDED_MIN_TOTAL`] and match score
    /// above [`BEHAVIOR_MATCH_THRESHOLD`].
    Guided,
    /// Stricter variant for modules processed without guided scoring:
    /// any positive total and match score above the threshold.
    BehaviorOnly,
}

/// Named scoring coefficients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringPolicy {
    /// Awarded when the candidate builds (`3`).
    pub compile_bonus: f64,
    /// Awarded on byte-exact trimmed output (`5`).
    pub exact_output_bonus: f64,
    /// Awarded alongside the exact-output bonus for a reproducible run (`5`).
    pub determinism_bonus: f64,
    /// Awarded when match score exceeds the threshold without being exact (`3`).
    pub partial_match_bonus: f64,
    /// Charged when match score falls below [`DIVERGENCE_THRESHOLD`] (`10`).
    pub state_divergence_penalty: f64,
    /// Charged when either side failed to execute at all (`8`).
    pub execution_failure_penalty: f64,
    /// Cap on the pattern-alignment component (`5`).
    pub pattern_alignment_cap: u32,
    /// Cap on the guidance-compliance component (`2`).
    pub guidance_compliance_cap: u32,
    pub gate: AcceptanceGate,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            compile_bonus: 3.0,
            exact_output_bonus: 5.0,
            determinism_bonus: 5.0,
            partial_match_bonus: 3.0,
            state_divergence_penalty: 10.0,
            execution_failure_penalty: 8.0,
            pattern_alignment_cap: 5,
            guidance_compliance_cap: 2,
            gate: AcceptanceGate::Guided,
        }
    }
}

/// Scored breakdown for one generation attempt.
///
/// Invariant: `total` equals the sum of reward components minus the sum of
/// penalty components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardRecord {
    pub compilation: f64,
    pub behavior: f64,
    pub pattern_alignment: f64,
    pub guidance_compliance: f64,
    pub state_divergence: f64,
    pub execution_failure: f64,
    pub total: f64,
}

impl RewardRecord {
    /// The all-zero record used when compilation fails.
    pub fn zero() -> Self {
        Self {
            compilation: 0.0,
            behavior: 0.0,
            pattern_alignment: 0.0,
            guidance_compliance: 0.0,
            state_divergence: 0.0,
            execution_failure: 0.0,
            total: 0.0,
        }
    }

    fn finish(mut self) -> Self {
        self.total = self.compilation + self.behavior + self.pattern_alignment
            + self.guidance_compliance
            - self.state_divergence
            - self.execution_failure;
        self
    }
}

impl ScoringPolicy {
    /// Score a compiled candidate against its behavior comparison, retrieved
    /// context, and guidance.
    ///
    /// A failed compile yields the zero record; the retry loop never invokes
    /// the behavior check in that case.
    pub fn score(
        &self,
        compile_ok: bool,
        behavior: &BehaviorComparison,
        snippets: &[RetrievedSnippet],
        guidance: &Guidance,
        candidate: &str,
    ) -> RewardRecord {
        if !compile_ok {
            return RewardRecord::zero();
        }

        let mut record = RewardRecord::zero();
        record.compilation = self.compile_bonus;

        if behavior.exact_match {
            record.behavior = self.exact_output_bonus + self.determinism_bonus;
        } else if behavior.match_score > BEHAVIOR_MATCH_THRESHOLD {
            record.behavior = self.partial_match_bonus;
        }

        if behavior.match_score < DIVERGENCE_THRESHOLD {
            record.state_divergence = self.state_divergence_penalty;
        }
        // Stacks with the divergence penalty when both conditions hold.
        if behavior.execution_failed {
            record.execution_failure = self.execution_failure_penalty;
        }

        record.pattern_alignment =
            f64::from(pattern_alignment(snippets, candidate).min(self.pattern_alignment_cap));
        record.guidance_compliance =
            f64::from(guidance_compliance(guidance, candidate).min(self.guidance_compliance_cap));

        record.finish()
    }

    /// Apply the configured acceptance gate.
    pub fn accepted(&self, record: &RewardRecord, match_score: f64) -> bool {
        let behavior_ok = match_score > BEHAVIOR_MATCH_THRESHOLD;
        match self.gate {
            AcceptanceGate::Guided => record.total >= GUIDED_MIN_TOTAL && behavior_ok,
            AcceptanceGate::BehaviorOnly => record.total > 0.0 && behavior_ok,
        }
    }
}

/// Count snippets whose leading tokens appear verbatim in the candidate.
fn pattern_alignment(snippets: &[RetrievedSnippet], candidate: &str) -> u32 {
    snippets
        .iter()
        .filter(|snippet| {
            snippet
                .text
                .split_whitespace()
                .take(SNIPPET_LEADING_TOKENS)
                .any(|token| candidate.contains(token))
        })
        .count() as u32
}

/// Count recommended patterns present in the candidate, case-insensitive.
fn guidance_compliance(guidance: &Guidance, candidate: &str) -> u32 {
    let lowered = candidate.to_lowercase();
    guidance
        .recommended_patterns
        .iter()
        .filter(|pattern| lowered.contains(&pattern.to_lowercase()))
        .count() as u32
}
