//! Per-module migration guidance injected into prompts and scoring.

use serde::{Deserialize, Serialize};

/// Strategy hints for translating one module.
///
/// Defaults describe a plain object-oriented-to-procedural translation and
/// are used whenever no module-specific guidance is configured.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Guidance {
    /// One-line description of the overall approach.
    pub strategy: String,
    /// Pitfalls the generator must address.
    pub critical_concerns: Vec<String>,
    /// Idioms expected in the output; presence is rewarded during scoring.
    pub recommended_patterns: Vec<String>,
}

impl Default for Guidance {
    fn default() -> Self {
        Self {
            strategy: "translate each class to a struct with methods, preserving behavior exactly"
                .to_string(),
            critical_concerns: vec![
                "preserve mutable state semantics across method calls".to_string(),
                "keep output formatting byte-identical".to_string(),
            ],
            recommended_patterns: vec!["struct".to_string(), "func".to_string()],
        }
    }
}
