//! Retrieved reference context attached to generation prompts.

use serde::{Deserialize, Serialize};

/// Where the snippets for a prompt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalMode {
    /// Snippets were retrieved from a populated index.
    Real,
    /// No index was available; the run proceeds without reference context.
    Degraded,
}

/// One reference snippet ranked by relevance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedSnippet {
    pub text: String,
    /// Identifier of the indexed document the snippet came from.
    pub source: String,
    pub relevance: f64,
}

/// Context block for a single module's prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedContext {
    pub mode: RetrievalMode,
    /// Highest relevance first.
    pub snippets: Vec<RetrievedSnippet>,
}

impl RetrievedContext {
    /// Context for a run with no usable index.
    pub fn degraded() -> Self {
        Self {
            mode: RetrievalMode::Degraded,
            snippets: Vec::new(),
        }
    }
}
