//! Reference snippet retrieval from a keyword index.
//!
//! The index is a JSON array of documents in the target language. Scoring is
//! plain keyword frequency: good enough to surface idiomatic reference code
//! for the prompt, with a degraded no-op fallback when no index exists.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::core::context::{RetrievalMode, RetrievedContext, RetrievedSnippet};

/// Query terms shorter than this carry no signal.
const MIN_TOKEN_LEN: usize = 3;

/// One indexed reference document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDocument {
    pub id: String,
    pub text: String,
}

/// Abstraction over snippet retrieval backends.
pub trait ContextRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievedContext>;
}

impl<T: ContextRetriever + ?Sized> ContextRetriever for Box<T> {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievedContext> {
        (**self).retrieve(query, top_k)
    }
}

/// Retriever backed by a JSON document index.
pub struct JsonIndexRetriever {
    documents: Vec<IndexDocument>,
}

impl JsonIndexRetriever {
    /// Load the index from a JSON file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read index {}", path.display()))?;
        let documents: Vec<IndexDocument> = serde_json::from_str(&contents)
            .with_context(|| format!("parse index {}", path.display()))?;
        info!(documents = documents.len(), "loaded retrieval index");
        Ok(Self { documents })
    }

    #[cfg(any(test, feature = "test-support"))]
    pub fn from_documents(documents: Vec<IndexDocument>) -> Self {
        Self { documents }
    }
}

impl ContextRetriever for JsonIndexRetriever {
    #[instrument(skip_all, fields(top_k))]
    fn retrieve(&self, query: &str, top_k: usize) -> Result<RetrievedContext> {
        let terms = query_terms(query);
        if terms.is_empty() || self.documents.is_empty() {
            return Ok(RetrievedContext::degraded());
        }

        let mut scored: Vec<(f64, &IndexDocument)> = self
            .documents
            .iter()
            .map(|doc| (keyword_score(&terms, &doc.text), doc))
            .filter(|(score, _)| *score > 0.0)
            .collect();
        // Stable ranking: score desc, then document id for ties.
        scored.sort_by(|a, b| {
            b.0.partial_cmp(&a.0)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.1.id.cmp(&b.1.id))
        });

        let max_score = scored.first().map_or(1.0, |(s, _)| *s);
        let snippets: Vec<RetrievedSnippet> = scored
            .into_iter()
            .take(top_k)
            .map(|(score, doc)| RetrievedSnippet {
                text: doc.text.clone(),
                source: doc.id.clone(),
                relevance: score / max_score,
            })
            .collect();

        debug!(matched = snippets.len(), "retrieval complete");
        if snippets.is_empty() {
            return Ok(RetrievedContext::degraded());
        }
        Ok(RetrievedContext {
            mode: RetrievalMode::Real,
            snippets,
        })
    }
}

/// Retriever for runs without an index; always degraded.
pub struct NullRetriever;

impl ContextRetriever for NullRetriever {
    fn retrieve(&self, _query: &str, _top_k: usize) -> Result<RetrievedContext> {
        Ok(RetrievedContext::degraded())
    }
}

/// Query terms, preferring capitalized identifiers (type and method names
/// carry far more signal than keywords like `public`).
fn query_terms(text: &str) -> Vec<String> {
    let tokens: Vec<&str> = text
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|t| t.len() >= MIN_TOKEN_LEN)
        .collect();
    let capitalized: Vec<String> = tokens
        .iter()
        .filter(|t| t.chars().next().is_some_and(char::is_uppercase))
        .map(|t| t.to_lowercase())
        .collect();
    if capitalized.is_empty() {
        tokens.iter().map(|t| t.to_lowercase()).collect()
    } else {
        capitalized
    }
}

/// Sum of query-term occurrences in the document.
fn keyword_score(terms: &[String], text: &str) -> f64 {
    let lowered = text.to_lowercase();
    terms
        .iter()
        .map(|term| lowered.matches(term.as_str()).count())
        .sum::<usize>() as f64
}
