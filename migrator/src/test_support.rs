//! Test-only helpers: module builders and scripted collaborators.

use std::collections::HashMap;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Result, anyhow};

use crate::core::behavior::ExecutionRecord;
use crate::core::context::{RetrievalMode, RetrievedContext, RetrievedSnippet};
use crate::core::module::{DependencyDecl, ModuleUnit};
use crate::io::generator::{GenerationRequest, Generator};
use crate::io::retrieval::ContextRetriever;
use crate::io::sandbox::{Sandbox, SandboxMode, SandboxRequest};

/// Create a module with resolved dependencies and a deterministic location.
pub fn module(id: &str, deps: &[&str]) -> ModuleUnit {
    ModuleUnit {
        id: id.to_string(),
        location: PathBuf::from(format!("{}.java", id.replace('.', "/"))),
        dependencies: deps
            .iter()
            .map(|d| DependencyDecl::Resolved(d.to_string()))
            .collect(),
    }
}

/// Create a module with a single wildcard dependency on `namespace`.
pub fn module_with_wildcard(id: &str, namespace: &str) -> ModuleUnit {
    ModuleUnit {
        id: id.to_string(),
        location: PathBuf::from(format!("{}.java", id.replace('.', "/"))),
        dependencies: vec![DependencyDecl::Wildcard(namespace.to_string())],
    }
}

/// Create a snippet with full relevance and a synthetic source id.
pub fn snippet(text: &str) -> RetrievedSnippet {
    RetrievedSnippet {
        text: text.to_string(),
        source: "snippet".to_string(),
        relevance: 1.0,
    }
}

/// Create a successful execution record with the given stdout.
pub fn exec_ok(stdout: &str) -> ExecutionRecord {
    ExecutionRecord {
        succeeded: true,
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: Some(0),
    }
}

/// Create a failed execution record with the given stderr.
pub fn exec_failed(stderr: &str) -> ExecutionRecord {
    ExecutionRecord {
        succeeded: false,
        stdout: String::new(),
        stderr: stderr.to_string(),
        exit_code: Some(1),
    }
}

/// Generator returning predetermined completions in order.
///
/// An exhausted script fails the way a crashed backend would, which doubles
/// as the generator-failure fixture.
pub struct ScriptedGenerator {
    completions: Mutex<VecDeque<String>>,
}

impl ScriptedGenerator {
    pub fn new(completions: &[&str]) -> Self {
        Self {
            completions: Mutex::new(completions.iter().map(|c| c.to_string()).collect()),
        }
    }
}

impl Generator for ScriptedGenerator {
    fn generate(&self, _request: &GenerationRequest) -> Result<String> {
        self.completions
            .lock()
            .expect("completions lock")
            .pop_front()
            .ok_or_else(|| anyhow!("scripted generator exhausted"))
    }
}

/// Sandbox returning predetermined records.
///
/// Build results are consumed in call order. Run results are keyed by
/// language so the parallel original/candidate pair stays deterministic; the
/// last record for a language repeats once its queue drains.
pub struct ScriptedSandbox {
    builds: Mutex<VecDeque<ExecutionRecord>>,
    runs: Mutex<HashMap<String, VecDeque<ExecutionRecord>>>,
}

impl ScriptedSandbox {
    pub fn new() -> Self {
        Self {
            builds: Mutex::new(VecDeque::new()),
            runs: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_build(self, record: ExecutionRecord) -> Self {
        self.builds.lock().expect("builds lock").push_back(record);
        self
    }

    pub fn with_run(self, language: &str, record: ExecutionRecord) -> Self {
        self.runs
            .lock()
            .expect("runs lock")
            .entry(language.to_string())
            .or_default()
            .push_back(record);
        self
    }
}

impl Default for ScriptedSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl Sandbox for ScriptedSandbox {
    fn execute(&self, request: &SandboxRequest) -> Result<ExecutionRecord> {
        match request.mode {
            SandboxMode::BuildOnly => {
                let mut builds = self.builds.lock().expect("builds lock");
                match builds.len() {
                    0 => Err(anyhow!("scripted sandbox has no build result")),
                    1 => Ok(builds.front().expect("front").clone()),
                    _ => Ok(builds.pop_front().expect("pop")),
                }
            }
            SandboxMode::Run => {
                let mut runs = self.runs.lock().expect("runs lock");
                let queue = runs
                    .get_mut(&request.language)
                    .ok_or_else(|| anyhow!("scripted sandbox has no runs for {}", request.language))?;
                match queue.len() {
                    0 => Err(anyhow!("scripted sandbox exhausted for {}", request.language)),
                    1 => Ok(queue.front().expect("front").clone()),
                    _ => Ok(queue.pop_front().expect("pop")),
                }
            }
        }
    }
}

/// Retriever returning a fixed context.
pub struct StaticRetriever {
    context: RetrievedContext,
}

impl StaticRetriever {
    pub fn degraded() -> Self {
        Self {
            context: RetrievedContext::degraded(),
        }
    }

    pub fn with_snippets(snippets: Vec<RetrievedSnippet>) -> Self {
        Self {
            context: RetrievedContext {
                mode: RetrievalMode::Real,
                snippets,
            },
        }
    }
}

impl ContextRetriever for StaticRetriever {
    fn retrieve(&self, _query: &str, top_k: usize) -> Result<RetrievedContext> {
        let mut context = self.context.clone();
        context.snippets.truncate(top_k);
        Ok(context)
    }
}
