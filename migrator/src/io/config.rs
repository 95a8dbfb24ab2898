//! Migrator configuration stored under `.migrator/state/config.toml`.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::guidance::Guidance;
use crate::core::reward::ScoringPolicy;

/// Migrator configuration (TOML).
///
/// This file is intended to be edited by humans and must remain stable and
/// automatable. Missing fields default to sensible values.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MigratorConfig {
    /// Language of the legacy codebase being scanned.
    pub source_language: String,

    /// Language the modules are translated into.
    pub target_language: String,

    /// Additional generation attempts after the first, per module.
    pub max_retries: u32,

    /// Wall-clock budget for one generator invocation, in seconds.
    pub generator_timeout_secs: u64,

    /// Wall-clock budget for one sandbox build, in seconds.
    pub compile_timeout_secs: u64,

    /// Wall-clock budget for one sandbox run, in seconds.
    pub execution_timeout_secs: u64,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Byte budget for rendered generation prompts.
    pub prompt_budget_bytes: usize,

    /// Hard bound on transcript length, in turns.
    pub max_transcript_turns: usize,

    /// Sampling temperature for the first attempt.
    pub base_temperature: f64,

    /// Added to the temperature on each retry, capped at 1.0.
    pub retry_temperature_step: f64,

    pub generator: GeneratorConfig,
    pub retrieval: RetrievalConfig,
    pub sandbox: SandboxConfig,
    pub scoring: ScoringPolicy,

    /// Default guidance applied to every module.
    pub guidance: Guidance,

    /// Per-module guidance overrides, keyed by qualified module id.
    pub module_guidance: BTreeMap<String, Guidance>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Command that produces a completion from a transcript on stdin
    /// (e.g. `["l2g-generate"]`).
    pub command: Vec<String>,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            command: vec!["l2g-generate".to_string()],
        }
    }
}

/// What to do when the retrieval index is missing or unreadable.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MissingIndexPolicy {
    /// Run in degraded mode without reference context.
    Proceed,
    /// Refuse to start the run.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Path to the JSON snippet index; `None` always runs degraded.
    pub index_path: Option<PathBuf>,
    /// Snippets attached to each prompt.
    pub top_k: usize,
    pub missing_index: MissingIndexPolicy,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            top_k: 3,
            missing_index: MissingIndexPolicy::Proceed,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SandboxConfig {
    /// Memory limit passed to the container runtime.
    pub memory: String,
    /// CPU limit passed to the container runtime.
    pub cpus: String,
    /// Container image per language.
    pub images: BTreeMap<String, String>,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        let mut images = BTreeMap::new();
        images.insert("java".to_string(), "openjdk:17-slim".to_string());
        images.insert("go".to_string(), "golang:1.21-alpine".to_string());
        Self {
            memory: "256m".to_string(),
            cpus: "0.5".to_string(),
            images,
        }
    }
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            source_language: "java".to_string(),
            target_language: "go".to_string(),
            max_retries: 3,
            generator_timeout_secs: 10 * 60,
            compile_timeout_secs: 2 * 60,
            execution_timeout_secs: 30,
            output_limit_bytes: 100_000,
            prompt_budget_bytes: 40_000,
            max_transcript_turns: 24,
            base_temperature: 0.1,
            retry_temperature_step: 0.1,
            generator: GeneratorConfig::default(),
            retrieval: RetrievalConfig::default(),
            sandbox: SandboxConfig::default(),
            scoring: ScoringPolicy::default(),
            guidance: Guidance::default(),
            module_guidance: BTreeMap::new(),
        }
    }
}

impl MigratorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.source_language.trim().is_empty() || self.target_language.trim().is_empty() {
            return Err(anyhow!("source_language and target_language must be set"));
        }
        if self.generator_timeout_secs == 0
            || self.compile_timeout_secs == 0
            || self.execution_timeout_secs == 0
        {
            return Err(anyhow!("all timeouts must be > 0"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.prompt_budget_bytes == 0 {
            return Err(anyhow!("prompt_budget_bytes must be > 0"));
        }
        if !(0.0..=1.0).contains(&self.base_temperature) {
            return Err(anyhow!("base_temperature must be within [0.0, 1.0]"));
        }
        if self.retry_temperature_step < 0.0 {
            return Err(anyhow!("retry_temperature_step must be >= 0"));
        }
        if self.generator.command.is_empty() || self.generator.command[0].trim().is_empty() {
            return Err(anyhow!("generator.command must be a non-empty array"));
        }
        if self.retrieval.top_k == 0 {
            return Err(anyhow!("retrieval.top_k must be > 0"));
        }
        for language in [&self.source_language, &self.target_language] {
            if !self.sandbox.images.contains_key(language) {
                return Err(anyhow!("sandbox.images is missing an image for '{language}'"));
            }
        }
        Ok(())
    }
}

/// Location of the config file under a scanned repository root.
pub fn default_config_path(root: &Path) -> PathBuf {
    root.join(".migrator").join("state").join("config.toml")
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MigratorConfig::default()`.
pub fn load_config(path: &Path) -> Result<MigratorConfig> {
    if !path.exists() {
        let cfg = MigratorConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MigratorConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MigratorConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
