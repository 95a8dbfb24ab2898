//! Per-run artifacts under `.migrator/runs/<run-id>/`.
//!
//! Every module gets a numbered directory per attempt holding the raw
//! completion, extracted candidate, and score breakdown. The run report is
//! the durable summary consumed by humans and CI.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::behavior::BehaviorComparison;
use crate::core::reward::RewardRecord;

/// Why a module ended up not accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    /// Every attempt was scored and rejected.
    MaxRetriesExceeded,
    /// The generator backend itself failed (timeout, crash, bad exit).
    GeneratorFailed,
    /// The module's source file was missing or unreadable.
    SourceUnavailable,
    /// The run was cancelled before this module finished.
    Cancelled,
}

/// Terminal state of one module's migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MigrationStatus {
    Accepted,
    Failed { reason: FailureReason },
}

/// Artifacts persisted for one generation attempt.
#[derive(Debug, Clone)]
pub struct AttemptArtifacts {
    /// 1-based attempt number that produced these artifacts.
    pub attempt: u32,
    pub temperature: f64,
    /// Raw generator completion.
    pub completion: String,
    /// Extracted candidate code, when extraction succeeded.
    pub candidate: Option<String>,
    /// Compiler diagnostics from the build check, when it ran.
    pub compile_log: Option<String>,
    pub reward: RewardRecord,
    pub behavior: Option<BehaviorComparison>,
    /// Feedback sent back to the generator, absent on the final attempt.
    pub feedback: Option<String>,
}

/// Summary of one module's migration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleReport {
    pub module_id: String,
    #[serde(flatten)]
    pub status: MigrationStatus,
    /// Attempts consumed, including the accepted one.
    pub attempts: u32,
    pub reward: Option<RewardRecord>,
    pub match_score: Option<f64>,
}

/// Summary of a whole run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub modules: Vec<ModuleReport>,
    pub accepted: usize,
    /// Modules whose candidates were rejected or never produced. A module
    /// cut off by cancellation is no verdict on its candidate and is not
    /// counted here.
    pub failed: usize,
    /// True when the run stopped early on cancellation.
    pub cancelled: bool,
    /// `accepted` over the modules that ran to a verdict, `0.0` when none
    /// did.
    pub success_ratio: f64,
}

impl RunReport {
    pub fn from_modules(run_id: &str, modules: Vec<ModuleReport>, cancelled: bool) -> Self {
        let accepted = modules
            .iter()
            .filter(|m| m.status == MigrationStatus::Accepted)
            .count();
        let interrupted = modules
            .iter()
            .filter(|m| {
                matches!(
                    &m.status,
                    MigrationStatus::Failed {
                        reason: FailureReason::Cancelled
                    }
                )
            })
            .count();
        let failed = modules.len() - accepted - interrupted;
        let scored = accepted + failed;
        let success_ratio = if scored == 0 {
            0.0
        } else {
            accepted as f64 / scored as f64
        };
        Self {
            run_id: run_id.to_string(),
            modules,
            accepted,
            failed,
            cancelled,
            success_ratio,
        }
    }
}

/// Filesystem layout for one run.
#[derive(Debug, Clone)]
pub struct RunPaths {
    run_dir: PathBuf,
}

impl RunPaths {
    pub fn new(root: &Path, run_id: &str) -> Self {
        Self {
            run_dir: root.join(".migrator").join("runs").join(run_id),
        }
    }

    pub fn module_dir(&self, module_id: &str) -> PathBuf {
        self.run_dir.join(module_id)
    }

    pub fn attempt_dir(&self, module_id: &str, attempt: u32) -> PathBuf {
        self.module_dir(module_id).join(attempt.to_string())
    }

    pub fn report_path(&self) -> PathBuf {
        self.run_dir.join("report.json")
    }
}

/// Persist one attempt's artifacts under the module's run directory.
pub fn write_attempt_artifacts(
    paths: &RunPaths,
    module_id: &str,
    target_extension: &str,
    artifacts: &AttemptArtifacts,
) -> Result<()> {
    let dir = paths.attempt_dir(module_id, artifacts.attempt);
    fs::create_dir_all(&dir).with_context(|| format!("create attempt dir {}", dir.display()))?;

    fs::write(dir.join("completion.md"), &artifacts.completion)
        .with_context(|| format!("write completion for {module_id}"))?;
    if let Some(candidate) = &artifacts.candidate {
        fs::write(dir.join(format!("candidate.{target_extension}")), candidate)
            .with_context(|| format!("write candidate for {module_id}"))?;
    }
    if let Some(compile_log) = &artifacts.compile_log {
        fs::write(dir.join("compile.log"), compile_log)
            .with_context(|| format!("write compile log for {module_id}"))?;
    }
    if let Some(feedback) = &artifacts.feedback {
        fs::write(dir.join("feedback.md"), feedback)
            .with_context(|| format!("write feedback for {module_id}"))?;
    }

    let summary = serde_json::json!({
        "attempt": artifacts.attempt,
        "temperature": artifacts.temperature,
        "reward": artifacts.reward,
        "behavior": artifacts.behavior,
    });
    let mut buf = serde_json::to_string_pretty(&summary).context("serialize attempt summary")?;
    buf.push('\n');
    fs::write(dir.join("attempt.json"), buf)
        .with_context(|| format!("write attempt summary for {module_id}"))?;

    debug!(module_id, attempt = artifacts.attempt, "wrote attempt artifacts");
    Ok(())
}

/// Persist the run report.
pub fn write_run_report(paths: &RunPaths, report: &RunReport) -> Result<()> {
    let path = paths.report_path();
    let parent = path
        .parent()
        .with_context(|| format!("report path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(report).context("serialize run report")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp report {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path)
        .with_context(|| format!("replace report {}", path.display()))?;
    Ok(())
}

/// Load a run report written by [`write_run_report`].
pub fn load_run_report(path: &Path) -> Result<RunReport> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read report {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse report {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted(module_id: &str) -> ModuleReport {
        ModuleReport {
            module_id: module_id.to_string(),
            status: MigrationStatus::Accepted,
            attempts: 1,
            reward: Some(RewardRecord::zero()),
            match_score: Some(1.0),
        }
    }

    fn failed(module_id: &str, reason: FailureReason) -> ModuleReport {
        ModuleReport {
            module_id: module_id.to_string(),
            status: MigrationStatus::Failed { reason },
            attempts: 4,
            reward: Some(RewardRecord::zero()),
            match_score: Some(0.3),
        }
    }

    /// The ratio counts accepted modules over all modules.
    #[test]
    fn run_report_computes_success_ratio() {
        let report = RunReport::from_modules(
            "run-1",
            vec![
                accepted("a.One"),
                failed("a.Two", FailureReason::MaxRetriesExceeded),
                accepted("a.Three"),
                accepted("a.Four"),
            ],
            false,
        );
        assert_eq!(report.accepted, 3);
        assert_eq!(report.failed, 1);
        assert_eq!(report.success_ratio, 0.75);
    }

    /// A module cut off by cancellation is no verdict on its candidate, so
    /// it counts neither as failed nor in the ratio.
    #[test]
    fn cancelled_module_does_not_count_as_failed() {
        let report = RunReport::from_modules(
            "run-1",
            vec![
                accepted("a.One"),
                failed("a.Two", FailureReason::MaxRetriesExceeded),
                failed("a.Three", FailureReason::Cancelled),
            ],
            true,
        );
        assert_eq!(report.accepted, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(report.success_ratio, 0.5);

        let report = RunReport::from_modules(
            "run-2",
            vec![failed("a.One", FailureReason::Cancelled)],
            true,
        );
        assert_eq!(report.failed, 0);
        assert_eq!(report.success_ratio, 0.0);
    }

    #[test]
    fn run_report_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run-1");
        let report = RunReport::from_modules(
            "run-1",
            vec![accepted("a.One"), failed("a.Two", FailureReason::Cancelled)],
            true,
        );
        write_run_report(&paths, &report).expect("write");
        let loaded = load_run_report(&paths.report_path()).expect("load");
        assert_eq!(loaded, report);
    }

    /// Attempt artifacts land in a numbered directory per attempt, with the
    /// candidate named by target extension.
    #[test]
    fn attempt_artifacts_are_persisted_per_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let paths = RunPaths::new(temp.path(), "run-1");
        let artifacts = AttemptArtifacts {
            attempt: 2,
            temperature: 0.2,
            completion: "<code>package main</code>".to_string(),
            candidate: Some("package main".to_string()),
            compile_log: Some("ok".to_string()),
            reward: RewardRecord::zero(),
            behavior: None,
            feedback: None,
        };

        write_attempt_artifacts(&paths, "a.One", "go", &artifacts).expect("write");

        let dir = paths.attempt_dir("a.One", 2);
        assert!(dir.join("completion.md").exists());
        assert!(dir.join("candidate.go").exists());
        assert!(dir.join("compile.log").exists());
        assert!(dir.join("attempt.json").exists());
        assert!(!dir.join("feedback.md").exists());
    }
}
