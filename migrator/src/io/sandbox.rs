//! Isolated build and execution of module sources in containers.
//!
//! The [`Sandbox`] trait decouples validation from the container runtime.
//! Tests use scripted sandboxes that return predetermined records without
//! spawning anything. Execution problems (compile errors, crashes, timeouts,
//! a missing runtime) all land in the returned [`ExecutionRecord`] so the
//! retry loop can score them; only local filesystem failures are hard errors.

use std::process::Command;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::core::behavior::ExecutionRecord;
use crate::io::config::SandboxConfig;
use crate::io::process::run_command_with_timeout;

static JAVA_PUBLIC_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"public\s+(?:final\s+|abstract\s+)?(?:class|interface|enum)\s+(\w+)")
        .expect("valid java type regex")
});

/// What the sandbox should do with the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxMode {
    /// Compile only; used for the compilation gate.
    BuildOnly,
    /// Compile and run, capturing program output.
    Run,
}

/// One sandbox invocation.
#[derive(Debug, Clone)]
pub struct SandboxRequest {
    pub code: String,
    /// Language key into the configured image map.
    pub language: String,
    pub mode: SandboxMode,
    pub timeout: Duration,
}

/// Abstraction over container execution backends.
pub trait Sandbox: Sync {
    fn execute(&self, request: &SandboxRequest) -> Result<ExecutionRecord>;
}

/// Sandbox that spawns `docker run` with no network and bounded resources.
pub struct DockerSandbox {
    config: SandboxConfig,
    output_limit_bytes: usize,
}

impl DockerSandbox {
    pub fn new(config: SandboxConfig, output_limit_bytes: usize) -> Self {
        Self {
            config,
            output_limit_bytes,
        }
    }
}

impl Sandbox for DockerSandbox {
    #[instrument(skip_all, fields(language = %request.language, mode = ?request.mode))]
    fn execute(&self, request: &SandboxRequest) -> Result<ExecutionRecord> {
        let image = self
            .config
            .images
            .get(&request.language)
            .ok_or_else(|| anyhow!("no sandbox image configured for '{}'", request.language))?;

        let workdir = tempfile::tempdir().context("create sandbox workdir")?;
        let file_name = source_file_name(&request.language, &request.code);
        std::fs::write(workdir.path().join(&file_name), &request.code)
            .with_context(|| format!("write sandbox source {file_name}"))?;

        let script = shell_script(&request.language, &file_name, request.mode);
        let mut cmd = Command::new("docker");
        cmd.arg("run")
            .arg("--rm")
            .arg("--network")
            .arg("none")
            .arg("--memory")
            .arg(&self.config.memory)
            .arg("--cpus")
            .arg(&self.config.cpus)
            .arg("-v")
            .arg(format!("{}:/work", workdir.path().display()))
            .arg("-w")
            .arg("/work")
            .arg(image)
            .arg("sh")
            .arg("-c")
            .arg(&script);

        let output = match run_command_with_timeout(cmd, None, request.timeout, self.output_limit_bytes)
        {
            Ok(output) => output,
            Err(err) => {
                warn!(err = %err, "container runtime unavailable");
                return Ok(ExecutionRecord::failed(format!(
                    "sandbox could not start: {err:#}"
                )));
            }
        };

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "sandbox timed out");
            return Ok(ExecutionRecord {
                succeeded: false,
                stdout: output.stdout_lossy(),
                stderr: format!(
                    "sandbox timed out after {}s\n{}",
                    request.timeout.as_secs(),
                    output.stderr_lossy()
                ),
                exit_code: None,
            });
        }

        debug!(exit_code = ?output.status.code(), "sandbox finished");
        Ok(ExecutionRecord {
            succeeded: output.status.success(),
            stdout: output.stdout_lossy(),
            stderr: output.stderr_lossy(),
            exit_code: output.status.code(),
        })
    }
}

/// File name the toolchain expects for a single-file module.
///
/// Java requires the file to be named after its public type.
fn source_file_name(language: &str, code: &str) -> String {
    match language {
        "java" => JAVA_PUBLIC_TYPE
            .captures(code)
            .map_or_else(|| "Main.java".to_string(), |c| format!("{}.java", &c[1])),
        "go" => "main.go".to_string(),
        "rust" => "main.rs".to_string(),
        _ => "main.txt".to_string(),
    }
}

fn shell_script(language: &str, file_name: &str, mode: SandboxMode) -> String {
    match (language, mode) {
        ("java", SandboxMode::BuildOnly) => format!("javac {file_name}"),
        ("java", SandboxMode::Run) => {
            let class = file_name.trim_end_matches(".java");
            format!("javac {file_name} && java {class}")
        }
        ("go", SandboxMode::BuildOnly) => format!("go build -o /tmp/app {file_name}"),
        ("go", SandboxMode::Run) => format!("go run {file_name}"),
        ("rust", SandboxMode::BuildOnly) => format!("rustc --emit=metadata {file_name}"),
        ("rust", SandboxMode::Run) => format!("rustc -o /tmp/app {file_name} && /tmp/app"),
        (_, SandboxMode::BuildOnly) => format!("cat {file_name} >/dev/null"),
        (_, SandboxMode::Run) => format!("cat {file_name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Java sources are named after their public type so javac accepts them.
    #[test]
    fn java_file_name_follows_public_type() {
        let code = "package com.acme;\n\npublic final class LoginHandler {\n}\n";
        assert_eq!(source_file_name("java", code), "LoginHandler.java");
        assert_eq!(source_file_name("java", "class x {}"), "Main.java");
        assert_eq!(source_file_name("go", "package main"), "main.go");
    }

    /// Build-only scripts never run the program.
    #[test]
    fn build_only_scripts_compile_without_running() {
        assert_eq!(
            shell_script("java", "App.java", SandboxMode::BuildOnly),
            "javac App.java"
        );
        assert_eq!(
            shell_script("go", "main.go", SandboxMode::BuildOnly),
            "go build -o /tmp/app main.go"
        );
        assert_eq!(
            shell_script("java", "App.java", SandboxMode::Run),
            "javac App.java && java App"
        );
    }
}
