//! Generator abstraction for code translation backends.
//!
//! The [`Generator`] trait decouples the retry loop from the actual model
//! backend. Tests use scripted generators that return predetermined
//! completions without spawning processes.

use std::process::Command;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::transcript::Transcript;
use crate::io::process::run_command_with_timeout;

/// Parameters for one generator invocation.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Full conversation so far; serialized as JSON on stdin.
    pub transcript: Transcript,
    /// Sampling temperature for this attempt.
    pub temperature: f64,
    /// Maximum time to wait for a completion.
    pub timeout: Duration,
    /// Truncate the completion beyond this many bytes.
    pub output_limit_bytes: usize,
}

/// Abstraction over completion backends.
pub trait Generator {
    /// Produce a raw completion for the given transcript.
    fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Generator that spawns a configured command.
///
/// The command receives the transcript as a JSON array of turns on stdin and
/// the temperature as `--temperature <value>`; it must print the completion
/// to stdout and exit zero.
pub struct CommandGenerator {
    command: Vec<String>,
}

impl CommandGenerator {
    pub fn new(command: Vec<String>) -> Self {
        Self { command }
    }
}

impl Generator for CommandGenerator {
    #[instrument(skip_all, fields(temperature = request.temperature, turns = request.transcript.len()))]
    fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let program = self
            .command
            .first()
            .ok_or_else(|| anyhow!("generator command is empty"))?;
        info!(program = %program, "invoking generator");

        let input = serde_json::to_vec(request.transcript.turns())
            .context("serialize transcript")?;

        let mut cmd = Command::new(program);
        cmd.args(&self.command[1..])
            .arg("--temperature")
            .arg(format!("{:.2}", request.temperature));

        let output = run_command_with_timeout(
            cmd,
            Some(&input),
            request.timeout,
            request.output_limit_bytes,
        )
        .context("run generator")?;

        if output.timed_out {
            warn!(timeout_secs = request.timeout.as_secs(), "generator timed out");
            return Err(anyhow!(
                "generator timed out after {:?}",
                request.timeout
            ));
        }
        if !output.status.success() {
            warn!(exit_code = ?output.status.code(), "generator failed");
            return Err(anyhow!(
                "generator exited with status {:?}: {}",
                output.status.code(),
                output.stderr_lossy().trim()
            ));
        }

        debug!(completion_bytes = output.stdout.len(), "generator completed");
        Ok(output.stdout_lossy())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::transcript::Transcript;

    fn request(transcript: Transcript) -> GenerationRequest {
        GenerationRequest {
            transcript,
            temperature: 0.1,
            timeout: Duration::from_secs(10),
            output_limit_bytes: 100_000,
        }
    }

    /// The transcript arrives on stdin as JSON and stdout comes back as the
    /// completion.
    #[test]
    fn command_generator_pipes_transcript() {
        // `sh -c cat` swallows the --temperature args and echoes stdin back.
        let generator = CommandGenerator::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "cat".to_string(),
        ]);

        let transcript = Transcript::new("system prompt", "translate this", 8);
        let completion = generator.generate(&request(transcript)).expect("generate");
        assert!(completion.contains("\"system prompt\""));
        assert!(completion.contains("\"translate this\""));
    }

    /// A non-zero exit surfaces the backend's stderr in the error.
    #[test]
    fn command_generator_reports_failure() {
        let generator = CommandGenerator::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "echo boom >&2; exit 3".to_string(),
        ]);
        let err = generator
            .generate(&request(Transcript::new("s", "u", 8)))
            .expect_err("should fail");
        assert!(err.to_string().contains("boom"));
    }
}
