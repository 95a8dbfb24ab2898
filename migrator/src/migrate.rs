//! Migration phase: the generate-validate-reward loop over a written plan.
//!
//! Modules are processed strictly in plan order, one at a time. The only
//! parallelism is the pair of behavior executions (original vs candidate),
//! which run on scoped threads. A module that exhausts its retries is
//! recorded as failed and the pipeline moves on; cancellation is honored
//! between modules and between attempts, never mid-sandbox-call.

use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, info, instrument, warn};

use crate::core::behavior::{BehaviorComparison, compare_outputs};
use crate::core::extract::extract_candidate;
use crate::core::reward::RewardRecord;
use crate::core::transcript::{Role, Transcript};
use crate::io::config::MigratorConfig;
use crate::io::generator::{GenerationRequest, Generator};
use crate::io::parser::StructuralParser;
use crate::io::plan::{MigrationPlan, PlanNode};
use crate::io::prompt::{PromptBuilder, PromptInputs, SYSTEM_PROMPT};
use crate::io::report::{
    AttemptArtifacts, FailureReason, MigrationStatus, ModuleReport, RunPaths, RunReport,
    write_attempt_artifacts, write_run_report,
};
use crate::io::retrieval::ContextRetriever;
use crate::io::sandbox::{Sandbox, SandboxMode, SandboxRequest};
use crate::runs::RunControl;

/// Migrate every module in the plan and persist the run report.
#[instrument(skip_all, fields(run_id = %run_id, modules = plan.migration_order.len()))]
pub fn run_migration<G, S, R>(
    root: &Path,
    run_id: &str,
    plan: &MigrationPlan,
    config: &MigratorConfig,
    parser: &dyn StructuralParser,
    generator: &G,
    sandbox: &S,
    retriever: &R,
    control: &RunControl,
) -> Result<RunReport>
where
    G: Generator,
    S: Sandbox,
    R: ContextRetriever,
{
    let paths = RunPaths::new(root, run_id);
    let mut reports = Vec::new();
    let mut cancelled = false;

    for module_id in &plan.migration_order {
        if !control.wait_if_paused() {
            info!(module_id = %module_id, "run cancelled before module");
            cancelled = true;
            break;
        }
        let node = plan
            .nodes
            .iter()
            .find(|n| &n.id == module_id)
            .ok_or_else(|| anyhow!("plan order references unknown module '{module_id}'"))?;

        let report = migrate_module(
            root, &paths, node, config, parser, generator, sandbox, retriever, control,
        )
        .with_context(|| format!("migrate module {module_id}"))?;

        let module_cancelled = matches!(
            &report.status,
            MigrationStatus::Failed {
                reason: FailureReason::Cancelled
            }
        );
        info!(module_id = %module_id, status = ?report.status, attempts = report.attempts, "module finished");
        reports.push(report);
        if module_cancelled {
            cancelled = true;
            break;
        }
    }

    let report = RunReport::from_modules(run_id, reports, cancelled);
    write_run_report(&paths, &report).context("write run report")?;
    info!(
        accepted = report.accepted,
        failed = report.failed,
        success_ratio = report.success_ratio,
        cancelled = report.cancelled,
        "run complete"
    );
    Ok(report)
}

/// Run the bounded retry loop for one module.
#[instrument(skip_all, fields(module_id = %node.id))]
fn migrate_module<G, S, R>(
    root: &Path,
    paths: &RunPaths,
    node: &PlanNode,
    config: &MigratorConfig,
    parser: &dyn StructuralParser,
    generator: &G,
    sandbox: &S,
    retriever: &R,
    control: &RunControl,
) -> Result<ModuleReport>
where
    G: Generator,
    S: Sandbox,
    R: ContextRetriever,
{
    let source_path = root.join(&node.location);
    // A vanished or unreadable source is a verdict on this module only, never
    // on the run: later modules still migrate and the report still lands.
    let source = match fs::read_to_string(&source_path) {
        Ok(source) => source,
        Err(err) => {
            warn!(path = %source_path.display(), err = %err, "module source unavailable");
            return Ok(ModuleReport {
                module_id: node.id.clone(),
                status: MigrationStatus::Failed {
                    reason: FailureReason::SourceUnavailable,
                },
                attempts: 0,
                reward: None,
                match_score: None,
            });
        }
    };
    let facts = parser.parse(&source);

    let context = match retriever.retrieve(&source, config.retrieval.top_k) {
        Ok(context) => context,
        Err(err) => {
            warn!(err = %err, "retrieval failed, proceeding degraded");
            crate::core::context::RetrievedContext::degraded()
        }
    };
    let guidance = config
        .module_guidance
        .get(&node.id)
        .unwrap_or(&config.guidance);

    let prompt = PromptBuilder::new(config.prompt_budget_bytes).build_module_prompt(
        &PromptInputs {
            module_id: &node.id,
            source_language: &config.source_language,
            target_language: &config.target_language,
            source: &source,
            facts: &facts,
            context: &context,
            guidance,
        },
    )?;
    let mut transcript = Transcript::new(SYSTEM_PROMPT, prompt, config.max_transcript_turns);

    let total_attempts = config.max_retries + 1;
    let mut last_reward: Option<RewardRecord> = None;
    let mut last_match: Option<f64> = None;

    for attempt in 1..=total_attempts {
        if attempt > 1 && !control.wait_if_paused() {
            info!(attempt, "run cancelled between attempts");
            return Ok(ModuleReport {
                module_id: node.id.clone(),
                status: MigrationStatus::Failed {
                    reason: FailureReason::Cancelled,
                },
                attempts: attempt - 1,
                reward: last_reward,
                match_score: last_match,
            });
        }

        let temperature = (config.base_temperature
            + config.retry_temperature_step * f64::from(attempt - 1))
        .min(1.0);
        debug!(attempt, temperature, "generating candidate");

        let completion = match generator.generate(&GenerationRequest {
            transcript: transcript.clone(),
            temperature,
            timeout: Duration::from_secs(config.generator_timeout_secs),
            output_limit_bytes: config.output_limit_bytes,
        }) {
            Ok(completion) => completion,
            Err(err) => {
                warn!(attempt, err = %err, "generator failed");
                return Ok(ModuleReport {
                    module_id: node.id.clone(),
                    status: MigrationStatus::Failed {
                        reason: FailureReason::GeneratorFailed,
                    },
                    attempts: attempt,
                    reward: last_reward,
                    match_score: last_match,
                });
            }
        };
        transcript.push(Role::Assistant, completion.clone());

        let attempt_result = validate_candidate(
            node, config, sandbox, &context, guidance, &source, &completion,
        )?;
        last_reward = Some(attempt_result.reward.clone());
        last_match = attempt_result.behavior.as_ref().map(|b| b.match_score);

        let is_last = attempt == total_attempts;
        let feedback = attempt_result.feedback.clone().filter(|_| !is_last);
        write_attempt_artifacts(
            paths,
            &node.id,
            target_extension(&config.target_language),
            &AttemptArtifacts {
                attempt,
                temperature,
                completion,
                candidate: attempt_result.candidate.clone(),
                compile_log: attempt_result.compile_log.clone(),
                reward: attempt_result.reward.clone(),
                behavior: attempt_result.behavior.clone(),
                feedback: feedback.clone(),
            },
        )?;

        if attempt_result.accepted {
            info!(attempt, total = attempt_result.reward.total, "candidate accepted");
            return Ok(ModuleReport {
                module_id: node.id.clone(),
                status: MigrationStatus::Accepted,
                attempts: attempt,
                reward: last_reward,
                match_score: last_match,
            });
        }

        if let Some(feedback) = feedback {
            debug!(attempt, "candidate rejected, retrying with feedback");
            transcript.push(Role::User, feedback);
        }
    }

    Ok(ModuleReport {
        module_id: node.id.clone(),
        status: MigrationStatus::Failed {
            reason: FailureReason::MaxRetriesExceeded,
        },
        attempts: total_attempts,
        reward: last_reward,
        match_score: last_match,
    })
}

/// One attempt's validation outcome.
struct AttemptResult {
    candidate: Option<String>,
    compile_log: Option<String>,
    behavior: Option<BehaviorComparison>,
    reward: RewardRecord,
    accepted: bool,
    /// Set whenever the candidate was rejected.
    feedback: Option<String>,
}

/// Extract, compile-check, behavior-check, and score one completion.
fn validate_candidate<S: Sandbox>(
    node: &PlanNode,
    config: &MigratorConfig,
    sandbox: &S,
    context: &crate::core::context::RetrievedContext,
    guidance: &crate::core::guidance::Guidance,
    source: &str,
    completion: &str,
) -> Result<AttemptResult> {
    // Format violations never reach the sandbox.
    let sections = match extract_candidate(completion, &config.target_language) {
        Ok(sections) => sections,
        Err(violation) => {
            debug!(module_id = %node.id, %violation, "format violation");
            return Ok(AttemptResult {
                candidate: None,
                compile_log: None,
                behavior: None,
                reward: RewardRecord::zero(),
                accepted: false,
                feedback: Some(format!(
                    "Your response could not be used: {violation}. Resend the complete \
                     translated module wrapped in <code> tags."
                )),
            });
        }
    };

    let compile_record = sandbox.execute(&SandboxRequest {
        code: sections.code.clone(),
        language: config.target_language.clone(),
        mode: SandboxMode::BuildOnly,
        timeout: Duration::from_secs(config.compile_timeout_secs),
    })?;
    if !compile_record.succeeded {
        debug!(module_id = %node.id, "compile check failed");
        return Ok(AttemptResult {
            candidate: Some(sections.code),
            compile_log: Some(compile_record.stderr.clone()),
            behavior: None,
            reward: RewardRecord::zero(),
            accepted: false,
            // Diagnostics go back verbatim so the generator sees real errors.
            feedback: Some(format!("COMPILER ERROR:\n{}", compile_record.stderr)),
        });
    }

    let original_request = SandboxRequest {
        code: source.to_string(),
        language: config.source_language.clone(),
        mode: SandboxMode::Run,
        timeout: Duration::from_secs(config.execution_timeout_secs),
    };
    let candidate_request = SandboxRequest {
        code: sections.code.clone(),
        language: config.target_language.clone(),
        mode: SandboxMode::Run,
        timeout: Duration::from_secs(config.execution_timeout_secs),
    };
    let (original_run, candidate_run) = thread::scope(|scope| {
        let original = scope.spawn(|| sandbox.execute(&original_request));
        let candidate = scope.spawn(|| sandbox.execute(&candidate_request));
        (original.join(), candidate.join())
    });
    let original_run =
        original_run.map_err(|_| anyhow!("original execution thread panicked"))??;
    let candidate_run =
        candidate_run.map_err(|_| anyhow!("candidate execution thread panicked"))??;

    let comparison = compare_outputs(&original_run, &candidate_run);
    let reward = config.scoring.score(
        true,
        &comparison,
        &context.snippets,
        guidance,
        &sections.code,
    );
    let accepted = config.scoring.accepted(&reward, comparison.match_score);

    let feedback = if accepted {
        None
    } else if comparison.execution_failed {
        Some(format!(
            "The translated module failed at runtime (exit code {:?}).\nstderr:\n{}\n\
             Fix the runtime failure and resend the complete module in <code> tags.",
            candidate_run.exit_code,
            truncate_for_feedback(&candidate_run.stderr),
        ))
    } else {
        Some(format!(
            "Output mismatch: match score {:.2}, reward total {:.1} \
             (compile {:.0}, behavior {:.0}, penalties {:.0}).\n\
             Expected output (original):\n{}\n\nYour output:\n{}\n\
             Make the output byte-identical and resend the complete module in <code> tags.",
            comparison.match_score,
            reward.total,
            reward.compilation,
            reward.behavior,
            reward.state_divergence + reward.execution_failure,
            comparison.original_prefix,
            comparison.candidate_prefix,
        ))
    };

    Ok(AttemptResult {
        candidate: Some(sections.code),
        compile_log: Some(compile_record.stderr),
        behavior: Some(comparison),
        reward,
        accepted,
        feedback,
    })
}

fn truncate_for_feedback(text: &str) -> String {
    text.chars().take(400).collect()
}

/// File extension for persisted candidates.
fn target_extension(language: &str) -> &str {
    match language {
        "go" => "go",
        "rust" => "rs",
        "java" => "java",
        _ => "txt",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::resolve;
    use crate::core::graph::DependencyGraph;
    use crate::io::parser::RegexJavaParser;
    use crate::io::plan::build_plan;
    use crate::test_support::{
        ScriptedGenerator, ScriptedSandbox, StaticRetriever, exec_failed, exec_ok, module,
    };

    fn write_source(root: &Path, node_location: &Path, contents: &str) {
        let path = root.join(node_location);
        fs::create_dir_all(path.parent().expect("parent")).expect("mkdir");
        fs::write(path, contents).expect("write");
    }

    fn single_module_plan(root: &Path) -> MigrationPlan {
        let graph = DependencyGraph::build(vec![module("app.Calc", &[])]);
        let order = resolve(&graph);
        let plan = build_plan(&graph, &order, "go");
        write_source(
            root,
            &plan.nodes[0].location,
            "package app;\npublic class Calc {}\n",
        );
        plan
    }

    fn config() -> MigratorConfig {
        MigratorConfig::default()
    }

    /// A compile failure on the first attempt is fed back verbatim; the
    /// second attempt compiles, matches exactly, and is accepted.
    #[test]
    fn compile_failure_then_exact_match_is_accepted_on_second_attempt() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = single_module_plan(temp.path());
        let generator = ScriptedGenerator::new(&[
            "<code>package main // broken</code>",
            "<code>package main // fixed</code>",
        ]);
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_failed("main.go:1: syntax error"))
            .with_build(exec_ok(""))
            .with_run("java", exec_ok("42\n"))
            .with_run("go", exec_ok("42\n"));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        assert_eq!(report.accepted, 1);
        assert_eq!(report.modules[0].status, MigrationStatus::Accepted);
        assert_eq!(report.modules[0].attempts, 2);
        assert_eq!(report.modules[0].match_score, Some(1.0));

        // First attempt artifacts carry the compiler feedback.
        let paths = RunPaths::new(temp.path(), "run-1");
        let feedback = fs::read_to_string(
            paths.attempt_dir("app.Calc", 1).join("feedback.md"),
        )
        .expect("feedback");
        assert!(feedback.starts_with("COMPILER ERROR:"));
        assert!(feedback.contains("syntax error"));
    }

    /// A candidate that keeps producing divergent output exhausts its
    /// retries and fails with the state-divergence penalty applied.
    #[test]
    fn persistent_divergence_exhausts_retries() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = single_module_plan(temp.path());
        let cfg = config();
        let generator = ScriptedGenerator::new(&[
            "<code>package main // v1</code>",
            "<code>package main // v2</code>",
            "<code>package main // v3</code>",
            "<code>package main // v4</code>",
        ]);
        // 3 of 10 lines overlap: Dice = 6 / 20 = 0.3.
        let original = "l1\nl2\nl3\nl4\nl5\nl6\nl7\nl8\nl9\nl10\n";
        let candidate = "l1\nl2\nl3\nx4\nx5\nx6\nx7\nx8\nx9\nx10\n";
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_ok(""))
            .with_run("java", exec_ok(original))
            .with_run("go", exec_ok(candidate));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &cfg,
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        let module = &report.modules[0];
        assert_eq!(
            module.status,
            MigrationStatus::Failed {
                reason: FailureReason::MaxRetriesExceeded
            }
        );
        assert_eq!(module.attempts, cfg.max_retries + 1);
        let reward = module.reward.as_ref().expect("reward");
        assert_eq!(reward.state_divergence, 10.0);
        assert!((module.match_score.expect("match") - 0.3).abs() < 1e-9);
    }

    /// A candidate that crashes at runtime takes both the execution-failure
    /// and state-divergence penalties; its total never exceeds the compile
    /// bonus.
    #[test]
    fn runtime_failure_stacks_both_penalties() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = single_module_plan(temp.path());
        let generator = ScriptedGenerator::new(&[
            "<code>package main</code>",
            "<code>package main</code>",
            "<code>package main</code>",
            "<code>package main</code>",
        ]);
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_ok(""))
            .with_run("java", exec_ok("42\n"))
            .with_run("go", exec_failed("panic: nil dereference"));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        let module = &report.modules[0];
        assert_eq!(module.match_score, Some(0.0));
        let reward = module.reward.as_ref().expect("reward");
        assert_eq!(reward.execution_failure, 8.0);
        assert_eq!(reward.state_divergence, 10.0);
        assert!(reward.total <= 3.0);
    }

    /// A format violation is rejected before any sandbox call and fed back
    /// as a distinct error.
    #[test]
    fn format_violation_short_circuits_before_sandbox() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = single_module_plan(temp.path());
        let generator = ScriptedGenerator::new(&[
            "I refuse to write code today.",
            "<code>package main</code>",
        ]);
        // No build result for the first attempt: reaching the sandbox there
        // would fail the test with a scripted-sandbox error.
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_ok(""))
            .with_run("java", exec_ok("ok\n"))
            .with_run("go", exec_ok("ok\n"));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        assert_eq!(report.modules[0].status, MigrationStatus::Accepted);
        assert_eq!(report.modules[0].attempts, 2);
    }

    /// A generator failure marks the module failed without stopping the rest
    /// of the pipeline.
    #[test]
    fn generator_failure_does_not_block_the_pipeline() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = DependencyGraph::build(vec![
            module("app.First", &[]),
            module("app.Second", &[]),
        ]);
        let order = resolve(&graph);
        let plan = build_plan(&graph, &order, "go");
        for node in &plan.nodes {
            write_source(temp.path(), &node.location, "public class X {}\n");
        }
        // One completion only: the second module's generation fails.
        let generator = ScriptedGenerator::new(&["<code>package main</code>"]);
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_ok(""))
            .with_run("java", exec_ok("ok\n"))
            .with_run("go", exec_ok("ok\n"));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        assert_eq!(report.modules.len(), 2);
        assert_eq!(report.modules[0].status, MigrationStatus::Accepted);
        assert_eq!(
            report.modules[1].status,
            MigrationStatus::Failed {
                reason: FailureReason::GeneratorFailed
            }
        );
        assert_eq!(report.success_ratio, 0.5);
    }

    /// A module whose source vanished between planning and migration is
    /// recorded as failed; later modules still run and the report survives,
    /// earlier acceptances included.
    #[test]
    fn missing_source_fails_the_module_not_the_run() {
        let temp = tempfile::tempdir().expect("tempdir");
        let graph = DependencyGraph::build(vec![
            module("app.First", &[]),
            module("app.Second", &[]),
            module("app.Third", &[]),
        ]);
        let order = resolve(&graph);
        let plan = build_plan(&graph, &order, "go");
        for node in &plan.nodes {
            write_source(temp.path(), &node.location, "public class X {}\n");
        }
        fs::remove_file(temp.path().join(&plan.nodes[1].location)).expect("remove");

        let generator = ScriptedGenerator::new(&[
            "<code>package main // first</code>",
            "<code>package main // third</code>",
        ]);
        let sandbox = ScriptedSandbox::new()
            .with_build(exec_ok(""))
            .with_run("java", exec_ok("ok\n"))
            .with_run("go", exec_ok("ok\n"));

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &RunControl::new(),
        )
        .expect("run");

        assert_eq!(report.modules.len(), 3);
        assert_eq!(report.modules[0].status, MigrationStatus::Accepted);
        assert_eq!(
            report.modules[1].status,
            MigrationStatus::Failed {
                reason: FailureReason::SourceUnavailable
            }
        );
        assert_eq!(report.modules[1].attempts, 0);
        assert_eq!(report.modules[2].status, MigrationStatus::Accepted);

        let paths = RunPaths::new(temp.path(), "run-1");
        let loaded =
            crate::io::report::load_run_report(&paths.report_path()).expect("load report");
        assert_eq!(loaded, report);
    }

    /// Cancellation before the first module yields an empty, cancelled run.
    #[test]
    fn cancellation_stops_between_modules() {
        let temp = tempfile::tempdir().expect("tempdir");
        let plan = single_module_plan(temp.path());
        let generator = ScriptedGenerator::new(&[]);
        let sandbox = ScriptedSandbox::new();
        let control = RunControl::new();
        control.cancel();

        let report = run_migration(
            temp.path(),
            "run-1",
            &plan,
            &config(),
            &RegexJavaParser,
            &generator,
            &sandbox,
            &StaticRetriever::degraded(),
            &control,
        )
        .expect("run");

        assert!(report.cancelled);
        assert!(report.modules.is_empty());
        assert_eq!(report.success_ratio, 0.0);
    }
}
