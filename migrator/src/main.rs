//! Migration orchestration CLI.
//!
//! Plans and drives a module-by-module translation of a legacy codebase
//! (`.migrator/state/plan.json`) through a generate-validate-reward loop,
//! persisting per-run artifacts under `.migrator/runs/`.

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::warn;

use migrator::exit_codes;
use migrator::io::config::{
    MigratorConfig, MissingIndexPolicy, default_config_path, load_config, write_config,
};
use migrator::io::generator::CommandGenerator;
use migrator::io::parser::RegexJavaParser;
use migrator::io::plan::{default_plan_path, load_plan};
use migrator::io::retrieval::{ContextRetriever, JsonIndexRetriever, NullRetriever};
use migrator::io::sandbox::DockerSandbox;
use migrator::logging;
use migrator::migrate::run_migration;
use migrator::plan::run_plan;
use migrator::runs::RunControl;

#[derive(Parser)]
#[command(
    name = "migrator",
    version,
    about = "Deterministic migration orchestration for legacy codebases"
)]
struct Cli {
    /// Root of the legacy codebase.
    #[arg(long, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create `.migrator/state/config.toml` with defaults if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Check config and plan (when present) without running anything.
    Validate,
    /// Scan the codebase and write the ordered migration plan.
    Plan,
    /// Execute the written plan through the generate-validate loop.
    Migrate {
        /// Identifier for this run; defaults to a timestamp-derived id.
        #[arg(long)]
        run_id: Option<String>,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.root, force),
        Command::Validate => cmd_validate(&cli.root),
        Command::Plan => cmd_plan(&cli.root),
        Command::Migrate { run_id } => cmd_migrate(&cli.root, run_id),
    }
}

fn cmd_init(root: &Path, force: bool) -> Result<i32> {
    let config_path = default_config_path(root);
    if config_path.exists() && !force {
        println!("config already exists at {}", config_path.display());
        return Ok(exit_codes::OK);
    }
    write_config(&config_path, &MigratorConfig::default())
        .with_context(|| format!("write {}", config_path.display()))?;
    println!("wrote {}", config_path.display());
    Ok(exit_codes::OK)
}

fn cmd_validate(root: &Path) -> Result<i32> {
    let config_path = default_config_path(root);
    load_config(&config_path).with_context(|| "load config.toml")?;
    let plan_path = default_plan_path(root);
    if plan_path.exists() {
        let plan = load_plan(&plan_path).with_context(|| "load plan.json")?;
        println!(
            "ok: {} modules, {} edges, {} cyclic groups",
            plan.stats.module_count, plan.stats.edge_count, plan.stats.cyclic_group_count
        );
    } else {
        println!("ok: config valid, no plan yet");
    }
    Ok(exit_codes::OK)
}

fn cmd_plan(root: &Path) -> Result<i32> {
    let config = load_config(&default_config_path(root)).with_context(|| "load config.toml")?;
    let (_, outcome) = run_plan(root, &RegexJavaParser, &config.target_language)?;
    println!(
        "planned {} modules ({} edges, {} cyclic groups)",
        outcome.module_count, outcome.edge_count, outcome.cyclic_group_count
    );
    if outcome.degenerate_cycle {
        println!("warning: every module is mutually dependent; order is arbitrary");
    }
    Ok(exit_codes::OK)
}

fn cmd_migrate(root: &Path, run_id: Option<String>) -> Result<i32> {
    let config = load_config(&default_config_path(root)).with_context(|| "load config.toml")?;
    let plan_path = default_plan_path(root);
    let plan = load_plan(&plan_path)
        .with_context(|| format!("load plan {} (run `migrator plan` first)", plan_path.display()))?;

    let run_id = run_id.unwrap_or_else(default_run_id);
    let generator = CommandGenerator::new(config.generator.command.clone());
    let sandbox = DockerSandbox::new(config.sandbox.clone(), config.output_limit_bytes);
    let retriever = build_retriever(&config)?;
    let control = RunControl::new();

    let report = run_migration(
        root,
        &run_id,
        &plan,
        &config,
        &RegexJavaParser,
        &generator,
        &sandbox,
        &retriever,
        &control,
    )?;

    println!(
        "run {}: {}/{} modules accepted ({:.0}%)",
        report.run_id,
        report.accepted,
        report.modules.len(),
        report.success_ratio * 100.0
    );
    if report.cancelled {
        return Ok(exit_codes::CANCELLED);
    }
    if report.failed > 0 {
        return Ok(exit_codes::FAILED_MODULES);
    }
    Ok(exit_codes::OK)
}

/// Apply the missing-index policy at the orchestrator boundary.
fn build_retriever(config: &MigratorConfig) -> Result<Box<dyn ContextRetriever>> {
    let Some(index_path) = &config.retrieval.index_path else {
        return Ok(Box::new(NullRetriever));
    };
    match JsonIndexRetriever::load(index_path) {
        Ok(retriever) => Ok(Box::new(retriever)),
        Err(err) => match config.retrieval.missing_index {
            MissingIndexPolicy::Proceed => {
                warn!(err = %err, "retrieval index unavailable, running degraded");
                Ok(Box::new(NullRetriever))
            }
            MissingIndexPolicy::Abort => {
                Err(err).with_context(|| "retrieval index required by config")
            }
        },
    }
}

fn default_run_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("run-{secs}")
}
