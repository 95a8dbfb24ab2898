//! Planning phase: scan, build the graph, resolve the order, write the plan.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, instrument, warn};

use crate::core::graph::DependencyGraph;
use crate::core::order::resolve;
use crate::io::parser::StructuralParser;
use crate::io::plan::{MigrationPlan, build_plan, default_plan_path, write_plan};
use crate::io::scan::discover_modules;

/// Summary of a planning invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanOutcome {
    pub module_count: usize,
    pub edge_count: usize,
    pub cyclic_group_count: usize,
    pub degenerate_cycle: bool,
}

/// Scan `root`, resolve the processing order, and write the plan artifact.
///
/// A degenerate whole-codebase cycle is not an error, but it means the order
/// carries no information, so it is surfaced loudly.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn run_plan(
    root: &Path,
    parser: &dyn StructuralParser,
    target_language: &str,
) -> Result<(MigrationPlan, PlanOutcome)> {
    let modules = discover_modules(root, parser).context("discover modules")?;
    let graph = DependencyGraph::build(modules);
    let order = resolve(&graph);

    for group in order.groups.iter().filter(|g| g.members.len() > 1) {
        let ids: Vec<&str> = group
            .members
            .iter()
            .map(|&m| graph.module(m).id.as_str())
            .collect();
        info!(members = ?ids, "cyclic group will be migrated together");
    }
    if order.is_degenerate_cycle(&graph) {
        warn!(
            modules = graph.len(),
            "every module is mutually dependent; processing order is arbitrary"
        );
    }

    let plan = build_plan(&graph, &order, target_language);
    let plan_path = default_plan_path(root);
    write_plan(&plan_path, &plan)
        .with_context(|| format!("write plan {}", plan_path.display()))?;
    info!(
        modules = plan.stats.module_count,
        edges = plan.stats.edge_count,
        plan = %plan_path.display(),
        "plan written"
    );

    let outcome = PlanOutcome {
        module_count: plan.stats.module_count,
        edge_count: plan.stats.edge_count,
        cyclic_group_count: plan.stats.cyclic_group_count,
        degenerate_cycle: plan.stats.degenerate_cycle,
    };
    Ok((plan, outcome))
}
