//! Migration plan load/save with schema validation.
//!
//! The plan is the durable output of the ordering phase: a reviewable JSON
//! artifact that the migrate phase consumes. Writes are atomic and loads are
//! validated against the embedded v1 schema before deserialization.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use jsonschema::Draft;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::graph::DependencyGraph;
use crate::core::order::ProcessingOrder;

const PLAN_SCHEMA: &str = include_str!("../../schemas/migration_plan_v1.schema.json");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanNode {
    pub id: String,
    pub location: PathBuf,
    /// Ids of modules this one depends on, in graph edge order.
    pub dependencies: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub module_count: usize,
    pub edge_count: usize,
    pub cyclic_group_count: usize,
    pub degenerate_cycle: bool,
}

/// Durable, reviewable output of the ordering phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub version: u32,
    pub target_language: String,
    /// All modules in discovery order.
    pub nodes: Vec<PlanNode>,
    /// Processing groups in leaves-first order; multi-member groups are
    /// cycles.
    pub groups: Vec<Vec<String>>,
    /// Flattened processing order.
    pub migration_order: Vec<String>,
    pub stats: PlanStats,
}

/// Assemble a plan from a resolved graph.
pub fn build_plan(
    graph: &DependencyGraph,
    order: &ProcessingOrder,
    target_language: &str,
) -> MigrationPlan {
    let nodes = graph
        .modules()
        .iter()
        .enumerate()
        .map(|(idx, module)| PlanNode {
            id: module.id.clone(),
            location: module.location.clone(),
            dependencies: graph
                .dependencies_of(idx)
                .iter()
                .map(|&dep| graph.module(dep).id.clone())
                .collect(),
        })
        .collect();

    let id_of = |idx: usize| graph.module(idx).id.clone();
    let groups: Vec<Vec<String>> = order
        .groups
        .iter()
        .map(|group| group.members.iter().copied().map(id_of).collect())
        .collect();
    let migration_order = order.flattened().into_iter().map(id_of).collect();

    MigrationPlan {
        version: 1,
        target_language: target_language.to_string(),
        nodes,
        groups,
        migration_order,
        stats: PlanStats {
            module_count: graph.len(),
            edge_count: graph.edge_count(),
            cyclic_group_count: order.cyclic_group_count(),
            degenerate_cycle: order.is_degenerate_cycle(graph),
        },
    }
}

/// Load and schema-validate a plan from disk.
pub fn load_plan(path: &Path) -> Result<MigrationPlan> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read plan {}", path.display()))?;
    let value: Value = serde_json::from_str(&contents)
        .with_context(|| format!("parse plan {}", path.display()))?;
    validate_schema(&value)?;
    let plan: MigrationPlan = serde_json::from_value(value)
        .with_context(|| format!("deserialize plan {}", path.display()))?;
    Ok(plan)
}

/// Atomically write the plan to disk (temp file + rename).
pub fn write_plan(path: &Path, plan: &MigrationPlan) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("plan path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(plan).context("serialize plan")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf)
        .with_context(|| format!("write temp plan {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace plan {}", path.display()))?;
    Ok(())
}

/// Location of the plan file under a scanned repository root.
pub fn default_plan_path(root: &Path) -> PathBuf {
    root.join(".migrator").join("state").join("plan.json")
}

fn validate_schema(instance: &Value) -> Result<()> {
    let schema: Value = serde_json::from_str(PLAN_SCHEMA).context("parse embedded plan schema")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .context("compile plan schema")?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(anyhow!(
            "plan schema validation failed:\n- {}",
            messages.join("\n- ")
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::order::resolve;
    use crate::test_support::module;

    fn sample_plan() -> MigrationPlan {
        let graph = DependencyGraph::build(vec![
            module("a.One", &["a.Two"]),
            module("a.Two", &[]),
        ]);
        let order = resolve(&graph);
        build_plan(&graph, &order, "go")
    }

    /// Plans carry ids (not indices), leaves first.
    #[test]
    fn build_plan_flattens_ids_leaves_first() {
        let plan = sample_plan();
        assert_eq!(plan.migration_order, vec!["a.Two", "a.One"]);
        assert_eq!(plan.nodes[0].dependencies, vec!["a.Two"]);
        assert_eq!(plan.stats.module_count, 2);
        assert_eq!(plan.stats.edge_count, 1);
        assert_eq!(plan.stats.cyclic_group_count, 0);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        let plan = sample_plan();
        write_plan(&path, &plan).expect("write");
        let loaded = load_plan(&path).expect("load");
        assert_eq!(loaded, plan);
    }

    /// A plan with the wrong shape is rejected by schema validation before
    /// deserialization can mask the problem.
    #[test]
    fn load_rejects_malformed_plan() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("plan.json");
        fs::write(&path, r#"{"version": 2, "nodes": "nope"}"#).expect("write");

        let err = load_plan(&path).expect_err("should fail");
        assert!(err.to_string().contains("schema validation failed"));
    }
}
