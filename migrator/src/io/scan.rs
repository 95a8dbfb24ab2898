//! Module discovery: walk a legacy source tree and build module units.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, instrument, warn};

use crate::core::module::{DependencyDecl, ModuleUnit, qualified_name};
use crate::io::parser::StructuralParser;

/// Import prefixes that never resolve to project modules.
const PLATFORM_PREFIXES: &[&str] = &["java.", "javax."];

/// Discover all modules under `root` in a deterministic order.
///
/// Files are visited in sorted path order so the discovery order (and with it
/// the graph, the processing order, and the plan) is identical across runs.
/// Hidden directories and the `.migrator` state directory are skipped.
#[instrument(skip_all, fields(root = %root.display()))]
pub fn discover_modules(root: &Path, parser: &dyn StructuralParser) -> Result<Vec<ModuleUnit>> {
    let mut files = Vec::new();
    collect_source_files(root, &mut files)?;
    files.sort();

    let mut modules = Vec::with_capacity(files.len());
    for path in files {
        let source = fs::read_to_string(&path)
            .with_context(|| format!("read source {}", path.display()))?;
        let facts = parser.parse(&source);
        if let Some(err) = &facts.error {
            warn!(path = %path.display(), err = %err, "partial analysis");
        }

        let type_name = facts
            .types
            .first()
            .map(|t| t.name.clone())
            .unwrap_or_else(|| file_stem(&path));
        let id = qualified_name(&facts.package, &type_name);

        let dependencies = facts
            .imports
            .iter()
            .filter(|import| !is_platform_import(&import.path))
            .map(|import| {
                if import.wildcard {
                    DependencyDecl::Wildcard(import.path.clone())
                } else {
                    DependencyDecl::Resolved(import.path.clone())
                }
            })
            .collect();

        let location = path.strip_prefix(root).unwrap_or(&path).to_path_buf();
        debug!(id = %id, location = %location.display(), "discovered module");
        modules.push(ModuleUnit {
            id,
            location,
            dependencies,
        });
    }

    info!(count = modules.len(), "module discovery complete");
    Ok(modules)
}

fn collect_source_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if path.is_dir() {
            if name.starts_with('.') {
                continue;
            }
            collect_source_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == "java") {
            out.push(path);
        }
    }
    Ok(())
}

fn is_platform_import(path: &str) -> bool {
    PLATFORM_PREFIXES
        .iter()
        .any(|prefix| path.starts_with(prefix))
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}
