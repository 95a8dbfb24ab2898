//! Module identity and dependency declarations.
//!
//! A [`ModuleUnit`] is immutable once discovered: its qualified name and
//! declared dependencies never change during a run, so everything downstream
//! (graph, order, plan) stays deterministic.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A single unit of source code scheduled for translation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleUnit {
    /// Fully qualified name (`package.Class`, or the bare class name when
    /// the source declares no package).
    pub id: String,
    /// Source file location relative to the scanned repository root.
    pub location: PathBuf,
    /// Declared dependencies, in declaration order.
    pub dependencies: Vec<DependencyDecl>,
}

/// A dependency declared by a module's import list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum DependencyDecl {
    /// Exact identifier (`com.acme.Config`).
    Resolved(String),
    /// Whole-namespace import (`com.acme.*`), stored without the `.*` suffix.
    Wildcard(String),
}

/// Join a package and a type name into a qualified module id.
pub fn qualified_name(package: &str, type_name: &str) -> String {
    if package.is_empty() {
        type_name.to_string()
    } else {
        format!("{package}.{type_name}")
    }
}
