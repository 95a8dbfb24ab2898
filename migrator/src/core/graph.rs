//! Dependency graph construction from per-module declarations.
//!
//! Edge `A -> B` means "A depends on B". The graph is built once per run and
//! read-only afterwards. Node order is discovery order and adjacency lists
//! keep insertion order, so identical inputs always produce identical graphs.

use std::collections::{HashMap, HashSet};

use crate::core::module::{DependencyDecl, ModuleUnit};

/// Directed module dependency graph.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    modules: Vec<ModuleUnit>,
    edges: Vec<Vec<usize>>,
    edge_count: usize,
}

impl DependencyGraph {
    /// Build the graph from discovered modules.
    ///
    /// - A resolved identifier that exactly matches another module's id adds
    ///   one edge.
    /// - A wildcard namespace adds an edge to every module whose id starts
    ///   with that namespace, excluding the importing module itself.
    /// - Identifiers that match nothing (external or standard library) are
    ///   dropped and contribute no edge.
    pub fn build(modules: Vec<ModuleUnit>) -> Self {
        let index: HashMap<String, usize> = modules
            .iter()
            .enumerate()
            .map(|(i, m)| (m.id.clone(), i))
            .collect();

        let mut edges: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
        let mut edge_count = 0usize;

        for (from, module) in modules.iter().enumerate() {
            let mut seen: HashSet<usize> = HashSet::new();
            for decl in &module.dependencies {
                match decl {
                    DependencyDecl::Resolved(name) => {
                        if let Some(&to) = index.get(name)
                            && to != from
                            && seen.insert(to)
                        {
                            edges[from].push(to);
                            edge_count += 1;
                        }
                    }
                    DependencyDecl::Wildcard(namespace) => {
                        for (to, other) in modules.iter().enumerate() {
                            if to != from
                                && other.id.starts_with(namespace.as_str())
                                && seen.insert(to)
                            {
                                edges[from].push(to);
                                edge_count += 1;
                            }
                        }
                    }
                }
            }
        }

        Self {
            modules,
            edges,
            edge_count,
        }
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// Modules in discovery order.
    pub fn modules(&self) -> &[ModuleUnit] {
        &self.modules
    }

    pub fn module(&self, idx: usize) -> &ModuleUnit {
        &self.modules[idx]
    }

    /// Indices of modules that `idx` depends on, in declaration order.
    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.edges[idx]
    }

    /// Look up a module index by id.
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.modules.iter().position(|m| m.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{module, module_with_wildcard};

    /// Resolved identifiers that match another module's id become edges;
    /// unresolvable identifiers contribute nothing.
    #[test]
    fn build_adds_resolved_edges_and_drops_unknown() {
        let graph = DependencyGraph::build(vec![
            module("a.One", &["a.Two", "java.util.List", "ghost.Missing"]),
            module("a.Two", &[]),
        ]);

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependencies_of(0), &[1]);
        assert!(graph.dependencies_of(1).is_empty());
    }

    /// Wildcard imports fan out to every module under the namespace but
    /// never produce a self-edge.
    #[test]
    fn build_expands_wildcards_without_self_edges() {
        let graph = DependencyGraph::build(vec![
            module_with_wildcard("pkg.Main", "pkg"),
            module("pkg.Helper", &[]),
            module("pkg.Util", &[]),
            module("other.Thing", &[]),
        ]);

        assert_eq!(graph.dependencies_of(0), &[1, 2]);
        assert_eq!(graph.edge_count(), 2);
    }

    /// Duplicate declarations (resolved + wildcard covering the same target)
    /// yield a single edge.
    #[test]
    fn build_deduplicates_edges() {
        let mut main = module("pkg.Main", &["pkg.Helper"]);
        main.dependencies
            .push(crate::core::module::DependencyDecl::Wildcard(
                "pkg".to_string(),
            ));
        let graph = DependencyGraph::build(vec![main, module("pkg.Helper", &[])]);

        assert_eq!(graph.dependencies_of(0), &[1]);
        assert_eq!(graph.edge_count(), 1);
    }

    /// Building twice from the same input yields identical adjacency.
    #[test]
    fn build_is_deterministic() {
        let modules = vec![
            module_with_wildcard("p.A", "p"),
            module("p.B", &["p.C"]),
            module("p.C", &[]),
        ];
        let first = DependencyGraph::build(modules.clone());
        let second = DependencyGraph::build(modules);

        for idx in 0..first.len() {
            assert_eq!(first.dependencies_of(idx), second.dependencies_of(idx));
        }
    }
}
