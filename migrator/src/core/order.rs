//! Leaves-first processing order over the dependency graph.
//!
//! Cycles are condensed into strongly connected groups, the condensed DAG is
//! topologically sorted with a deterministic tie-break, and the result is
//! reversed so dependencies always precede dependents. For an acyclic graph
//! every group is a singleton and the order is total.

use crate::core::graph::DependencyGraph;

/// A maximal set of mutually reachable modules (a cycle), or a singleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleGroup {
    /// Member module indices, in discovery order. Intra-group order carries
    /// no dependency guarantee.
    pub members: Vec<usize>,
}

/// Ordered sequence of groups: for every edge A -> B across groups, B's
/// group appears before A's group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingOrder {
    pub groups: Vec<ModuleGroup>,
}

impl ProcessingOrder {
    /// Module indices flattened in processing order.
    pub fn flattened(&self) -> Vec<usize> {
        self.groups
            .iter()
            .flat_map(|g| g.members.iter().copied())
            .collect()
    }

    /// True when every module collapsed into one mutually dependent group.
    ///
    /// Not an error, but worth surfacing: ordering adds no information then.
    pub fn is_degenerate_cycle(&self, graph: &DependencyGraph) -> bool {
        graph.len() > 1 && self.groups.len() == 1
    }

    /// Number of groups with more than one member (actual cycles).
    pub fn cyclic_group_count(&self) -> usize {
        self.groups.iter().filter(|g| g.members.len() > 1).count()
    }
}

/// Compute the deterministic leaves-first processing order.
///
/// A valid order always exists for any finite directed graph once cycles are
/// condensed, so this never fails. Identical graphs yield identical orders.
pub fn resolve(graph: &DependencyGraph) -> ProcessingOrder {
    let components = strongly_connected_components(graph);

    // Map each module to its component.
    let mut component_of = vec![0usize; graph.len()];
    for (c, members) in components.iter().enumerate() {
        for &m in members {
            component_of[m] = c;
        }
    }

    // Condensed DAG: in-degrees only, successors gathered per component in
    // component-index order for a stable Kahn traversal.
    let count = components.len();
    let mut successors: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];
    for from in 0..graph.len() {
        for &to in graph.dependencies_of(from) {
            let (cf, ct) = (component_of[from], component_of[to]);
            if cf != ct && !successors[cf].contains(&ct) {
                successors[cf].push(ct);
                in_degree[ct] += 1;
            }
        }
    }

    // Kahn with an index-ordered ready list: lowest component index first.
    let mut ready: Vec<usize> = (0..count).filter(|&c| in_degree[c] == 0).collect();
    ready.sort_unstable();
    let mut topo = Vec::with_capacity(count);
    while let Some(&next) = ready.first() {
        ready.remove(0);
        topo.push(next);
        for &succ in &successors[next] {
            in_degree[succ] -= 1;
            if in_degree[succ] == 0 {
                let pos = ready.partition_point(|&c| c < succ);
                ready.insert(pos, succ);
            }
        }
    }

    // Topo order has dependents before their dependencies (edges point at
    // dependencies); reverse for leaves-first.
    let groups = topo
        .into_iter()
        .rev()
        .map(|c| {
            let mut members = components[c].clone();
            members.sort_unstable();
            ModuleGroup { members }
        })
        .collect();

    ProcessingOrder { groups }
}

/// Iterative Tarjan over discovery-order roots and insertion-order edges.
fn strongly_connected_components(graph: &DependencyGraph) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;

    let n = graph.len();
    let mut index = vec![UNVISITED; n];
    let mut lowlink = vec![0usize; n];
    let mut on_stack = vec![false; n];
    let mut stack: Vec<usize> = Vec::new();
    let mut next_index = 0usize;
    let mut components: Vec<Vec<usize>> = Vec::new();

    // Explicit DFS frames: (node, next child position).
    let mut frames: Vec<(usize, usize)> = Vec::new();

    for root in 0..n {
        if index[root] != UNVISITED {
            continue;
        }
        frames.push((root, 0));
        while let Some(&mut (node, child_pos)) = frames.last_mut() {
            if child_pos == 0 {
                index[node] = next_index;
                lowlink[node] = next_index;
                next_index += 1;
                stack.push(node);
                on_stack[node] = true;
            }

            let deps = graph.dependencies_of(node);
            if child_pos < deps.len() {
                if let Some(frame) = frames.last_mut() {
                    frame.1 += 1;
                }
                let child = deps[child_pos];
                if index[child] == UNVISITED {
                    frames.push((child, 0));
                } else if on_stack[child] {
                    lowlink[node] = lowlink[node].min(index[child]);
                }
                continue;
            }

            frames.pop();
            if let Some(&(parent, _)) = frames.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut members = Vec::new();
                loop {
                    let m = stack.pop().expect("tarjan stack underflow");
                    on_stack[m] = false;
                    members.push(m);
                    if m == node {
                        break;
                    }
                }
                components.push(members);
            }
        }
    }

    components
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::module;

    fn ids(graph: &DependencyGraph, order: &ProcessingOrder) -> Vec<String> {
        order
            .flattened()
            .into_iter()
            .map(|i| graph.module(i).id.clone())
            .collect()
    }

    /// Chain A -> B -> C resolves to [C, B, A]: dependencies first.
    #[test]
    fn acyclic_chain_orders_leaves_first() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B"]),
            module("B", &["C"]),
            module("C", &[]),
        ]);
        let order = resolve(&graph);

        assert_eq!(order.groups.len(), 3);
        assert_eq!(ids(&graph, &order), vec!["C", "B", "A"]);
    }

    /// For every edge A -> B in an acyclic graph, B's group comes first.
    #[test]
    fn acyclic_order_respects_every_edge() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B", "C"]),
            module("B", &["D"]),
            module("C", &["D"]),
            module("D", &[]),
        ]);
        let order = resolve(&graph);

        let position: Vec<usize> = (0..graph.len())
            .map(|m| {
                order
                    .groups
                    .iter()
                    .position(|g| g.members.contains(&m))
                    .expect("module in some group")
            })
            .collect();
        for from in 0..graph.len() {
            for &to in graph.dependencies_of(from) {
                assert!(
                    position[to] < position[from],
                    "dependency {to} must precede dependent {from}"
                );
            }
        }
    }

    /// Cycle A <-> B plus independent D: D's group strictly precedes the
    /// cycle group, and the cycle members stay together.
    #[test]
    fn cycle_condenses_into_single_group_after_independents() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B"]),
            module("B", &["A"]),
            module("D", &[]),
        ]);
        let order = resolve(&graph);

        assert_eq!(order.groups.len(), 2);
        assert_eq!(
            order.groups[0].members.len(),
            1,
            "independent module first"
        );
        assert_eq!(graph.module(order.groups[0].members[0]).id, "D");
        assert_eq!(order.groups[1].members, vec![0, 1]);
        assert_eq!(order.cyclic_group_count(), 1);
    }

    /// Resolving the same graph twice yields identical group contents and
    /// order.
    #[test]
    fn resolve_is_deterministic() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B"]),
            module("B", &["A", "C"]),
            module("C", &[]),
            module("D", &["A"]),
        ]);

        assert_eq!(resolve(&graph), resolve(&graph));
    }

    /// No two groups share a module, and groups with >1 member are real
    /// cycles (every member reaches every other).
    #[test]
    fn groups_partition_the_graph() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B"]),
            module("B", &["C"]),
            module("C", &["A"]),
            module("D", &["A"]),
            module("E", &[]),
        ]);
        let order = resolve(&graph);

        let mut seen = std::collections::HashSet::new();
        for group in &order.groups {
            for &m in &group.members {
                assert!(seen.insert(m), "module {m} appears in two groups");
            }
        }
        assert_eq!(seen.len(), graph.len());
        assert_eq!(order.cyclic_group_count(), 1);
        let cycle = order
            .groups
            .iter()
            .find(|g| g.members.len() > 1)
            .expect("cycle group");
        assert_eq!(cycle.members, vec![0, 1, 2]);
    }

    /// A fully mutually dependent graph condenses to one group, flagged as
    /// degenerate but still ordered (insertion order).
    #[test]
    fn whole_graph_cycle_is_degenerate_not_an_error() {
        let graph = DependencyGraph::build(vec![
            module("A", &["B"]),
            module("B", &["C"]),
            module("C", &["A"]),
        ]);
        let order = resolve(&graph);

        assert!(order.is_degenerate_cycle(&graph));
        assert_eq!(order.groups[0].members, vec![0, 1, 2]);
    }
}
