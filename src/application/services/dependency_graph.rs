//! Dependency graph service module
//!
//! This service builds a directed graph over the configured jobs, with an
//! edge from every dependency to its dependent, rejects cycles, and
//! produces the deterministic execution order: topological, with ties
//! broken by the position of the job in the original configuration list so
//! that user ordering is preserved where the graph permits.

use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use crate::application::services::registry::JobRegistry;
use crate::domain::errors::ConfigError;

/// Directed dependency graph over the configured jobs
#[derive(Debug)]
pub struct DependencyGraph {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
}

impl DependencyGraph {
    /// Builds the graph from a resolved registry and rejects cycles
    ///
    /// The registry has already established that every dependency resolves
    /// to a configured job, so only cycle detection can fail here.
    pub fn build(registry: &JobRegistry) -> Result<Self, ConfigError> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::with_capacity(registry.len());

        for identifier in registry.identifiers() {
            let node = graph.add_node(identifier.clone());
            indices.insert(identifier, node);
        }
        for descriptor in registry.descriptors() {
            let dependent = indices[&descriptor.identifier];
            for dependency in &descriptor.depends_on {
                graph.add_edge(indices[dependency], dependent, ());
            }
        }

        if let Err(cycle) = toposort(&graph, None) {
            return Err(ConfigError::DependencyCycle(
                graph[cycle.node_id()].clone(),
            ));
        }

        Ok(Self { graph, indices })
    }

    /// The deterministic execution order
    ///
    /// A Kahn walk over the graph; whenever more than one job is ready, the
    /// one earliest in the configuration list goes first.
    pub fn execution_order(&self, registry: &JobRegistry) -> Vec<String> {
        let position = |node: NodeIndex| registry.position(&self.graph[node]).unwrap_or(usize::MAX);

        let mut in_degree: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|node| {
                (
                    node,
                    self.graph
                        .neighbors_directed(node, Direction::Incoming)
                        .count(),
                )
            })
            .collect();

        let mut ready: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|node| in_degree[node] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.graph.node_count());

        while !ready.is_empty() {
            let slot = ready
                .iter()
                .enumerate()
                .min_by_key(|(_, &node)| position(node))
                .map(|(slot, _)| slot)
                .unwrap();
            let node = ready.swap_remove(slot);
            order.push(self.graph[node].clone());

            for successor in self.graph.neighbors_directed(node, Direction::Outgoing) {
                let remaining = in_degree.get_mut(&successor).unwrap();
                *remaining -= 1;
                if *remaining == 0 {
                    ready.push(successor);
                }
            }
        }

        order
    }

    /// Identifiers this job directly depends on, per the graph
    pub fn upstream(&self, identifier: &str) -> Vec<String> {
        match self.indices.get(identifier) {
            Some(&node) => self
                .graph
                .neighbors_directed(node, Direction::Incoming)
                .map(|dependency| self.graph[dependency].clone())
                .collect(),
            None => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::app::{JobApp, StaticLoader};
    use anyhow::Result;

    struct GraphApp {
        identifier: &'static str,
        depends_on: Vec<String>,
    }

    impl JobApp for GraphApp {
        fn identifier(&self) -> &str {
            self.identifier
        }

        fn depends_on(&self) -> Vec<String> {
            self.depends_on.clone()
        }

        fn execute(&mut self) -> Result<()> {
            Ok(())
        }
    }

    fn registry_of(jobs: Vec<(&'static str, Vec<&'static str>)>) -> JobRegistry {
        let mut loader = StaticLoader::new();
        let mut lines = Vec::new();
        for (identifier, depends_on) in jobs {
            let class_path = format!("jobs.{identifier}");
            let depends_on: Vec<String> = depends_on.iter().map(|d| d.to_string()).collect();
            loader.register(&class_path, move || {
                Box::new(GraphApp {
                    identifier,
                    depends_on: depends_on.clone(),
                })
            });
            lines.push(format!("{class_path}|5m"));
        }
        JobRegistry::build(&lines, &loader).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        let registry = registry_of(vec![("c", vec!["b"]), ("b", vec!["a"]), ("a", vec![])]);
        let graph = DependencyGraph::build(&registry).unwrap();

        assert_eq!(graph.execution_order(&registry), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ties_break_by_configuration_position() {
        // b is listed before a and nothing orders them; user order wins
        let registry = registry_of(vec![("b", vec![]), ("a", vec![]), ("z", vec!["a", "b"])]);
        let graph = DependencyGraph::build(&registry).unwrap();

        assert_eq!(graph.execution_order(&registry), vec!["b", "a", "z"]);
    }

    #[test]
    fn test_diamond_is_deterministic() {
        let registry = registry_of(vec![
            ("root", vec![]),
            ("left", vec!["root"]),
            ("right", vec!["root"]),
            ("sink", vec!["left", "right"]),
        ]);
        let graph = DependencyGraph::build(&registry).unwrap();

        let order = graph.execution_order(&registry);
        assert_eq!(order, vec!["root", "left", "right", "sink"]);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let registry = registry_of(vec![("a", vec!["b"]), ("b", vec!["a"])]);
        let err = DependencyGraph::build(&registry).unwrap_err();
        assert!(matches!(err, ConfigError::DependencyCycle(_)));
    }

    #[test]
    fn test_upstream_lists_direct_dependencies() {
        let registry = registry_of(vec![("a", vec![]), ("b", vec![]), ("c", vec!["a", "b"])]);
        let graph = DependencyGraph::build(&registry).unwrap();

        let mut upstream = graph.upstream("c");
        upstream.sort();
        assert_eq!(upstream, vec!["a", "b"]);
        assert!(graph.upstream("a").is_empty());
    }
}
