//! Dependency graph over hierarchical transformations.
//!
//! Nodes live in an arena and edges are arena indices. Kahn's algorithm
//! releases ready nodes through a min-heap keyed by weave order, so the
//! result is deterministic even among independent nodes.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use indexmap::{IndexMap, IndexSet};

use crate::error::{Result, WeaveError};
use crate::model::{Transformation, TransformationId, WeaveOrder};

#[derive(Debug, Clone)]
struct GraphNode {
    id: TransformationId,
    order: WeaveOrder,
    label: String,
    dependents: Vec<usize>,
    dependency_count: usize,
}

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<GraphNode>,
    index: IndexMap<TransformationId, usize>,
}

impl DependencyGraph {
    /// Build the graph from transformations already sorted in weave order.
    ///
    /// Members are every hierarchical transformation plus anything one of
    /// them depends on.
    pub fn build(ordered: &[&Transformation]) -> Result<Self> {
        let known: IndexSet<TransformationId> = ordered.iter().map(|t| t.id()).collect();

        let mut members: IndexSet<TransformationId> = IndexSet::new();
        for t in ordered.iter().filter(|t| t.is_hierarchical()) {
            members.insert(t.id());
            for dependency in t.dependencies() {
                if !known.contains(dependency) {
                    return Err(WeaveError::UnknownDependency {
                        transformation: t.to_display_string(),
                        dependency: *dependency,
                    });
                }
                members.insert(*dependency);
            }
        }

        let selected: Vec<&Transformation> = ordered
            .iter()
            .copied()
            .filter(|t| members.contains(&t.id()))
            .collect();

        let mut graph = DependencyGraph::default();
        for t in &selected {
            graph.index.insert(t.id(), graph.nodes.len());
            graph.nodes.push(GraphNode {
                id: t.id(),
                order: t.order(),
                label: t.to_display_string(),
                dependents: Vec::new(),
                dependency_count: 0,
            });
        }

        for (i, t) in selected.iter().enumerate() {
            let unique: IndexSet<&TransformationId> = t.dependencies().iter().collect();
            for dependency in unique {
                let d = graph.index[dependency];
                graph.nodes[d].dependents.push(i);
                graph.nodes[i].dependency_count += 1;
            }
        }

        Ok(graph)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: TransformationId) -> bool {
        self.index.contains_key(&id)
    }

    /// Topological order, ties broken by weave order
    pub fn topological_order(&self) -> Result<Vec<TransformationId>> {
        let mut remaining: Vec<usize> = self.nodes.iter().map(|n| n.dependency_count).collect();
        let mut ready: BinaryHeap<Reverse<(WeaveOrder, usize)>> = self
            .nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| n.dependency_count == 0)
            .map(|(i, n)| Reverse((n.order, i)))
            .collect();

        let mut sorted = Vec::with_capacity(self.nodes.len());
        while let Some(Reverse((_, i))) = ready.pop() {
            sorted.push(self.nodes[i].id);
            for &dependent in &self.nodes[i].dependents {
                remaining[dependent] -= 1;
                if remaining[dependent] == 0 {
                    ready.push(Reverse((self.nodes[dependent].order, dependent)));
                }
            }
        }

        if sorted.len() != self.nodes.len() {
            return Err(WeaveError::circular(self.cycle_members(&remaining)));
        }
        Ok(sorted)
    }

    /// Unresolved nodes that sit on or between cycles.
    ///
    /// Nodes that are merely downstream of a cycle are peeled off by
    /// repeatedly removing unresolved nodes with no unresolved dependents.
    fn cycle_members(&self, remaining: &[usize]) -> Vec<String> {
        let mut alive: Vec<bool> = remaining.iter().map(|&r| r > 0).collect();
        loop {
            let mut changed = false;
            for i in 0..self.nodes.len() {
                if alive[i] && !self.nodes[i].dependents.iter().any(|&d| alive[d]) {
                    alive[i] = false;
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        self.nodes
            .iter()
            .zip(alive)
            .filter(|(_, alive)| *alive)
            .map(|(n, _)| n.label.clone())
            .collect()
    }
}
