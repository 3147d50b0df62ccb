//! Ordering & dependency resolution
//!
//! Computes the global weave order and the initialization order of
//! hierarchical transformations. Everything here is pure sorting except the
//! fatal cases: duplicate ids, tied coordinates and dependency cycles.

pub mod graph;
pub mod initialize;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::error::{Result, WeaveError};
use crate::model::{SourceProgram, Transformation, TransformationId};

pub use graph::DependencyGraph;
pub use initialize::{
    initialize, initialize_all, InitializationContext, InitializationFailure,
    InitializationResult, InitializationResults,
};

/// Stable sort by `(pipeline_step, within_type, within_instance)`.
///
/// Two transformations sharing all three coordinates cannot be ordered and
/// abort the weave, as does an id used twice.
pub fn sort_by_weave_order(transformations: &[Transformation]) -> Result<Vec<&Transformation>> {
    let mut seen = IndexSet::new();
    for t in transformations {
        if !seen.insert(t.id()) {
            return Err(WeaveError::DuplicateTransformation { id: t.id() });
        }
    }

    let mut ordered: Vec<&Transformation> = transformations.iter().collect();
    ordered.sort_by_key(|t| t.order());

    if let Some(pair) = ordered.windows(2).find(|w| w[0].order() == w[1].order()) {
        return Err(WeaveError::AmbiguousOrder {
            first: pair[0].id(),
            second: pair[1].id(),
            order: pair[0].order(),
        });
    }
    Ok(ordered)
}

/// Sorted transformations plus the initialization order of the
/// hierarchical ones
#[derive(Debug, Clone)]
pub struct WeavePlan<'a> {
    ordered: Vec<&'a Transformation>,
    by_id: IndexMap<TransformationId, &'a Transformation>,
    initialization_order: Vec<TransformationId>,
}

impl<'a> WeavePlan<'a> {
    /// Sort, build the dependency graph and resolve it
    pub fn build(transformations: &'a [Transformation]) -> Result<Self> {
        let ordered = sort_by_weave_order(transformations)?;
        let graph = DependencyGraph::build(&ordered)?;
        let initialization_order = graph.topological_order()?;
        let by_id = ordered.iter().map(|t| (t.id(), *t)).collect();

        debug!(
            transformations = ordered.len(),
            hierarchical = initialization_order.len(),
            "weave plan resolved"
        );
        Ok(Self {
            ordered,
            by_id,
            initialization_order,
        })
    }

    /// All transformations in global weave order
    pub fn ordered(&self) -> &[&'a Transformation] {
        &self.ordered
    }

    pub fn initialization_order(&self) -> &[TransformationId] {
        &self.initialization_order
    }

    pub fn get(&self, id: TransformationId) -> Option<&'a Transformation> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    /// Run every hierarchical initializer in topological order
    pub fn initialize(
        &self,
        program: &SourceProgram,
        bag: &mut DiagnosticBag,
    ) -> InitializationResults {
        initialize_all(&self.initialization_order, &self.by_id, program, bag)
    }

    /// Drop every transformation that depends on one dropped after
    /// initialization, such as an introduction whose body failed to expand.
    ///
    /// Topological order puts dependencies first, so one pass reaches
    /// transitive dependents. Returns how many were dropped.
    pub fn fail_dependents(
        &self,
        results: &InitializationResults,
        bag: &mut DiagnosticBag,
    ) -> usize {
        let mut failed = 0;
        for id in &self.initialization_order {
            let Some(t) = self.get(*id) else {
                continue;
            };
            if bag.is_dropped(t.id()) {
                continue;
            }
            let dropped = t.dependencies().iter().copied().find(|d| bag.is_dropped(*d));
            let Some(dependency) = dropped else {
                continue;
            };
            match results.produced_key(dependency) {
                Some(key) => bag.contribution_failed(
                    t,
                    DiagnosticCode::TargetUnavailable,
                    format!("'{key}' was not introduced because {dependency} failed"),
                ),
                None => bag.contribution_failed(
                    t,
                    DiagnosticCode::DependencyFailed,
                    format!("dependency {dependency} failed"),
                ),
            }
            failed += 1;
        }
        failed
    }
}

#[cfg(test)]
mod tests;
