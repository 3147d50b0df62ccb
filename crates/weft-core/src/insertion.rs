//! Insertion merger
//!
//! Splices InsertStatement fragments at the entry of the outermost visible
//! implementation of a method or constructor. Fragments are ordered by
//! position rank first (`Initializer` before everything else) and weave
//! order second.

use indexmap::IndexMap;
use tracing::debug;

use crate::chain::{ChainSet, KeyResolver, TargetCatalog};
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::expansion::{ExpansionContext, TemplateExpander};
use crate::model::{
    Accessor, DeclarationKey, DeclarationKind, Statement, Transformation, TransformationId,
    TransformationKind,
};

/// Fragments spliced into each member, in body order
#[derive(Debug, Clone, Default)]
pub struct InsertionReport {
    spliced: IndexMap<DeclarationKey, Vec<TransformationId>>,
}

impl InsertionReport {
    pub fn spliced_into(&self, member: &DeclarationKey) -> &[TransformationId] {
        self.spliced.get(member).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DeclarationKey, &Vec<TransformationId>)> {
        self.spliced.iter()
    }

    /// Total number of fragments spliced
    pub fn count(&self) -> usize {
        self.spliced.values().map(Vec::len).sum()
    }
}

pub fn merge_insertions<E: TemplateExpander + ?Sized>(
    ordered: &[&Transformation],
    catalog: &TargetCatalog,
    resolver: &KeyResolver,
    chains: &mut ChainSet,
    expander: &E,
    bag: &mut DiagnosticBag,
) -> InsertionReport {
    let mut groups: IndexMap<DeclarationKey, Vec<&Transformation>> = IndexMap::new();
    for &t in ordered {
        let is_insertion = matches!(t.kind(), TransformationKind::InsertStatement { .. });
        if !is_insertion || bag.is_dropped(t.id()) {
            continue;
        }
        let target = resolver.resolve(t.target());
        let Some(entry) = catalog.get(target) else {
            let (code, message) = catalog.missing_target(target);
            bag.contribution_failed(t, code, message);
            continue;
        };
        if !matches!(entry.kind, DeclarationKind::Method | DeclarationKind::Constructor) {
            bag.contribution_failed(
                t,
                DiagnosticCode::InvalidTarget,
                format!(
                    "statements can only be inserted into methods and constructors, not a {}",
                    entry.kind
                ),
            );
            continue;
        }
        if chains.outermost(target, Accessor::Body).is_none() {
            bag.contribution_failed(
                t,
                DiagnosticCode::NoImplementation,
                format!("'{target}' has no body to insert into"),
            );
            continue;
        }
        groups.entry(target.clone()).or_default().push(t);
    }

    let mut report = InsertionReport::default();
    for (target, mut group) in groups {
        group.sort_by_key(|t| (position_rank(t), t.order()));

        let mut statements: Vec<Statement> = Vec::new();
        let mut spliced = Vec::new();
        for t in group {
            let TransformationKind::InsertStatement { template, .. } = t.kind() else {
                continue;
            };
            let context = ExpansionContext {
                transformation: t,
                target: &target,
                accessor: Accessor::Body,
            };
            match expander.try_expand(template, &context) {
                Ok(fragment) if fragment.contains_proceed() => bag.contribution_failed(
                    t,
                    DiagnosticCode::ProceedOutsideChain,
                    "inserted statements cannot proceed to a previous implementation",
                ),
                Ok(fragment) => {
                    statements.extend(fragment.statements);
                    spliced.push(t.id());
                }
                Err(e) => {
                    bag.contribution_failed(t, DiagnosticCode::ExpansionFailed, e.to_string())
                }
            }
        }

        if spliced.is_empty() {
            continue;
        }
        let outermost = chains.chain(&target, Accessor::Body).and_then(|c| c.outermost());
        let Some(outermost) = outermost else {
            continue;
        };
        debug!(%target, fragments = spliced.len(), element = %outermost, "statements spliced");
        chains.element_mut(outermost).body.prepend(statements);
        report.spliced.insert(target, spliced);
    }
    report
}

fn position_rank(t: &Transformation) -> u8 {
    match t.kind() {
        TransformationKind::InsertStatement { position, .. } => position.rank(),
        _ => u8::MAX,
    }
}
