//! Every declaration a transformation may target after Replace resolution:
//! surviving source declarations plus introduced and replacement members,
//! with the bodies that form the base of their chains.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::resolver::KeyResolver;
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::expansion::{ExpansionContext, TemplateExpander};
use crate::model::{
    Accessor, Annotation, BodyFragment, CompilationUnitId, Declaration, DeclarationKey,
    DeclarationKind, Expression, InsertPosition, MemberSpec, Observability, Signature,
    SourceProgram, Transformation, TransformationId, TransformationKind,
};
use crate::ordering::InitializationResults;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "origin", rename_all = "snake_case")]
pub enum TargetOrigin {
    Source,
    Introduced {
        transformation: TransformationId,
    },
    Replacement {
        transformation: TransformationId,
        replaced: DeclarationKey,
    },
}

impl TargetOrigin {
    pub fn transformation(&self) -> Option<TransformationId> {
        match self {
            TargetOrigin::Source => None,
            TargetOrigin::Introduced { transformation }
            | TargetOrigin::Replacement { transformation, .. } => Some(*transformation),
        }
    }
}

/// Initial value of a field or property
#[derive(Debug, Clone, PartialEq)]
pub enum InitialValue {
    Expression(Expression),
    /// Expanded initializer template, possibly several statements
    Computed(BodyFragment),
}

#[derive(Debug, Clone)]
pub struct TargetEntry {
    pub key: DeclarationKey,
    pub name: String,
    pub kind: DeclarationKind,
    pub parent: Option<DeclarationKey>,
    pub unit: CompilationUnitId,
    pub signature: Signature,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub interfaces: Vec<String>,
    pub accessors: IndexMap<Accessor, Option<BodyFragment>>,
    pub initializer: Option<InitialValue>,
    pub position: Option<InsertPosition>,
    pub observability: Observability,
    pub origin: TargetOrigin,
}

impl TargetEntry {
    fn from_source(declaration: &Declaration) -> Self {
        Self {
            key: declaration.key.clone(),
            name: declaration.name.clone(),
            kind: declaration.kind,
            parent: declaration.parent.clone(),
            unit: declaration.unit.clone(),
            signature: declaration.signature.clone(),
            modifiers: declaration.modifiers.clone(),
            annotations: declaration.annotations.clone(),
            interfaces: declaration.interfaces.clone(),
            accessors: declaration.accessors.clone(),
            initializer: declaration.initializer.clone().map(InitialValue::Expression),
            position: None,
            observability: Observability::Always,
            origin: TargetOrigin::Source,
        }
    }

    fn from_member(
        key: DeclarationKey,
        parent: DeclarationKey,
        unit: CompilationUnitId,
        spec: &MemberSpec,
        expanded: ExpandedMember,
        transformation: &Transformation,
        origin: TargetOrigin,
    ) -> Self {
        Self {
            key,
            name: spec.name.clone(),
            kind: spec.kind,
            parent: Some(parent),
            unit,
            signature: spec.signature.clone(),
            modifiers: spec.modifiers.clone(),
            annotations: spec.annotations.clone(),
            interfaces: Vec::new(),
            accessors: expanded.accessors,
            initializer: expanded.initializer.map(InitialValue::Computed),
            position: spec.position.clone(),
            observability: transformation.observability(),
            origin,
        }
    }

    pub fn has_accessor(&self, accessor: Accessor) -> bool {
        self.accessors.contains_key(&accessor)
    }

    pub fn base_body(&self, accessor: Accessor) -> Option<&BodyFragment> {
        self.accessors.get(&accessor).and_then(Option::as_ref)
    }
}

/// Expanded bodies of an introduced or replacement member
#[derive(Debug, Clone, Default)]
pub struct ExpandedMember {
    pub accessors: IndexMap<Accessor, Option<BodyFragment>>,
    pub initializer: Option<BodyFragment>,
}

/// Expand the bodies of every initialized Introduce and Replace.
///
/// A member is all or nothing: if any accessor or the initializer fails,
/// the whole contribution is dropped.
pub fn expand_introductions<E: TemplateExpander + ?Sized>(
    ordered: &[&Transformation],
    results: &InitializationResults,
    expander: &E,
    bag: &mut DiagnosticBag,
) -> IndexMap<TransformationId, ExpandedMember> {
    let mut expanded = IndexMap::new();
    for t in ordered {
        let (Some(spec), Some(key)) = (t.member_spec(), results.produced_key(t.id())) else {
            continue;
        };
        if bag.is_dropped(t.id()) {
            continue;
        }
        match expand_member(t, spec, key, expander) {
            Ok(member) => {
                expanded.insert(t.id(), member);
            }
            Err((code, message)) => bag.contribution_failed(t, code, message),
        }
    }
    expanded
}

fn expand_member<E: TemplateExpander + ?Sized>(
    t: &Transformation,
    spec: &MemberSpec,
    key: &DeclarationKey,
    expander: &E,
) -> Result<ExpandedMember, (DiagnosticCode, String)> {
    let mut member = ExpandedMember::default();
    for (&accessor, template) in &spec.templates {
        if !spec.kind.accessors().contains(&accessor) {
            return Err((
                DiagnosticCode::InvalidTarget,
                format!("a {} has no '{accessor}' accessor", spec.kind),
            ));
        }
        let body = match template {
            Some(template) => {
                let context = ExpansionContext {
                    transformation: t,
                    target: key,
                    accessor,
                };
                let body = expander
                    .try_expand(template, &context)
                    .map_err(|e| (DiagnosticCode::ExpansionFailed, e.to_string()))?;
                if body.contains_proceed() {
                    return Err((
                        DiagnosticCode::ProceedOutsideChain,
                        format!("'{key}' {accessor} has no previous implementation to proceed to"),
                    ));
                }
                Some(body)
            }
            None => None,
        };
        member.accessors.insert(accessor, body);
    }

    if let Some(template) = &spec.initializer {
        let context = ExpansionContext {
            transformation: t,
            target: key,
            accessor: Accessor::Body,
        };
        let body = expander
            .try_expand(template, &context)
            .map_err(|e| (DiagnosticCode::ExpansionFailed, e.to_string()))?;
        member.initializer = Some(body);
    }
    Ok(member)
}

#[derive(Debug, Clone, Default)]
pub struct TargetCatalog {
    entries: IndexMap<DeclarationKey, TargetEntry>,
    unavailable: IndexSet<DeclarationKey>,
}

impl TargetCatalog {
    /// Source order first, replacements in their original's slot, then
    /// introductions in weave order
    pub fn build(
        program: &SourceProgram,
        ordered: &[&Transformation],
        results: &InitializationResults,
        resolver: &KeyResolver,
        mut expanded: IndexMap<TransformationId, ExpandedMember>,
    ) -> Self {
        let by_id: IndexMap<TransformationId, &Transformation> =
            ordered.iter().map(|t| (t.id(), *t)).collect();
        let mut catalog = TargetCatalog::default();

        for declaration in program.iter() {
            let Some(replacement) = resolver.replacement(&declaration.key) else {
                catalog.insert(TargetEntry::from_source(declaration));
                continue;
            };
            let Some(t) = by_id.get(&replacement.transformation) else {
                continue;
            };
            let (Some(spec), Some(parent), Some(member)) = (
                t.member_spec(),
                declaration.parent.clone(),
                expanded.shift_remove(&t.id()),
            ) else {
                continue;
            };
            let unit = t.container().cloned().unwrap_or_else(|| declaration.unit.clone());
            let origin = TargetOrigin::Replacement {
                transformation: t.id(),
                replaced: declaration.key.clone(),
            };
            catalog.insert(TargetEntry::from_member(
                replacement.key.clone(),
                parent,
                unit,
                spec,
                member,
                t,
                origin,
            ));
        }

        for t in ordered {
            let Some(member) = expanded.shift_remove(&t.id()) else {
                continue;
            };
            let (Some(spec), Some(key)) = (t.member_spec(), results.produced_key(t.id())) else {
                continue;
            };
            let unit = t
                .container()
                .cloned()
                .or_else(|| program.get(t.target()).map(|p| p.unit.clone()))
                .unwrap_or_default();
            let origin = TargetOrigin::Introduced {
                transformation: t.id(),
            };
            catalog.insert(TargetEntry::from_member(
                key.clone(),
                t.target().clone(),
                unit,
                spec,
                member,
                t,
                origin,
            ));
        }

        for t in ordered {
            let key = match (t.kind(), results.produced_key(t.id())) {
                (_, Some(key)) => key.clone(),
                (TransformationKind::Introduce { member }, None) => {
                    DeclarationKey::member(t.target(), &member.name)
                }
                _ => continue,
            };
            if !catalog.entries.contains_key(&key) {
                catalog.unavailable.insert(key);
            }
        }

        debug!(
            entries = catalog.entries.len(),
            unavailable = catalog.unavailable.len(),
            "target catalog built"
        );
        catalog
    }

    fn insert(&mut self, entry: TargetEntry) {
        self.entries.insert(entry.key.clone(), entry);
    }

    pub fn get(&self, key: &DeclarationKey) -> Option<&TargetEntry> {
        self.entries.get(key)
    }

    pub fn get_mut(&mut self, key: &DeclarationKey) -> Option<&mut TargetEntry> {
        self.entries.get_mut(key)
    }

    pub fn contains(&self, key: &DeclarationKey) -> bool {
        self.entries.contains_key(key)
    }

    /// Whether `key` would have been declared by a dropped contribution
    pub fn is_unavailable(&self, key: &DeclarationKey) -> bool {
        self.unavailable.contains(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &TargetEntry> {
        self.entries.values()
    }

    /// Direct children of `parent` in catalog order
    pub fn children<'a>(
        &'a self,
        parent: &DeclarationKey,
    ) -> impl Iterator<Item = &'a TargetEntry> + 'a {
        let parent = parent.clone();
        self.entries
            .values()
            .filter(move |e| e.parent.as_ref() == Some(&parent))
    }

    /// Diagnostic for a transformation whose resolved target is not in the
    /// catalog
    pub fn missing_target(&self, key: &DeclarationKey) -> (DiagnosticCode, String) {
        if self.is_unavailable(key) {
            (
                DiagnosticCode::TargetUnavailable,
                format!("'{key}' was not introduced because its contribution failed"),
            )
        } else {
            (
                DiagnosticCode::TargetNotFound,
                format!("target '{key}' does not exist"),
            )
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
