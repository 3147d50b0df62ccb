//! Declaration materializer
//!
//! Assembles the final declaration set: source declarations in their
//! original order, replacements in their original's slot, introductions
//! placed by insert position, and chain helpers directly after the member
//! they implement.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::chain::{ChainSet, InitialValue, KeyResolver, TargetCatalog, TargetEntry, TargetOrigin};
use crate::config::WeaveConfig;
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::insertion::InsertionReport;
use crate::model::{
    Accessor, Annotation, BodyFragment, ChainElementId, CompilationUnitId, DeclarationKey,
    DeclarationKind, Expression, InsertPosition, InsertRelation, Observability, Parameter,
    Signature, Statement, Transformation, TransformationId, TransformationKind, Viewer,
};
use crate::naming::NamingProvider;

/// How an output declaration relates to the base program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Disposition {
    Original,
    Modified,
    Introduced,
    Replacement { replaced: DeclarationKey },
    /// Non-final element of the chain of `of`
    ChainElement { of: DeclarationKey, accessor: Accessor },
    /// Computes the initial value of `of`
    InitializationHelper { of: DeclarationKey },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessorOutput {
    /// Chain element providing the body
    pub element: Option<ChainElementId>,
    pub body: Option<BodyFragment>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputDeclaration {
    pub key: DeclarationKey,
    pub name: String,
    pub kind: DeclarationKind,
    pub parent: Option<DeclarationKey>,
    pub unit: CompilationUnitId,
    pub signature: Signature,
    pub modifiers: Vec<String>,
    pub annotations: Vec<Annotation>,
    pub interfaces: Vec<String>,
    pub accessors: IndexMap<Accessor, AccessorOutput>,
    pub initializer: Option<Expression>,
    pub insert_position: Option<InsertPosition>,
    pub observability: Observability,
    /// Transformation that created this declaration
    pub origin: Option<TransformationId>,
    /// Every transformation that shaped it, in weave order
    pub contributors: Vec<TransformationId>,
    pub disposition: Disposition,
}

impl OutputDeclaration {
    pub fn body(&self, accessor: Accessor) -> Option<&BodyFragment> {
        self.accessors.get(&accessor).and_then(|a| a.body.as_ref())
    }

    pub fn is_helper(&self) -> bool {
        matches!(
            self.disposition,
            Disposition::ChainElement { .. } | Disposition::InitializationHelper { .. }
        )
    }
}

/// Materialized result of one weave
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaveOutput {
    /// Types followed by their members, recursively, in output order
    pub declarations: Vec<OutputDeclaration>,
    /// Source declarations removed by a Replace
    pub elided: Vec<DeclarationKey>,
    /// Names of chain elements, consulted only when printing
    pub chain_names: IndexMap<ChainElementId, String>,
}

impl WeaveOutput {
    pub fn get(&self, key: &DeclarationKey) -> Option<&OutputDeclaration> {
        self.declarations.iter().find(|d| &d.key == key)
    }

    pub fn contains(&self, key: &DeclarationKey) -> bool {
        self.get(key).is_some()
    }

    /// Declarations whose observability lets `viewer` see them
    pub fn visible_to(&self, viewer: Viewer) -> impl Iterator<Item = &OutputDeclaration> {
        self.declarations
            .iter()
            .filter(move |d| d.observability.is_visible_to(viewer))
    }

    pub fn children<'a>(
        &'a self,
        parent: &DeclarationKey,
    ) -> impl Iterator<Item = &'a OutputDeclaration> + 'a {
        let parent = parent.clone();
        self.declarations
            .iter()
            .filter(move |d| d.parent.as_ref() == Some(&parent))
    }

    pub fn by_unit(&self) -> IndexMap<&CompilationUnitId, Vec<&OutputDeclaration>> {
        let mut units: IndexMap<&CompilationUnitId, Vec<&OutputDeclaration>> = IndexMap::new();
        for declaration in &self.declarations {
            units.entry(&declaration.unit).or_default().push(declaration);
        }
        units
    }

    pub fn chain_name(&self, element: ChainElementId) -> Option<&str> {
        self.chain_names.get(&element).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

/// Per-type child order and resolved insert positions
#[derive(Default)]
struct Layout {
    children: IndexMap<DeclarationKey, Vec<DeclarationKey>>,
    positions: IndexMap<DeclarationKey, InsertPosition>,
}

pub struct Materializer<'a> {
    catalog: &'a TargetCatalog,
    resolver: &'a KeyResolver,
    chains: &'a ChainSet,
    insertions: &'a InsertionReport,
    config: &'a WeaveConfig,
}

impl<'a> Materializer<'a> {
    pub fn new(
        catalog: &'a TargetCatalog,
        resolver: &'a KeyResolver,
        chains: &'a ChainSet,
        insertions: &'a InsertionReport,
        config: &'a WeaveConfig,
    ) -> Self {
        Self {
            catalog,
            resolver,
            chains,
            insertions,
            config,
        }
    }

    pub fn materialize(
        &self,
        ordered: &[&Transformation],
        naming: &mut dyn NamingProvider,
        bag: &mut DiagnosticBag,
    ) -> WeaveOutput {
        let rank: IndexMap<TransformationId, usize> =
            ordered.iter().enumerate().map(|(i, t)| (t.id(), i)).collect();
        let by_id: IndexMap<TransformationId, &Transformation> =
            ordered.iter().map(|t| (t.id(), *t)).collect();

        let mut edits = DeclarationEdits::default();
        self.apply_edits(ordered, &mut edits, bag);
        let layout = self.layout(&by_id, bag);

        let mut contributors: IndexMap<DeclarationKey, Vec<TransformationId>> = IndexMap::new();
        for chain in self.chains.chains() {
            for &element in &chain.elements {
                if let Some(id) = self.chains.element(element).origin.transformation() {
                    contributors.entry(chain.member.clone()).or_default().push(id);
                }
            }
        }
        for (member, spliced) in self.insertions.iter() {
            contributors
                .entry(member.clone())
                .or_default()
                .extend(spliced.iter().copied());
        }
        for (key, ids) in &edits.contributors {
            contributors.entry(key.clone()).or_default().extend(ids.iter().copied());
        }

        let mut emitter = Emitter {
            materializer: self,
            edits: &edits,
            layout: &layout,
            contributors: &contributors,
            rank: &rank,
            out: Vec::new(),
        };
        for entry in self.catalog.iter().filter(|e| e.kind.is_type() && e.parent.is_none()) {
            emitter.emit_type(entry, naming);
        }
        let declarations = emitter.out;

        let elided: Vec<DeclarationKey> =
            self.resolver.replaced().map(|(k, _)| k.clone()).collect();
        info!(
            declarations = declarations.len(),
            elided = elided.len(),
            "declarations materialized"
        );
        WeaveOutput {
            declarations,
            elided,
            chain_names: self.chains.names().clone(),
        }
    }

    /// Annotation and interface edits in weave order
    fn apply_edits(
        &self,
        ordered: &[&Transformation],
        edits: &mut DeclarationEdits,
        bag: &mut DiagnosticBag,
    ) {
        for &t in ordered {
            if bag.is_dropped(t.id()) {
                continue;
            }
            if !matches!(
                t.kind(),
                TransformationKind::AddAnnotation { .. }
                    | TransformationKind::RemoveAnnotation { .. }
                    | TransformationKind::ImplementInterface { .. }
            ) {
                continue;
            }
            let target = self.resolver.resolve(t.target());
            let Some(entry) = self.catalog.get(target) else {
                let (code, message) = self.catalog.missing_target(target);
                bag.contribution_failed(t, code, message);
                continue;
            };

            match t.kind() {
                TransformationKind::AddAnnotation { annotation } => {
                    let annotations = edits.annotations_of(entry);
                    if !annotations.contains(annotation) {
                        annotations.push(annotation.clone());
                    }
                    edits.contributed(target, t.id());
                }
                TransformationKind::RemoveAnnotation { name } => {
                    let annotations = edits.annotations_of(entry);
                    let before = annotations.len();
                    annotations.retain(|a| &a.name != name);
                    if annotations.len() < before {
                        edits.contributed(target, t.id());
                    } else if self.config.report_missing_annotations {
                        bag.warning(
                            t,
                            DiagnosticCode::AnnotationMissing,
                            format!("'{target}' has no annotation '{name}' to remove"),
                        );
                    }
                }
                TransformationKind::ImplementInterface { interface, members } => {
                    let absent = members
                        .values()
                        .map(|key| self.resolver.resolve(key))
                        .find(|key| !self.catalog.contains(key));
                    if let Some(key) = absent {
                        let (code, message) = self.catalog.missing_target(key);
                        let message = format!("'{interface}' member: {message}");
                        bag.contribution_failed(t, code, message);
                        continue;
                    }
                    let interfaces = edits
                        .interfaces
                        .entry(target.clone())
                        .or_insert_with(|| entry.interfaces.clone());
                    if !interfaces.contains(interface) {
                        interfaces.push(interface.clone());
                    }
                    edits.contributed(target, t.id());
                }
                _ => {}
            }
        }
    }

    /// Child order of every type
    fn layout(
        &self,
        by_id: &IndexMap<TransformationId, &Transformation>,
        bag: &mut DiagnosticBag,
    ) -> Layout {
        let mut layout = Layout::default();
        for container in self.catalog.iter().filter(|e| e.kind.is_type()) {
            let mut placed: IndexSet<DeclarationKey> = IndexSet::new();
            let mut base = Vec::new();
            let mut tail = Vec::new();
            let mut before: IndexMap<DeclarationKey, Vec<DeclarationKey>> = IndexMap::new();
            let mut after: IndexMap<DeclarationKey, Vec<DeclarationKey>> = IndexMap::new();

            for child in self.catalog.children(&container.key) {
                if !matches!(child.origin, TargetOrigin::Introduced { .. }) {
                    placed.insert(child.key.clone());
                    base.push(child.key.clone());
                }
            }

            for child in self.catalog.children(&container.key) {
                let TargetOrigin::Introduced { transformation } = child.origin else {
                    continue;
                };
                let Some(position) = &child.position else {
                    tail.push(child.key.clone());
                    placed.insert(child.key.clone());
                    continue;
                };

                let anchor = self.resolver.resolve(&position.anchor).clone();
                let valid = match position.relation {
                    InsertRelation::Within => anchor == container.key,
                    InsertRelation::Before | InsertRelation::After => placed.contains(&anchor),
                };
                if !valid {
                    if let Some(t) = by_id.get(&transformation) {
                        bag.warning(
                            t,
                            DiagnosticCode::AnchorMissing,
                            format!(
                                "insert anchor '{}' is not a member of '{}'; '{}' is placed at the end of the type",
                                position.anchor, container.key, child.name
                            ),
                        );
                    }
                    tail.push(child.key.clone());
                    placed.insert(child.key.clone());
                    continue;
                }

                match position.relation {
                    InsertRelation::Within => tail.push(child.key.clone()),
                    InsertRelation::Before => {
                        before.entry(anchor.clone()).or_default().push(child.key.clone())
                    }
                    InsertRelation::After => {
                        after.entry(anchor.clone()).or_default().push(child.key.clone())
                    }
                }
                layout.positions.insert(
                    child.key.clone(),
                    InsertPosition {
                        relation: position.relation,
                        anchor,
                    },
                );
                placed.insert(child.key.clone());
            }

            let mut order = Vec::with_capacity(placed.len());
            for key in base.iter().chain(tail.iter()) {
                flatten(key, &before, &after, &mut order);
            }
            debug!(container = %container.key, members = order.len(), "layout resolved");
            layout.children.insert(container.key.clone(), order);
        }
        layout
    }
}

fn flatten(
    key: &DeclarationKey,
    before: &IndexMap<DeclarationKey, Vec<DeclarationKey>>,
    after: &IndexMap<DeclarationKey, Vec<DeclarationKey>>,
    order: &mut Vec<DeclarationKey>,
) {
    for k in before.get(key).into_iter().flatten() {
        flatten(k, before, after, order);
    }
    order.push(key.clone());
    for k in after.get(key).into_iter().flatten() {
        flatten(k, before, after, order);
    }
}

#[derive(Default)]
struct DeclarationEdits {
    annotations: IndexMap<DeclarationKey, Vec<Annotation>>,
    interfaces: IndexMap<DeclarationKey, Vec<String>>,
    contributors: IndexMap<DeclarationKey, Vec<TransformationId>>,
}

impl DeclarationEdits {
    fn annotations_of(&mut self, entry: &TargetEntry) -> &mut Vec<Annotation> {
        self.annotations
            .entry(entry.key.clone())
            .or_insert_with(|| entry.annotations.clone())
    }

    fn contributed(&mut self, key: &DeclarationKey, id: TransformationId) {
        self.contributors.entry(key.clone()).or_default().push(id);
    }
}

struct Emitter<'m, 'a> {
    materializer: &'m Materializer<'a>,
    edits: &'m DeclarationEdits,
    layout: &'m Layout,
    contributors: &'m IndexMap<DeclarationKey, Vec<TransformationId>>,
    rank: &'m IndexMap<TransformationId, usize>,
    out: Vec<OutputDeclaration>,
}

impl Emitter<'_, '_> {
    fn emit_type(&mut self, entry: &TargetEntry, naming: &mut dyn NamingProvider) {
        let declaration = self.declaration(entry);
        self.out.push(declaration);

        let catalog = self.materializer.catalog;
        let children = self.layout.children.get(&entry.key).cloned().unwrap_or_default();
        for key in children {
            let Some(child) = catalog.get(&key) else {
                continue;
            };
            if child.kind.is_type() {
                self.emit_type(child, naming);
            } else {
                self.emit_member(child, naming);
            }
        }
    }

    fn emit_member(&mut self, entry: &TargetEntry, naming: &mut dyn NamingProvider) {
        let mut declaration = self.declaration(entry);
        let mut helpers = self.chain_helpers(entry);

        match &entry.initializer {
            Some(InitialValue::Expression(e)) => declaration.initializer = Some(e.clone()),
            Some(InitialValue::Computed(body)) => match inline_value(body) {
                Some(e) => declaration.initializer = Some(e),
                None => {
                    if let Some(parent) = &entry.parent {
                        let name = naming.initialization_name(parent, &entry.name);
                        declaration.initializer = Some(Expression::Call {
                            callee: Box::new(Expression::Member {
                                object: Box::new(Expression::This),
                                name: name.clone(),
                            }),
                            arguments: Vec::new(),
                        });
                        helpers.push(self.initialization_helper(entry, parent, name, body.clone()));
                    }
                }
            },
            None => {}
        }

        self.out.push(declaration);
        self.out.extend(helpers);
    }

    fn declaration(&self, entry: &TargetEntry) -> OutputDeclaration {
        let chains = self.materializer.chains;
        let accessors = entry
            .accessors
            .iter()
            .map(|(&accessor, base)| {
                let output = match chains.outermost(&entry.key, accessor) {
                    Some(element) => AccessorOutput {
                        element: Some(element.id),
                        body: Some(element.body.clone()),
                    },
                    None => AccessorOutput {
                        element: None,
                        body: base.clone(),
                    },
                };
                (accessor, output)
            })
            .collect();

        let mut contributors: Vec<TransformationId> =
            entry.origin.transformation().into_iter().collect();
        if let Some(ids) = self.contributors.get(&entry.key) {
            contributors.extend(ids.iter().copied());
        }
        self.sort_by_rank(&mut contributors);

        let disposition = match &entry.origin {
            TargetOrigin::Source if contributors.is_empty() => Disposition::Original,
            TargetOrigin::Source => Disposition::Modified,
            TargetOrigin::Introduced { .. } => Disposition::Introduced,
            TargetOrigin::Replacement { replaced, .. } => Disposition::Replacement {
                replaced: replaced.clone(),
            },
        };

        OutputDeclaration {
            key: entry.key.clone(),
            name: entry.name.clone(),
            kind: entry.kind,
            parent: entry.parent.clone(),
            unit: entry.unit.clone(),
            signature: entry.signature.clone(),
            modifiers: entry.modifiers.clone(),
            annotations: self
                .edits
                .annotations
                .get(&entry.key)
                .cloned()
                .unwrap_or_else(|| entry.annotations.clone()),
            interfaces: self
                .edits
                .interfaces
                .get(&entry.key)
                .cloned()
                .unwrap_or_else(|| entry.interfaces.clone()),
            accessors,
            initializer: None,
            insert_position: self.layout.positions.get(&entry.key).cloned(),
            observability: entry.observability,
            origin: entry.origin.transformation(),
            contributors,
            disposition,
        }
    }

    /// One private method per non-final chain element, in chain order
    fn chain_helpers(&self, entry: &TargetEntry) -> Vec<OutputDeclaration> {
        let chains = self.materializer.chains;
        let Some(parent) = &entry.parent else {
            return Vec::new();
        };
        let mut helpers = Vec::new();
        for chain in chains.chains_of(&entry.key) {
            for &id in chain.helpers() {
                let Some(name) = chains.element_name(id) else {
                    continue;
                };
                let element = chains.element(id);
                let origin = element.origin.transformation();
                let mut accessors = IndexMap::new();
                accessors.insert(
                    Accessor::Body,
                    AccessorOutput {
                        element: Some(id),
                        body: Some(element.body.clone()),
                    },
                );
                helpers.push(OutputDeclaration {
                    key: DeclarationKey::member(parent, name),
                    name: name.to_string(),
                    kind: DeclarationKind::Method,
                    parent: Some(parent.clone()),
                    unit: entry.unit.clone(),
                    signature: helper_signature(&entry.signature, chain.accessor),
                    modifiers: vec!["private".to_string()],
                    annotations: Vec::new(),
                    interfaces: Vec::new(),
                    accessors,
                    initializer: None,
                    insert_position: Some(InsertPosition::after(&entry.key)),
                    observability: Observability::None,
                    origin,
                    contributors: origin.into_iter().collect(),
                    disposition: Disposition::ChainElement {
                        of: entry.key.clone(),
                        accessor: chain.accessor,
                    },
                });
            }
        }
        helpers
    }

    fn initialization_helper(
        &self,
        entry: &TargetEntry,
        parent: &DeclarationKey,
        name: String,
        body: BodyFragment,
    ) -> OutputDeclaration {
        let origin = entry.origin.transformation();
        let mut accessors = IndexMap::new();
        accessors.insert(
            Accessor::Body,
            AccessorOutput {
                element: None,
                body: Some(body),
            },
        );
        OutputDeclaration {
            key: DeclarationKey::member(parent, &name),
            name,
            kind: DeclarationKind::Method,
            parent: Some(parent.clone()),
            unit: entry.unit.clone(),
            signature: Signature {
                parameters: Vec::new(),
                return_type: entry.signature.return_type.clone(),
            },
            modifiers: vec!["private".to_string()],
            annotations: Vec::new(),
            interfaces: Vec::new(),
            accessors,
            initializer: None,
            insert_position: Some(InsertPosition::after(&entry.key)),
            observability: Observability::None,
            origin,
            contributors: origin.into_iter().collect(),
            disposition: Disposition::InitializationHelper {
                of: entry.key.clone(),
            },
        }
    }

    fn sort_by_rank(&self, ids: &mut Vec<TransformationId>) {
        ids.sort_by_key(|id| self.rank.get(id).copied().unwrap_or(usize::MAX));
        ids.dedup();
    }
}

/// A computed initial value that is a single expression
fn inline_value(body: &BodyFragment) -> Option<Expression> {
    match body.statements.as_slice() {
        [Statement::Return(Some(e))] | [Statement::Expression(e)] => Some(e.clone()),
        _ => None,
    }
}

/// Signature of a method standing in for one accessor
fn helper_signature(member: &Signature, accessor: Accessor) -> Signature {
    match accessor {
        Accessor::Body | Accessor::Get => member.clone(),
        Accessor::Set | Accessor::Add | Accessor::Remove => {
            let value_type = member.return_type.clone().unwrap_or_else(|| "object".to_string());
            let mut parameters = member.parameters.clone();
            parameters.push(Parameter::new("value", value_type));
            Signature {
                parameters,
                return_type: None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_expression_initializers_are_inlined() {
        let single = BodyFragment::new(vec![Statement::ret(Expression::int(3))]);
        assert_eq!(inline_value(&single), Some(Expression::int(3)));

        let several = BodyFragment::new(vec![
            Statement::Declare {
                name: "list".into(),
                value: Expression::call("NewList", vec![]),
            },
            Statement::ret(Expression::ident("list")),
        ]);
        assert_eq!(inline_value(&several), None);
    }

    #[test]
    fn test_setter_helpers_take_the_value() {
        let signature = Signature::new().returns("string");
        let helper = helper_signature(&signature, Accessor::Set);
        assert_eq!(helper.parameters, vec![Parameter::new("value", "string")]);
        assert_eq!(helper.return_type, None);
        assert_eq!(helper_signature(&signature, Accessor::Get), signature);
    }

    #[test]
    fn test_flatten_nests_anchored_members() {
        let key = |s: &str| DeclarationKey::new(s);
        let mut before = IndexMap::new();
        let mut after = IndexMap::new();
        before.insert(key("A"), vec![key("B1"), key("B2")]);
        after.insert(key("A"), vec![key("C")]);
        after.insert(key("C"), vec![key("D")]);

        let mut order = Vec::new();
        flatten(&key("A"), &before, &after, &mut order);
        let names: Vec<&str> = order.iter().map(DeclarationKey::as_str).collect();
        assert_eq!(names, vec!["B1", "B2", "A", "C", "D"]);
    }
}
