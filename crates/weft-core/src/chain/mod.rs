//! Chain builder
//!
//! Groups Override and Redirect transformations by resolved target and
//! accessor and links them into one proceed chain per accessor. The base of
//! a chain is the source body or the expanded introduced body; every
//! override proceeds to the element immediately before it.
//!
//! Redirect always terminates the chain of the accessors it covers,
//! whatever its weave order. Overrides of a redirected accessor are not
//! woven: from the redirect's own layer they conflict, from other layers
//! they are superseded.

pub mod arena;
pub mod catalog;
pub mod resolver;

use indexmap::IndexMap;
use tracing::{debug, info};

use crate::config::WeaveConfig;
use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::expansion::{ExpansionContext, TemplateExpander};
use crate::model::{
    Accessor, BodyFragment, ChainElementId, DeclarationKey, Expression, Statement,
    Transformation, TransformationId, TransformationKind,
};
use crate::naming::NamingProvider;

pub use arena::{Chain, ChainArena, ChainElement, ChainSet, ElementOrigin};
pub use catalog::{
    expand_introductions, ExpandedMember, InitialValue, TargetCatalog, TargetEntry, TargetOrigin,
};
pub use resolver::{claim_replacements, KeyResolver, Replacement};

/// Override that passed validation and expansion
struct PendingOverride<'t> {
    transformation: &'t Transformation,
    bodies: IndexMap<Accessor, BodyFragment>,
}

pub struct ChainBuilder<'a, E: TemplateExpander + ?Sized> {
    catalog: &'a TargetCatalog,
    resolver: &'a KeyResolver,
    expander: &'a E,
    config: &'a WeaveConfig,
}

impl<'a, E: TemplateExpander + ?Sized> ChainBuilder<'a, E> {
    pub fn new(
        catalog: &'a TargetCatalog,
        resolver: &'a KeyResolver,
        expander: &'a E,
        config: &'a WeaveConfig,
    ) -> Self {
        Self {
            catalog,
            resolver,
            expander,
            config,
        }
    }

    pub fn build(
        &self,
        ordered: &[&Transformation],
        naming: &mut dyn NamingProvider,
        bag: &mut DiagnosticBag,
    ) -> ChainSet {
        let redirects = self.claim_redirects(ordered, bag);
        let overrides = self.collect_overrides(ordered, &redirects, bag);
        let by_id: IndexMap<TransformationId, &Transformation> =
            ordered.iter().map(|t| (t.id(), *t)).collect();

        let mut arena = ChainArena::default();
        let mut chains = Vec::new();
        for entry in self.catalog.iter() {
            for (&accessor, base) in &entry.accessors {
                let slot = (entry.key.clone(), accessor);
                if let Some(redirect) = redirects.get(&slot) {
                    chains.push(self.redirect_chain(&mut arena, entry, accessor, redirect));
                    continue;
                }
                let Some(base) = base else {
                    continue;
                };
                let pending = overrides
                    .get(&entry.key)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                let chain = self.override_chain(&mut arena, entry, accessor, base, pending, &by_id);
                chains.push(chain);
            }
        }

        let mut set = ChainSet::new(arena);
        for chain in chains {
            set.insert(chain);
        }
        self.name_helpers(&mut set, naming);

        info!(
            chains = set.chains().count(),
            elements = set.element_count(),
            helpers = set.names().len(),
            "proceed chains built"
        );
        set
    }

    /// Validate redirects; the earliest redirect of an accessor wins
    fn claim_redirects<'t>(
        &self,
        ordered: &[&'t Transformation],
        bag: &mut DiagnosticBag,
    ) -> IndexMap<(DeclarationKey, Accessor), Redirect<'t>> {
        let mut claimed: IndexMap<(DeclarationKey, Accessor), Redirect<'t>> = IndexMap::new();

        for &t in ordered {
            let TransformationKind::Redirect { to, accessors } = t.kind() else {
                continue;
            };
            if bag.is_dropped(t.id()) {
                continue;
            }
            let target = self.resolver.resolve(t.target());
            let Some(entry) = self.catalog.get(target) else {
                let (code, message) = self.catalog.missing_target(target);
                bag.contribution_failed(t, code, message);
                continue;
            };

            let covered: Vec<Accessor> = if accessors.is_empty() {
                entry.accessors.keys().copied().collect()
            } else {
                accessors.clone()
            };
            if covered.is_empty() {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::InvalidTarget,
                    format!("'{target}' is a {} and has nothing to redirect", entry.kind),
                );
                continue;
            }
            if let Some(missing) = covered.iter().find(|a| !entry.has_accessor(**a)) {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::AccessorMissing,
                    format!("'{target}' has no '{missing}' accessor"),
                );
                continue;
            }

            let destination = self.resolver.resolve(to);
            let invalid = match self.catalog.get(destination) {
                None => Some(format!("redirect destination '{to}' does not exist")),
                Some(_) if destination == target => {
                    Some(format!("'{target}' cannot be redirected to itself"))
                }
                Some(dest) => covered
                    .iter()
                    .find(|a| !dest.has_accessor(**a))
                    .map(|a| format!("redirect destination '{destination}' has no '{a}' accessor")),
            };
            if let Some(message) = invalid {
                bag.contribution_failed(t, DiagnosticCode::RedirectTargetInvalid, message);
                continue;
            }

            let conflict = covered
                .iter()
                .find_map(|a| claimed.get(&(target.clone(), *a)).map(|r| (*a, r)));
            if let Some((accessor, winner)) = conflict {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::RedirectConflict,
                    format!(
                        "'{target}' {accessor} is already redirected by {}",
                        winner.transformation
                    ),
                );
                continue;
            }

            debug!(transformation = %t.id(), %target, %destination, "redirect claimed");
            for accessor in covered {
                claimed.insert(
                    (target.clone(), accessor),
                    Redirect {
                        transformation: t,
                        destination: destination.clone(),
                    },
                );
            }
        }
        claimed
    }

    /// Validate and expand overrides, grouped by resolved target in weave
    /// order
    fn collect_overrides<'t>(
        &self,
        ordered: &[&'t Transformation],
        redirects: &IndexMap<(DeclarationKey, Accessor), Redirect<'t>>,
        bag: &mut DiagnosticBag,
    ) -> IndexMap<DeclarationKey, Vec<PendingOverride<'t>>> {
        let mut grouped: IndexMap<DeclarationKey, Vec<PendingOverride<'t>>> = IndexMap::new();

        for &t in ordered {
            let TransformationKind::Override { templates } = t.kind() else {
                continue;
            };
            if bag.is_dropped(t.id()) {
                continue;
            }
            let target = self.resolver.resolve(t.target());
            let Some(entry) = self.catalog.get(target) else {
                let (code, message) = self.catalog.missing_target(target);
                bag.contribution_failed(t, code, message);
                continue;
            };
            if entry.kind.accessors().is_empty() {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::InvalidTarget,
                    format!("'{target}' is a {} and cannot be overridden", entry.kind),
                );
                continue;
            }
            if templates.is_empty() {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::InvalidTarget,
                    format!("override of '{target}' names no accessor"),
                );
                continue;
            }
            if let Some(missing) = templates.keys().find(|a| !entry.has_accessor(**a)) {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::AccessorMissing,
                    format!("'{target}' has no '{missing}' accessor"),
                );
                continue;
            }

            let redirected: Vec<(Accessor, &Redirect<'t>)> = templates
                .keys()
                .filter_map(|a| redirects.get(&(target.clone(), *a)).map(|r| (*a, r)))
                .collect();
            if let Some((accessor, redirect)) = redirected
                .iter()
                .find(|(_, r)| r.transformation.layer() == t.layer())
            {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::RedirectConflict,
                    format!(
                        "'{target}' {accessor} is both overridden and redirected in layer '{}' ({})",
                        t.layer(),
                        redirect.transformation
                    ),
                );
                continue;
            }
            if self.config.report_superseded_overrides {
                for (accessor, redirect) in &redirected {
                    bag.warning(
                        t,
                        DiagnosticCode::SupersededByRedirect,
                        format!(
                            "override of '{target}' {accessor} is superseded by {}",
                            redirect.transformation
                        ),
                    );
                }
            }

            let remaining: Vec<Accessor> = templates
                .keys()
                .copied()
                .filter(|a| !redirected.iter().any(|(r, _)| r == a))
                .collect();
            if remaining.is_empty() {
                bag.drop_silently(t.id());
                continue;
            }
            if let Some(bodiless) = remaining.iter().find(|a| entry.base_body(**a).is_none()) {
                bag.contribution_failed(
                    t,
                    DiagnosticCode::NoImplementation,
                    format!("'{target}' {bodiless} has no implementation to override"),
                );
                continue;
            }

            let mut bodies = IndexMap::new();
            let mut failure = None;
            for accessor in remaining {
                let context = ExpansionContext {
                    transformation: t,
                    target,
                    accessor,
                };
                match self.expander.try_expand(&templates[&accessor], &context) {
                    Ok(body) => {
                        bodies.insert(accessor, body);
                    }
                    Err(e) => {
                        failure = Some(e);
                        break;
                    }
                }
            }
            if let Some(e) = failure {
                bag.contribution_failed(t, DiagnosticCode::ExpansionFailed, e.to_string());
                continue;
            }

            grouped.entry(target.clone()).or_default().push(PendingOverride {
                transformation: t,
                bodies,
            });
        }
        grouped
    }

    fn redirect_chain(
        &self,
        arena: &mut ChainArena,
        entry: &TargetEntry,
        accessor: Accessor,
        redirect: &Redirect<'_>,
    ) -> Chain {
        let t = redirect.transformation;
        let id = arena.alloc(
            entry.key.clone(),
            accessor,
            t.layer().clone(),
            ElementOrigin::Redirect {
                transformation: t.id(),
            },
            None,
        );
        let forward = Expression::Forward {
            target: redirect.destination.clone(),
            accessor,
            arguments: entry.signature.forwarding_arguments(accessor),
        };
        arena.get_mut(id).body = BodyFragment::new(vec![if returns_value(entry, accessor) {
            Statement::ret(forward)
        } else {
            Statement::expr(forward)
        }]);
        Chain {
            member: entry.key.clone(),
            accessor,
            elements: vec![id],
        }
    }

    fn override_chain(
        &self,
        arena: &mut ChainArena,
        entry: &TargetEntry,
        accessor: Accessor,
        base: &BodyFragment,
        pending: &[PendingOverride<'_>],
        by_id: &IndexMap<TransformationId, &Transformation>,
    ) -> Chain {
        let (layer, origin) = match entry.origin.transformation() {
            Some(id) => (
                by_id
                    .get(&id)
                    .map(|t| t.layer().clone())
                    .unwrap_or_else(|| self.config.source_layer()),
                ElementOrigin::Introduced { transformation: id },
            ),
            None => (self.config.source_layer(), ElementOrigin::Source),
        };
        let base_id = arena.alloc(entry.key.clone(), accessor, layer, origin, None);
        arena.get_mut(base_id).body = base.clone();

        let mut elements = vec![base_id];
        let mut previous = base_id;
        for p in pending {
            let Some(body) = p.bodies.get(&accessor) else {
                continue;
            };
            let t = p.transformation;
            let id = arena.alloc(
                entry.key.clone(),
                accessor,
                t.layer().clone(),
                ElementOrigin::Override {
                    transformation: t.id(),
                },
                Some(previous),
            );
            arena.get_mut(id).body = link_proceed(body.clone(), previous, accessor, entry);
            elements.push(id);
            previous = id;
        }

        Chain {
            member: entry.key.clone(),
            accessor,
            elements,
        }
    }

    /// Give every non-final element a name unique within its type
    fn name_helpers(&self, set: &mut ChainSet, naming: &mut dyn NamingProvider) {
        for entry in self.catalog.iter() {
            if let Some(parent) = &entry.parent {
                naming.reserve(parent, &entry.name);
            }
        }

        let mut assigned = Vec::new();
        for chain in set.chains() {
            let Some(entry) = self.catalog.get(&chain.member) else {
                continue;
            };
            let Some(parent) = &entry.parent else {
                continue;
            };
            let member = chain.accessor.member_name(&entry.name);
            for &helper in chain.helpers() {
                let layer = &set.element(helper).layer;
                assigned.push((helper, naming.override_name(parent, layer, &member)));
            }
        }
        for (element, name) in assigned {
            set.name(element, name);
        }
    }
}

struct Redirect<'t> {
    transformation: &'t Transformation,
    destination: DeclarationKey,
}

fn returns_value(entry: &TargetEntry, accessor: Accessor) -> bool {
    match accessor {
        Accessor::Get => true,
        Accessor::Body => entry
            .signature
            .return_type
            .as_deref()
            .is_some_and(|t| t != "void"),
        Accessor::Set | Accessor::Add | Accessor::Remove => false,
    }
}

/// Point every proceed marker at `previous`
fn link_proceed(
    body: BodyFragment,
    previous: ChainElementId,
    accessor: Accessor,
    entry: &TargetEntry,
) -> BodyFragment {
    body.rewrite(|expression| match expression {
        Expression::Proceed { arguments } => Expression::ChainCall {
            element: previous,
            accessor,
            arguments: arguments.unwrap_or_else(|| entry.signature.forwarding_arguments(accessor)),
        },
        other => other,
    })
}
