//! Replace pre-pass and the stable-key resolution table.

use indexmap::IndexMap;
use tracing::debug;

use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::model::{DeclarationKey, Transformation, TransformationId, TransformationKind};
use crate::ordering::{InitializationResult, InitializationResults};

/// Drop every Replace whose original is claimed more than once.
///
/// Runs before initialization so that neither claimant installs a
/// replacement. One diagnostic names all claimants.
pub fn claim_replacements(ordered: &[&Transformation], bag: &mut DiagnosticBag) {
    let mut claims: IndexMap<&DeclarationKey, Vec<&Transformation>> = IndexMap::new();
    for t in ordered {
        if matches!(t.kind(), TransformationKind::Replace { .. }) && !bag.is_dropped(t.id()) {
            claims.entry(t.target()).or_default().push(t);
        }
    }

    for (original, claimants) in claims {
        if claimants.len() < 2 {
            continue;
        }
        let names: Vec<String> = claimants.iter().map(|t| t.to_display_string()).collect();
        bag.contribution_failed(
            claimants[0],
            DiagnosticCode::ReplaceConflict,
            format!("'{original}' is replaced more than once: {}", names.join("; ")),
        );
        for t in &claimants[1..] {
            bag.drop_silently(t.id());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Replacement {
    pub key: DeclarationKey,
    pub transformation: TransformationId,
}

/// Maps an original declaration key to the key of its replacement.
///
/// Written once from the initialization results and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct KeyResolver {
    table: IndexMap<DeclarationKey, Replacement>,
}

impl KeyResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table of every replacement that survived initialization and body
    /// expansion
    pub fn from_results(results: &InitializationResults, bag: &DiagnosticBag) -> Self {
        let mut resolver = Self::new();
        for (id, result) in results.iter().filter(|(id, _)| !bag.is_dropped(**id)) {
            if let InitializationResult::Replaced { original, key } = result {
                debug!(%original, replacement = %key, "key rewritten");
                resolver.table.insert(
                    original.clone(),
                    Replacement {
                        key: key.clone(),
                        transformation: *id,
                    },
                );
            }
        }
        resolver
    }

    /// Current resolution target of `key`, following replacements
    pub fn resolve<'k>(&'k self, key: &'k DeclarationKey) -> &'k DeclarationKey {
        let mut current = key;
        for _ in 0..=self.table.len() {
            match self.table.get(current) {
                Some(next) if next.key != *current => current = &next.key,
                _ => break,
            }
        }
        current
    }

    pub fn is_replaced(&self, key: &DeclarationKey) -> bool {
        self.table.contains_key(key)
    }

    pub fn replacement(&self, original: &DeclarationKey) -> Option<&Replacement> {
        self.table.get(original)
    }

    /// Replaced originals, in initialization order
    pub fn replaced(&self) -> impl Iterator<Item = (&DeclarationKey, &Replacement)> {
        self.table.iter()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}
