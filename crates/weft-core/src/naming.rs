//! Naming provider contract.
//!
//! Chain elements that are no longer the visible implementation of a member
//! need their own identifier. Names must be deterministic and collision-free
//! for a given `(type, layer, member)` triple across the whole weave.

use indexmap::{IndexMap, IndexSet};
use regex::Regex;

use crate::model::{AspectLayerId, DeclarationKey, SourceProgram};

pub trait NamingProvider {
    /// Name of a non-final chain element of `member` contributed by `layer`
    fn override_name(
        &mut self,
        target_type: &DeclarationKey,
        layer: &AspectLayerId,
        member: &str,
    ) -> String;

    /// Name of a synthesized method computing an introduced member's
    /// initial value
    fn initialization_name(&mut self, target_type: &DeclarationKey, member: &str) -> String;

    /// Claim a name declared in `target_type` by other means
    fn reserve(&mut self, target_type: &DeclarationKey, name: &str);
}

/// Derives names from the member and layer, adding numeric suffixes on
/// collision
#[derive(Debug, Clone)]
pub struct DefaultNamingProvider {
    taken: IndexMap<DeclarationKey, IndexSet<String>>,
    invalid: Regex,
}

impl DefaultNamingProvider {
    pub fn new() -> Self {
        Self {
            taken: IndexMap::new(),
            invalid: Regex::new(r"[^A-Za-z0-9_]+").expect("identifier pattern is valid"),
        }
    }

    /// Provider seeded with every member name of the program
    pub fn for_program(program: &SourceProgram) -> Self {
        let mut provider = Self::new();
        for declaration in program.iter() {
            if let Some(parent) = &declaration.parent {
                provider.reserve(parent, &declaration.name);
            }
        }
        provider
    }

    fn sanitize(&self, raw: &str) -> String {
        let cleaned = self.invalid.replace_all(raw, "_");
        let trimmed = cleaned.trim_matches('_');
        if trimmed.is_empty() {
            "_".to_string()
        } else if trimmed.starts_with(|c: char| c.is_ascii_digit()) {
            format!("_{trimmed}")
        } else {
            trimmed.to_string()
        }
    }

    fn unique(&mut self, target_type: &DeclarationKey, candidate: String) -> String {
        let names = self.taken.entry(target_type.clone()).or_default();
        let mut name = candidate.clone();
        let mut suffix = 2;
        while names.contains(&name) {
            name = format!("{candidate}{suffix}");
            suffix += 1;
        }
        names.insert(name.clone());
        name
    }
}

impl Default for DefaultNamingProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl NamingProvider for DefaultNamingProvider {
    fn override_name(
        &mut self,
        target_type: &DeclarationKey,
        layer: &AspectLayerId,
        member: &str,
    ) -> String {
        let candidate = format!("{}_{}", self.sanitize(member), self.sanitize(layer.as_str()));
        self.unique(target_type, candidate)
    }

    fn initialization_name(&mut self, target_type: &DeclarationKey, member: &str) -> String {
        let candidate = format!("Initialize_{}", self.sanitize(member));
        self.unique(target_type, candidate)
    }

    fn reserve(&mut self, target_type: &DeclarationKey, name: &str) {
        self.taken
            .entry(target_type.clone())
            .or_default()
            .insert(name.to_string());
    }
}
