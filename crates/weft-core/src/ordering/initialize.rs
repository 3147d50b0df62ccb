//! Initialization of hierarchical transformations.
//!
//! Runs in topological order. Each transformation sees the results already
//! computed for its dependencies and nothing else.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::diagnostics::{DiagnosticBag, DiagnosticCode};
use crate::model::{
    DeclarationKey, DeclarationKind, SourceProgram, Transformation, TransformationId,
    TransformationKind,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum InitializationResult {
    Empty,
    /// Key claimed for an introduced member
    Introduced { key: DeclarationKey, name: String },
    /// Key claimed for the replacement of `original`
    Replaced {
        original: DeclarationKey,
        key: DeclarationKey,
    },
    /// Interface members mapped to their implementing declarations
    Interface {
        interface: String,
        members: IndexMap<String, DeclarationKey>,
    },
    Failed,
}

impl InitializationResult {
    /// Declaration key produced by an introduction or replacement
    pub fn produced_key(&self) -> Option<&DeclarationKey> {
        match self {
            InitializationResult::Introduced { key, .. }
            | InitializationResult::Replaced { key, .. } => Some(key),
            _ => None,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, InitializationResult::Failed)
    }
}

/// Results keyed by transformation, in initialization order
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializationResults {
    results: IndexMap<TransformationId, InitializationResult>,
}

impl InitializationResults {
    pub fn get(&self, id: TransformationId) -> Option<&InitializationResult> {
        self.results.get(&id)
    }

    pub fn produced_key(&self, id: TransformationId) -> Option<&DeclarationKey> {
        self.get(id).and_then(InitializationResult::produced_key)
    }

    /// Initialization order
    pub fn order(&self) -> impl Iterator<Item = TransformationId> + '_ {
        self.results.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TransformationId, &InitializationResult)> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// State shared by initializers within one weave
pub struct InitializationContext<'a> {
    program: &'a SourceProgram,
    claimed: IndexMap<DeclarationKey, TransformationId>,
}

impl<'a> InitializationContext<'a> {
    pub fn new(program: &'a SourceProgram) -> Self {
        Self {
            program,
            claimed: IndexMap::new(),
        }
    }

    pub fn program(&self) -> &'a SourceProgram {
        self.program
    }

    /// Claim `key` for `owner`, failing if the program or an earlier
    /// initializer already declares it. `allowed` may be re-declared.
    fn claim(
        &mut self,
        key: DeclarationKey,
        owner: TransformationId,
        allowed: Option<&DeclarationKey>,
    ) -> Result<DeclarationKey, InitializationFailure> {
        if let Some(previous) = self.claimed.get(&key) {
            return Err(InitializationFailure::new(
                DiagnosticCode::DeclarationExists,
                format!("'{key}' is already introduced by {previous}"),
            ));
        }
        if self.program.contains(&key) && allowed != Some(&key) {
            return Err(InitializationFailure::new(
                DiagnosticCode::DeclarationExists,
                format!("'{key}' is already declared"),
            ));
        }
        self.claimed.insert(key.clone(), owner);
        Ok(key)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InitializationFailure {
    pub code: DiagnosticCode,
    pub message: String,
}

impl InitializationFailure {
    fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Compute the initialization result of one transformation
pub fn initialize(
    transformation: &Transformation,
    context: &mut InitializationContext<'_>,
    dependencies: &IndexMap<TransformationId, InitializationResult>,
) -> Result<InitializationResult, InitializationFailure> {
    let program = context.program();
    let target = transformation.target();

    match transformation.kind() {
        TransformationKind::Introduce { member } => {
            let parent = program.get(target).ok_or_else(|| {
                InitializationFailure::new(
                    DiagnosticCode::TargetNotFound,
                    format!("containing type '{target}' does not exist"),
                )
            })?;
            if !parent.kind.is_type() {
                return Err(InitializationFailure::new(
                    DiagnosticCode::InvalidTarget,
                    format!("'{target}' is a {}, not a type", parent.kind),
                ));
            }
            if member.kind == DeclarationKind::Type {
                return Err(InitializationFailure::new(
                    DiagnosticCode::InvalidTarget,
                    "nested types cannot be introduced",
                ));
            }
            let key = context.claim(
                DeclarationKey::member(target, &member.name),
                transformation.id(),
                None,
            )?;
            Ok(InitializationResult::Introduced {
                key,
                name: member.name.clone(),
            })
        }
        TransformationKind::Replace { replacement } => {
            let original = program.get(target).ok_or_else(|| {
                InitializationFailure::new(
                    DiagnosticCode::TargetNotFound,
                    format!("replaced declaration '{target}' does not exist"),
                )
            })?;
            let parent = original.parent.as_ref().ok_or_else(|| {
                InitializationFailure::new(
                    DiagnosticCode::InvalidTarget,
                    format!("'{target}' is a type and cannot be replaced"),
                )
            })?;
            let key = context.claim(
                DeclarationKey::member(parent, &replacement.name),
                transformation.id(),
                Some(target),
            )?;
            Ok(InitializationResult::Replaced {
                original: target.clone(),
                key,
            })
        }
        TransformationKind::ImplementInterface { interface, members } => {
            match program.get(target) {
                Some(declaration) if declaration.kind.is_type() => {}
                Some(declaration) => {
                    return Err(InitializationFailure::new(
                        DiagnosticCode::InvalidTarget,
                        format!("'{target}' is a {}, not a type", declaration.kind),
                    ))
                }
                None => {
                    return Err(InitializationFailure::new(
                        DiagnosticCode::TargetNotFound,
                        format!("type '{target}' does not exist"),
                    ))
                }
            }
            for (name, key) in members {
                let declared_here = program
                    .get(key)
                    .is_some_and(|d| d.parent.as_ref() == Some(target));
                let introduced = dependencies
                    .values()
                    .any(|r| r.produced_key() == Some(key));
                if !declared_here && !introduced {
                    return Err(InitializationFailure::new(
                        DiagnosticCode::InterfaceMemberMissing,
                        format!(
                            "'{interface}.{name}' maps to '{key}', which '{target}' does not declare"
                        ),
                    ));
                }
            }
            Ok(InitializationResult::Interface {
                interface: interface.clone(),
                members: members.clone(),
            })
        }
        TransformationKind::Override { .. }
        | TransformationKind::Redirect { .. }
        | TransformationKind::InsertStatement { .. }
        | TransformationKind::AddAnnotation { .. }
        | TransformationKind::RemoveAnnotation { .. } => Ok(InitializationResult::Empty),
    }
}

/// Initialize every node of the dependency graph in topological order.
///
/// Failures are contribution-local: the transformation is dropped, its
/// result is recorded as [`InitializationResult::Failed`] and every
/// dependent fails in turn.
pub fn initialize_all(
    order: &[TransformationId],
    by_id: &IndexMap<TransformationId, &Transformation>,
    program: &SourceProgram,
    bag: &mut DiagnosticBag,
) -> InitializationResults {
    let mut context = InitializationContext::new(program);
    let mut results = InitializationResults::default();

    for &id in order {
        let transformation = by_id[&id];
        if bag.is_dropped(id) {
            results.results.insert(id, InitializationResult::Failed);
            continue;
        }

        let dependencies: IndexMap<TransformationId, InitializationResult> = transformation
            .dependencies()
            .iter()
            .filter_map(|d| results.get(*d).map(|r| (*d, r.clone())))
            .collect();

        if let Some((failed, _)) = dependencies.iter().find(|(_, r)| r.is_failed()) {
            bag.contribution_failed(
                transformation,
                DiagnosticCode::DependencyFailed,
                format!("dependency {failed} failed"),
            );
            results.results.insert(id, InitializationResult::Failed);
            continue;
        }

        let result = match initialize(transformation, &mut context, &dependencies) {
            Ok(result) => result,
            Err(failure) => {
                bag.contribution_failed(transformation, failure.code, failure.message);
                InitializationResult::Failed
            }
        };
        debug!(transformation = %id, ?result, "initialized");
        results.results.insert(id, result);
    }

    results
}
