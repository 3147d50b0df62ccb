use thiserror::Error;

use crate::model::{DeclarationKey, TransformationId, WeaveOrder};

/// Fatal weave errors.
///
/// Any of these aborts the whole pass: ordering itself is compromised, so
/// no partial output is produced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeaveError {
    #[error("circular transformation dependency between: {}", .members.join(", "))]
    CircularDependency { members: Vec<String> },

    #[error("transformations {first} and {second} share weave order {order}")]
    AmbiguousOrder {
        first: TransformationId,
        second: TransformationId,
        order: WeaveOrder,
    },

    #[error("transformation id {id} is used more than once")]
    DuplicateTransformation { id: TransformationId },

    #[error("{transformation} depends on unknown transformation {dependency}")]
    UnknownDependency {
        transformation: String,
        dependency: TransformationId,
    },
}

impl WeaveError {
    pub fn circular(members: Vec<String>) -> Self {
        Self::CircularDependency { members }
    }
}

/// Errors building a [`SourceProgram`](crate::model::SourceProgram)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProgramError {
    #[error("declaration '{key}' is declared more than once")]
    DuplicateDeclaration { key: DeclarationKey },

    #[error("declaration '{key}' names unknown parent '{parent}'")]
    UnknownParent {
        key: DeclarationKey,
        parent: DeclarationKey,
    },

    #[error("declaration '{key}' names parent '{parent}', which is not a type")]
    ParentNotType {
        key: DeclarationKey,
        parent: DeclarationKey,
    },
}

/// Result type for weave operations
pub type Result<T> = std::result::Result<T, WeaveError>;
