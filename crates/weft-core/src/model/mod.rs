//! Transformation model
//!
//! Immutable data describing the base program, the advice that contributes
//! to it, and the transformations those advice emit. Nothing in this module
//! depends on the weaver, so producers can build and test transformations
//! on their own.

pub mod advice;
pub mod body;
pub mod declaration;
pub mod input;
pub mod transformation;

pub use advice::{Advice, AspectLayerId, OrderingContext, WeaveOrder};
pub use body::{BodyFragment, ChainElementId, Expression, Literal, Statement};
pub use declaration::{
    Accessor, Annotation, CompilationUnitId, Declaration, DeclarationKey, DeclarationKind,
    Parameter, Signature, SourceProgram,
};
pub use input::WeaveInput;
pub use transformation::{
    BoundTemplate, InsertPosition, InsertRelation, InsertedStatementKind, MemberSpec,
    Observability, Transformation, TransformationId, TransformationKind, TransformationTag,
    Viewer,
};
