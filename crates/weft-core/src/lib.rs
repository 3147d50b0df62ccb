//! # Weft Core
//!
//! Deterministic weaving engine. Given a base program and an ordered set of
//! transformations contributed by advice, it produces the final declaration
//! set:
//! - global weave order and dependency resolution
//! - hierarchical initialization of introduced and replaced members
//! - proceed chains linking overrides to the implementation they wrap
//! - statement insertion at member entry
//! - materialization with per-contribution failure isolation
//!
//! Weaving never produces concrete tokens. Bodies are abstract fragments and
//! chain element names are resolved only by the [`print`] boundary.

#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod expansion;
pub mod insertion;
pub mod materialize;
pub mod model;
pub mod naming;
pub mod ordering;
pub mod print;
pub mod weaver;

// Re-export commonly used types
pub use config::WeaveConfig;
pub use diagnostics::{
    Diagnostic, DiagnosticBag, DiagnosticCode, DiagnosticSink, Severity, SharedSink,
};
pub use error::{ProgramError, Result, WeaveError};
pub use expansion::{ExpansionContext, ExpansionFailure, FragmentExpander, TemplateExpander};
pub use materialize::{Disposition, OutputDeclaration, WeaveOutput};
pub use model::{
    Accessor, Advice, AspectLayerId, BodyFragment, BoundTemplate, Declaration, DeclarationKey,
    DeclarationKind, Expression, InsertPosition, Observability, OrderingContext, Signature,
    SourceProgram, Statement, Transformation, TransformationId, TransformationKind, Viewer,
    WeaveInput, WeaveOrder,
};
pub use naming::{DefaultNamingProvider, NamingProvider};
pub use ordering::WeavePlan;
pub use weaver::{KindStats, WeaveResult, WeaveSummary, Weaver};

/// Weft version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize tracing for weaver components. Logs go to stderr.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("weft_core=info")),
        )
        .init();
}
