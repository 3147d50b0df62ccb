//! Failure and diagnostics gateway.
//!
//! Every stage reports problems here instead of returning errors. A failed
//! contribution is recorded as dropped and the rest of the weave continues
//! as if it had never been submitted.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexSet;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::model::{DeclarationKey, Transformation, TransformationId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
            Severity::Info => f.write_str("info"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCode {
    ExpansionFailed,
    TargetNotFound,
    TargetUnavailable,
    AccessorMissing,
    NoImplementation,
    ReplaceConflict,
    RedirectConflict,
    RedirectTargetInvalid,
    SupersededByRedirect,
    DeclarationExists,
    DependencyFailed,
    InterfaceMemberMissing,
    InvalidTarget,
    AnchorMissing,
    AnnotationMissing,
    ProceedOutsideChain,
}

impl DiagnosticCode {
    pub fn code(self) -> &'static str {
        match self {
            DiagnosticCode::ExpansionFailed => "WV0001",
            DiagnosticCode::TargetNotFound => "WV0002",
            DiagnosticCode::TargetUnavailable => "WV0003",
            DiagnosticCode::AccessorMissing => "WV0004",
            DiagnosticCode::NoImplementation => "WV0005",
            DiagnosticCode::ReplaceConflict => "WV0006",
            DiagnosticCode::RedirectConflict => "WV0007",
            DiagnosticCode::RedirectTargetInvalid => "WV0008",
            DiagnosticCode::SupersededByRedirect => "WV0009",
            DiagnosticCode::DeclarationExists => "WV0010",
            DiagnosticCode::DependencyFailed => "WV0011",
            DiagnosticCode::InterfaceMemberMissing => "WV0012",
            DiagnosticCode::InvalidTarget => "WV0013",
            DiagnosticCode::AnchorMissing => "WV0014",
            DiagnosticCode::AnnotationMissing => "WV0015",
            DiagnosticCode::ProceedOutsideChain => "WV0016",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub severity: Severity,
    pub message: String,
    /// Display string of the originating transformation
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub transformation: Option<TransformationId>,
    #[serde(default)]
    pub declaration: Option<DeclarationKey>,
}

impl Diagnostic {
    pub fn new(code: DiagnosticCode, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            code,
            severity,
            message: message.into(),
            origin: None,
            transformation: None,
            declaration: None,
        }
    }

    /// Tag with the originating transformation
    pub fn from_transformation(mut self, transformation: &Transformation) -> Self {
        self.origin = Some(transformation.to_display_string());
        self.transformation = Some(transformation.id());
        self
    }

    pub fn on(mut self, declaration: &DeclarationKey) -> Self {
        self.declaration = Some(declaration.clone());
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]: {}", self.severity, self.code, self.message)?;
        if let Some(origin) = &self.origin {
            write!(f, " (from {origin})")?;
        }
        Ok(())
    }
}

/// Append-only diagnostics consumer
pub trait DiagnosticSink {
    fn report(&mut self, diagnostic: Diagnostic);
}

impl DiagnosticSink for Vec<Diagnostic> {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.push(diagnostic);
    }
}

/// Cloneable sink that can be handed across threads
#[derive(Debug, Clone, Default)]
pub struct SharedSink {
    diagnostics: Arc<Mutex<Vec<Diagnostic>>>,
}

impl SharedSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Vec<Diagnostic> {
        self.diagnostics.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.lock().is_empty()
    }
}

impl DiagnosticSink for SharedSink {
    fn report(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.lock().push(diagnostic);
    }
}

/// Collects diagnostics for one weave pass and tracks dropped contributions
#[derive(Default)]
pub struct DiagnosticBag {
    diagnostics: Vec<Diagnostic>,
    dropped: IndexSet<TransformationId>,
    warnings_as_errors: bool,
    sink: Option<Box<dyn DiagnosticSink>>,
}

impl fmt::Debug for DiagnosticBag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticBag")
            .field("diagnostics", &self.diagnostics)
            .field("dropped", &self.dropped)
            .field("warnings_as_errors", &self.warnings_as_errors)
            .field("forwarding", &self.sink.is_some())
            .finish()
    }
}

impl DiagnosticBag {
    pub fn new(warnings_as_errors: bool) -> Self {
        Self {
            diagnostics: Vec::new(),
            dropped: IndexSet::new(),
            warnings_as_errors,
            sink: None,
        }
    }

    /// Also forward every diagnostic to `sink` as it is reported
    pub fn with_sink(mut self, sink: Box<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Drop a contribution and record why
    pub fn contribution_failed(
        &mut self,
        transformation: &Transformation,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        let message = message.into();
        warn!(
            transformation = %transformation.id(),
            code = code.code(),
            "dropping contribution: {}",
            message
        );
        self.dropped.insert(transformation.id());
        self.push(
            Diagnostic::new(code, Severity::Error, message)
                .from_transformation(transformation)
                .on(transformation.target()),
        );
    }

    /// Report a warning; the contribution stays in the weave
    pub fn warning(
        &mut self,
        transformation: &Transformation,
        code: DiagnosticCode,
        message: impl Into<String>,
    ) {
        self.push(
            Diagnostic::new(code, Severity::Warning, message)
                .from_transformation(transformation)
                .on(transformation.target()),
        );
    }

    pub fn push(&mut self, mut diagnostic: Diagnostic) {
        if self.warnings_as_errors && diagnostic.severity == Severity::Warning {
            diagnostic.severity = Severity::Error;
        }
        if let Some(sink) = self.sink.as_mut() {
            sink.report(diagnostic.clone());
        }
        self.diagnostics.push(diagnostic);
    }

    /// Mark a contribution as dropped without reporting
    pub fn drop_silently(&mut self, id: TransformationId) {
        self.dropped.insert(id);
    }

    pub fn is_dropped(&self, id: TransformationId) -> bool {
        self.dropped.contains(&id)
    }

    pub fn dropped(&self) -> impl Iterator<Item = TransformationId> + '_ {
        self.dropped.iter().copied()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_error()).count()
    }

    pub fn into_diagnostics(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Advice, Annotation, OrderingContext};

    fn sample() -> Transformation {
        let mut ctx = OrderingContext::new();
        Transformation::add_annotation(
            &mut ctx,
            &Advice::new("Audit", "Audit"),
            "Order",
            Annotation::new("Audited"),
        )
    }

    #[test]
    fn test_contribution_failure_drops_and_tags_origin() {
        let t = sample();
        let mut bag = DiagnosticBag::new(false);
        bag.contribution_failed(&t, DiagnosticCode::TargetNotFound, "missing");

        assert!(bag.is_dropped(t.id()));
        let diagnostic = &bag.diagnostics()[0];
        assert_eq!(diagnostic.origin.as_deref(), Some(t.to_display_string().as_str()));
        assert_eq!(diagnostic.transformation, Some(t.id()));
        assert_eq!(bag.error_count(), 1);
    }

    #[test]
    fn test_warnings_as_errors_escalates() {
        let t = sample();
        let mut bag = DiagnosticBag::new(true);
        bag.warning(&t, DiagnosticCode::AnchorMissing, "anchor gone");
        assert!(!bag.is_dropped(t.id()));
        assert_eq!(bag.diagnostics()[0].severity, Severity::Error);
    }

    #[test]
    fn test_bag_forwards_escalated_diagnostics_to_sink() {
        let t = sample();
        let sink = SharedSink::new();
        let mut bag = DiagnosticBag::new(true).with_sink(Box::new(sink.clone()));
        bag.warning(&t, DiagnosticCode::AnnotationMissing, "nothing to remove");
        bag.contribution_failed(&t, DiagnosticCode::TargetNotFound, "missing");

        assert_eq!(sink.snapshot(), bag.diagnostics());
        assert_eq!(sink.snapshot()[0].severity, Severity::Error);
    }

    #[test]
    fn test_shared_sink_collects_across_clones() {
        let sink = SharedSink::new();
        let mut writer = sink.clone();
        writer.report(Diagnostic::new(
            DiagnosticCode::ExpansionFailed,
            Severity::Error,
            "boom",
        ));
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.snapshot()[0].to_string(), "error[WV0001]: boom");
    }
}
