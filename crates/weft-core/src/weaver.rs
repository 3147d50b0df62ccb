//! Weave driver.
//!
//! Runs the stages in order: weave ordering and dependency resolution,
//! Replace claims, hierarchical initialization, introduction expansion,
//! chain construction, statement insertion and materialization. Only the
//! ordering stage can fail the whole pass; everything after it reports
//! through the diagnostic bag.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::chain::{
    claim_replacements, expand_introductions, ChainBuilder, KeyResolver, TargetCatalog,
};
use crate::config::WeaveConfig;
use crate::diagnostics::{Diagnostic, DiagnosticBag, DiagnosticSink, Severity, SharedSink};
use crate::error::Result;
use crate::expansion::{FragmentExpander, TemplateExpander};
use crate::insertion::merge_insertions;
use crate::materialize::{Materializer, WeaveOutput};
use crate::model::{SourceProgram, Transformation, TransformationTag, WeaveInput};
use crate::naming::{DefaultNamingProvider, NamingProvider};
use crate::ordering::WeavePlan;

/// Per-kind statistics for one weave
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KindStats {
    pub tag: TransformationTag,
    pub submitted: u64,
    pub woven: u64,
    pub dropped: u64,
}

impl KindStats {
    pub fn new(tag: TransformationTag) -> Self {
        Self {
            tag,
            submitted: 0,
            woven: 0,
            dropped: 0,
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.submitted == 0 {
            0.0
        } else {
            (self.woven as f64) / (self.submitted as f64)
        }
    }
}

/// Summary of one or more weaves
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WeaveSummary {
    pub by_kind: IndexMap<TransformationTag, KindStats>,
    pub woven: u64,
    pub dropped: u64,
    pub chain_elements: u64,
    pub helpers: u64,
    pub insertions: u64,
    pub errors: u64,
    pub warnings: u64,
}

impl WeaveSummary {
    pub fn new() -> Self {
        Self::default()
    }

    fn record(&mut self, tag: TransformationTag, dropped: bool) {
        let stats = self.by_kind.entry(tag).or_insert_with(|| KindStats::new(tag));
        stats.submitted += 1;
        if dropped {
            stats.dropped += 1;
            self.dropped += 1;
        } else {
            stats.woven += 1;
            self.woven += 1;
        }
    }

    pub fn merge(&mut self, other: WeaveSummary) {
        for (tag, stats) in other.by_kind {
            let mine = self.by_kind.entry(tag).or_insert_with(|| KindStats::new(tag));
            mine.submitted += stats.submitted;
            mine.woven += stats.woven;
            mine.dropped += stats.dropped;
        }
        self.woven += other.woven;
        self.dropped += other.dropped;
        self.chain_elements += other.chain_elements;
        self.helpers += other.helpers;
        self.insertions += other.insertions;
        self.errors += other.errors;
        self.warnings += other.warnings;
    }

    pub fn success(&self) -> bool {
        self.errors == 0
    }
}

/// Outcome of a weave that got past ordering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeaveResult {
    pub output: WeaveOutput,
    pub diagnostics: Vec<Diagnostic>,
    pub summary: WeaveSummary,
}

impl WeaveResult {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.is_error())
    }

    /// Forward every diagnostic, in order, to an external sink
    pub fn report_to(&self, sink: &mut dyn DiagnosticSink) {
        for diagnostic in &self.diagnostics {
            sink.report(diagnostic.clone());
        }
    }
}

/// Weaves ordered transformations into a base program
pub struct Weaver<E: TemplateExpander = FragmentExpander> {
    config: WeaveConfig,
    expander: E,
    sink: Option<SharedSink>,
}

impl Weaver<FragmentExpander> {
    pub fn new(config: WeaveConfig) -> Self {
        Self {
            config,
            expander: FragmentExpander,
            sink: None,
        }
    }
}

impl Default for Weaver<FragmentExpander> {
    fn default() -> Self {
        Self::new(WeaveConfig::default())
    }
}

impl<E: TemplateExpander> Weaver<E> {
    /// Use another template expansion service
    pub fn with_expander<F: TemplateExpander>(self, expander: F) -> Weaver<F> {
        Weaver {
            config: self.config,
            expander,
            sink: self.sink,
        }
    }

    /// Forward diagnostics to `sink` while weaving, as each one is reported
    pub fn with_sink(mut self, sink: SharedSink) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn config(&self) -> &WeaveConfig {
        &self.config
    }

    /// Order the transformations without weaving them
    pub fn plan<'t>(&self, transformations: &'t [Transformation]) -> Result<WeavePlan<'t>> {
        WeavePlan::build(transformations)
    }

    pub fn weave(
        &self,
        program: &SourceProgram,
        transformations: &[Transformation],
    ) -> Result<WeaveResult> {
        let mut naming = DefaultNamingProvider::for_program(program);
        self.weave_with(program, transformations, &mut naming)
    }

    pub fn weave_input(&self, input: &WeaveInput) -> Result<WeaveResult> {
        self.weave(&input.program, &input.transformations)
    }

    /// Weave using a caller-supplied naming provider
    pub fn weave_with(
        &self,
        program: &SourceProgram,
        transformations: &[Transformation],
        naming: &mut dyn NamingProvider,
    ) -> Result<WeaveResult> {
        info!(
            declarations = program.len(),
            transformations = transformations.len(),
            "starting weave"
        );
        let plan = WeavePlan::build(transformations).map_err(|e| {
            warn!("weave aborted: {}", e);
            e
        })?;
        let ordered = plan.ordered();

        let mut bag = DiagnosticBag::new(self.config.warnings_as_errors);
        if let Some(sink) = &self.sink {
            bag = bag.with_sink(Box::new(sink.clone()));
        }
        claim_replacements(ordered, &mut bag);
        let results = plan.initialize(program, &mut bag);
        debug!(initialized = results.len(), "hierarchical transformations initialized");

        let mut expanded = expand_introductions(ordered, &results, &self.expander, &mut bag);
        let failed = plan.fail_dependents(&results, &mut bag);
        if failed > 0 {
            expanded.retain(|id, _| !bag.is_dropped(*id));
            debug!(failed, "dependents of failed introductions dropped");
        }
        let resolver = KeyResolver::from_results(&results, &bag);
        let catalog = TargetCatalog::build(program, ordered, &results, &resolver, expanded);
        debug!(targets = catalog.len(), replaced = resolver.len(), "target catalog built");

        let mut chains = ChainBuilder::new(&catalog, &resolver, &self.expander, &self.config)
            .build(ordered, naming, &mut bag);
        let insertions = merge_insertions(
            ordered,
            &catalog,
            &resolver,
            &mut chains,
            &self.expander,
            &mut bag,
        );
        let output = Materializer::new(&catalog, &resolver, &chains, &insertions, &self.config)
            .materialize(ordered, naming, &mut bag);

        let mut summary = WeaveSummary::new();
        for t in ordered {
            summary.record(t.tag(), bag.is_dropped(t.id()));
        }
        summary.chain_elements = chains.element_count() as u64;
        summary.helpers = output.declarations.iter().filter(|d| d.is_helper()).count() as u64;
        summary.insertions = insertions.count() as u64;

        let diagnostics = bag.into_diagnostics();
        summary.errors = diagnostics.iter().filter(|d| d.is_error()).count() as u64;
        summary.warnings = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count() as u64;

        info!(
            woven = summary.woven,
            dropped = summary.dropped,
            declarations = output.len(),
            errors = summary.errors,
            warnings = summary.warnings,
            "weave complete"
        );
        Ok(WeaveResult {
            output,
            diagnostics,
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Advice, Annotation, OrderingContext};

    #[test]
    fn test_summary_merge_accumulates_by_kind() {
        let mut first = WeaveSummary::new();
        first.record(TransformationTag::Override, false);
        first.record(TransformationTag::Override, true);
        let mut second = WeaveSummary::new();
        second.record(TransformationTag::Override, false);
        second.record(TransformationTag::Introduce, false);
        second.errors = 1;

        first.merge(second);
        let overrides = &first.by_kind[&TransformationTag::Override];
        assert_eq!(overrides.submitted, 3);
        assert_eq!(overrides.dropped, 1);
        assert!((overrides.success_rate() - 2.0 / 3.0).abs() < f64::EPSILON);
        assert_eq!(first.woven, 3);
        assert!(!first.success());
    }

    #[test]
    fn test_report_to_forwards_in_order() -> anyhow::Result<()> {
        let mut ctx = OrderingContext::new();
        let advice = Advice::new("Audit", "Audit");
        let transformations = vec![
            Transformation::add_annotation(&mut ctx, &advice, "Missing", Annotation::new("A")),
            Transformation::add_annotation(&mut ctx, &advice, "AlsoMissing", Annotation::new("B")),
        ];
        let result = Weaver::default().weave(&SourceProgram::new(), &transformations)?;

        let mut sink: Vec<Diagnostic> = Vec::new();
        result.report_to(&mut sink);
        assert_eq!(sink, result.diagnostics);
        assert_eq!(sink.len(), 2);
        assert_eq!(result.summary.dropped, 2);
        assert!(result.has_errors());
        Ok(())
    }
}
