//! Template expansion service contract.
//!
//! The weaver calls [`TemplateExpander::try_expand`] once per override,
//! introduced accessor and statement insertion. Expansion must not touch the
//! weave's ordering state; failures are forwarded verbatim as diagnostics.

use thiserror::Error;

use crate::model::{
    Accessor, BodyFragment, BoundTemplate, DeclarationKey, Expression, Transformation,
};

/// What a template is being expanded for
#[derive(Debug, Clone, Copy)]
pub struct ExpansionContext<'a> {
    pub transformation: &'a Transformation,
    /// Target after replace resolution
    pub target: &'a DeclarationKey,
    pub accessor: Accessor,
}

#[derive(Error, Debug, Clone, PartialEq)]
#[error("template '{template}' failed to expand: {message}")]
pub struct ExpansionFailure {
    pub template: String,
    pub message: String,
}

impl ExpansionFailure {
    pub fn new(template: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            message: message.into(),
        }
    }
}

pub trait TemplateExpander {
    fn try_expand(
        &self,
        template: &BoundTemplate,
        context: &ExpansionContext<'_>,
    ) -> Result<BodyFragment, ExpansionFailure>;
}

impl<F> TemplateExpander for F
where
    F: Fn(&BoundTemplate, &ExpansionContext<'_>) -> Result<BodyFragment, ExpansionFailure>,
{
    fn try_expand(
        &self,
        template: &BoundTemplate,
        context: &ExpansionContext<'_>,
    ) -> Result<BodyFragment, ExpansionFailure> {
        self(template, context)
    }
}

/// Reference expander: substitutes bound arguments for `Parameter` markers.
///
/// Fails on templates marked as failing and on parameters without a bound
/// argument.
#[derive(Debug, Clone, Copy, Default)]
pub struct FragmentExpander;

impl TemplateExpander for FragmentExpander {
    fn try_expand(
        &self,
        template: &BoundTemplate,
        _context: &ExpansionContext<'_>,
    ) -> Result<BodyFragment, ExpansionFailure> {
        if let Some(reason) = &template.fail {
            return Err(ExpansionFailure::new(&template.name, reason.clone()));
        }
        template.body.clone().try_rewrite(&mut |expression| match expression {
            Expression::Parameter(name) => template
                .arguments
                .get(&name)
                .cloned()
                .ok_or_else(|| {
                    let message = format!("parameter '{name}' is not bound");
                    ExpansionFailure::new(&template.name, message)
                }),
            other => Ok(other),
        })
    }
}
