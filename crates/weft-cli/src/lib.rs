//! Weft CLI - command-line driver for the weaving engine
//!
//! Loads a serialized weave input, runs the weave and renders the result
//! either as a source listing or as JSON.

use std::fmt::Write as _;
use std::path::Path;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tracing::debug;
use weft_core::{print, WeaveConfig, WeaveInput, WeaveResult, Weaver};

/// How `weft weave` prints its output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Source,
    Json,
}

impl FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "source" => Ok(OutputFormat::Source),
            "json" => Ok(OutputFormat::Json),
            other => Err(anyhow!("unknown output format '{other}' (expected source or json)")),
        }
    }
}

/// Load the configuration file if one is given, defaults otherwise
pub fn load_config(path: Option<&Path>) -> Result<WeaveConfig> {
    match path {
        Some(path) => WeaveConfig::load(path),
        None => Ok(WeaveConfig::default()),
    }
}

/// Weave the input file
pub fn run_weave(input: &Path, config: Option<&Path>) -> Result<WeaveResult> {
    let config = load_config(config)?;
    let input = WeaveInput::load(input)?;
    debug!(
        declarations = input.program.len(),
        transformations = input.transformations.len(),
        "weave input loaded"
    );
    Weaver::new(config)
        .weave_input(&input)
        .context("weave aborted")
}

pub fn render(result: &WeaveResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Source => Ok(print::render(&result.output)),
        OutputFormat::Json => Ok(serde_json::to_string_pretty(result)?),
    }
}

/// One line per diagnostic, in report order
pub fn format_diagnostics(result: &WeaveResult) -> Result<String> {
    let mut out = String::new();
    for diagnostic in &result.diagnostics {
        writeln!(out, "{diagnostic}")?;
    }
    Ok(out)
}

/// Global weave order and initialization order of the input file
pub fn run_order(input: &Path) -> Result<String> {
    let input = WeaveInput::load(input)?;
    let plan = Weaver::default()
        .plan(&input.transformations)
        .context("cannot order transformations")?;

    let mut out = String::new();
    writeln!(out, "weave order:")?;
    for t in plan.ordered() {
        writeln!(out, "  {:<10} {:<6} {}", t.order().to_string(), t.id().to_string(), t)?;
    }
    writeln!(out, "initialization order:")?;
    let hierarchical = plan
        .initialization_order()
        .iter()
        .filter_map(|id| plan.get(*id))
        .filter(|t| t.is_hierarchical());
    for t in hierarchical {
        writeln!(out, "  {:<6} {}", t.id().to_string(), t)?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("source".parse::<OutputFormat>().unwrap(), OutputFormat::Source);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}
