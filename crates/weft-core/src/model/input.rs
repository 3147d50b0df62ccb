//! Serialized weave input: a base program plus the transformations to weave.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::declaration::SourceProgram;
use super::transformation::Transformation;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WeaveInput {
    pub program: SourceProgram,
    #[serde(default)]
    pub transformations: Vec<Transformation>,
}

impl WeaveInput {
    pub fn new(program: SourceProgram, transformations: Vec<Transformation>) -> Self {
        Self {
            program,
            transformations,
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid weave input")
    }

    /// Load a weave input from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read weave input {}", path.display()))?;
        Self::from_json(&content).with_context(|| format!("in {}", path.display()))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
