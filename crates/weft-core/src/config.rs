//! Weave configuration.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::model::AspectLayerId;

/// Core weave configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeaveConfig {
    /// Layer name used when naming the source element of a chain
    pub source_layer: String,
    /// Warn about overrides from other layers discarded by a redirect
    pub report_superseded_overrides: bool,
    /// Warn when an annotation removal finds nothing to remove
    pub report_missing_annotations: bool,
    /// Report every warning as an error
    pub warnings_as_errors: bool,
}

impl Default for WeaveConfig {
    fn default() -> Self {
        Self {
            source_layer: "Source".to_string(),
            report_superseded_overrides: true,
            report_missing_annotations: true,
            warnings_as_errors: false,
        }
    }
}

impl WeaveConfig {
    pub fn source_layer(&self) -> AspectLayerId {
        AspectLayerId::new(self.source_layer.clone())
    }

    /// Load a configuration from a JSON file; missing fields take defaults
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("invalid weave config {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: WeaveConfig = serde_json::from_str(r#"{"warnings_as_errors": true}"#).unwrap();
        assert!(config.warnings_as_errors);
        assert_eq!(config.source_layer, "Source");
        assert!(config.report_superseded_overrides);
    }
}
