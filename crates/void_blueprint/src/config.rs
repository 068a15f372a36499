//! Expansion configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! [expansion]
//! max_iterations = 10
//! ignore_errors = false
//! namespace_class = "namespace"
//! param_separator = ":"
//! ```
//!
//! Missing keys take their defaults.

use crate::error::ConfigError;
use serde::Deserialize;
use std::path::Path;

/// Default pass cap
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Settings for one expansion
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ExpandConfig {
    /// Passes allowed before convergence failure
    pub max_iterations: usize,
    /// Return the partial graph instead of failing on accumulated errors
    pub ignore_errors: bool,
    /// Class of synthesized intermediate namespace nodes
    pub namespace_class: String,
    /// Separator of flattened parameter names
    pub param_separator: String,
}

impl Default for ExpandConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            ignore_errors: false,
            namespace_class: "namespace".to_string(),
            param_separator: crate::params::DEFAULT_SEPARATOR.to_string(),
        }
    }
}

impl ExpandConfig {
    /// Set the pass cap
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Switch to best-effort mode
    pub fn ignoring_errors(mut self) -> Self {
        self.ignore_errors = true;
        self
    }

    /// Parse from a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let raw: ConfigToml = toml::from_str(content)?;
        Ok(raw.expansion)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Root TOML structure
#[derive(Debug, Deserialize)]
struct ConfigToml {
    #[serde(default)]
    expansion: ExpandConfig,
}
