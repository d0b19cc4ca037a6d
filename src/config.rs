//! Builder configuration
//!
//! Loaded from a JSON file. Every field has a default, so `{}` is a
//! valid configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::path::{ResolveOptions, MAX_PATH_DEPTH};

/// Upper bound accepted for `max_path_depth`
pub const DEPTH_CEILING: usize = 32;

/// Configuration failures
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {reason}")]
    Unreadable { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Malformed(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            ConfigError::Unreadable { .. } => "SHAPE_CONFIG_UNREADABLE",
            ConfigError::Malformed(_) | ConfigError::Invalid(_) => "SHAPE_CONFIG_INVALID",
        }
    }
}

/// Builder configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DslConfig {
    /// Maximum number of descents during path resolution (default: 9)
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,

    /// Let `$unwind` pass unknown paths through instead of failing (default: false)
    #[serde(default)]
    pub lenient_unwind: bool,

    /// Let `$unset`/`$rename` target required fields (default: false)
    #[serde(default)]
    pub allow_unset_required: bool,
}

fn default_max_path_depth() -> usize {
    MAX_PATH_DEPTH
}

impl Default for DslConfig {
    fn default() -> Self {
        Self {
            max_path_depth: default_max_path_depth(),
            lenient_unwind: false,
            allow_unset_required: false,
        }
    }
}

impl DslConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::parse(&content)
    }

    /// Parse and validate configuration JSON
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: DslConfig =
            serde_json::from_str(content).map_err(|e| ConfigError::Malformed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_path_depth == 0 || self.max_path_depth > DEPTH_CEILING {
            return Err(ConfigError::Invalid(format!(
                "max_path_depth must be between 1 and {}, got {}",
                DEPTH_CEILING, self.max_path_depth
            )));
        }
        Ok(())
    }

    pub fn with_lenient_unwind(mut self, lenient: bool) -> Self {
        self.lenient_unwind = lenient;
        self
    }

    pub fn with_allow_unset_required(mut self, allow: bool) -> Self {
        self.allow_unset_required = allow;
        self
    }

    pub fn with_max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth;
        self
    }

    /// Resolution options carrying this config's depth budget
    pub fn resolve_options(&self) -> ResolveOptions {
        ResolveOptions::new().with_max_depth(self.max_path_depth)
    }
}
