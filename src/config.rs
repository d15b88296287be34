//! Bridge configuration types and defaults.
//!
//! Configuration is captured once at facade construction. The boundary
//! trace switch can also be flipped through the environment, which is how
//! it is normally enabled in the field.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default maximum selector string length accepted by the facade
pub const DEFAULT_MAX_SELECTOR_LEN: usize = 4096;

/// Environment variable enabling boundary instrumentation
pub const TRACE_ENV_VAR: &str = "DOM_QUERY_BRIDGE_TRACE";

/// Environment variable pointing at an alternative selector engine script
pub const ENGINE_SCRIPT_ENV_VAR: &str = "DOM_QUERY_BRIDGE_ENGINE";

/// Configuration for a query facade
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeConfig {
    /// Log every property access, call, and mutation crossing the engine
    /// boundary (default: false). When off, wrapping installs no
    /// instrumentation at all.
    #[serde(default)]
    pub trace_boundary: bool,

    /// Path to an alternative selector engine script artifact (optional,
    /// uses the bundled artifact if not provided)
    #[serde(default)]
    pub engine_script_path: Option<PathBuf>,

    /// Maximum selector string length accepted by the facade
    #[serde(default = "default_max_selector_len")]
    pub max_selector_len: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            trace_boundary: false,
            engine_script_path: None,
            max_selector_len: DEFAULT_MAX_SELECTOR_LEN,
        }
    }
}

impl BridgeConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a configuration from the process environment
    pub fn from_env() -> Self {
        let trace = std::env::var(TRACE_ENV_VAR)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let engine_script_path = std::env::var_os(ENGINE_SCRIPT_ENV_VAR).map(PathBuf::from);

        Self {
            trace_boundary: trace,
            engine_script_path,
            max_selector_len: DEFAULT_MAX_SELECTOR_LEN,
        }
    }

    /// Enable or disable boundary instrumentation
    pub fn with_trace_boundary(mut self, trace: bool) -> Self {
        self.trace_boundary = trace;
        self
    }

    /// Set an alternative selector engine script path
    pub fn with_engine_script_path(mut self, path: PathBuf) -> Self {
        self.engine_script_path = Some(path);
        self
    }

    /// Set the maximum accepted selector length
    pub fn with_max_selector_len(mut self, len: usize) -> Self {
        self.max_selector_len = len;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_selector_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_selector_len".into(),
                reason: "must be greater than 0".into(),
            });
        }

        if let Some(path) = &self.engine_script_path {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "engine_script_path".into(),
                    reason: "must not be empty".into(),
                });
            }
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidValue {
        /// The field name
        field: String,
        /// The reason it's invalid
        reason: String,
    },

    /// IO error (e.g. an unreadable engine script override)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// Default value functions for serde
fn default_max_selector_len() -> usize {
    DEFAULT_MAX_SELECTOR_LEN
}
