//! Error types for the selector bridge.
//!
//! The taxonomy follows the failure classes a query can hit: fatal
//! construction failures, selector-engine failures surfaced from the
//! embedded context, type-adaptation failures when an engine result cannot
//! be converted back to a host shape, and session misuse.

use boa_engine::JsError;

use crate::config::ConfigError;
use crate::dom::DomError;

/// Main error type for the bridge
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// The facade could not be constructed (missing/uncompilable script
    /// artifact, or the expected engine export is absent). Fatal: no
    /// partial facade is ever returned.
    #[error("construction failed: {0}")]
    Construction(String),

    /// The selector engine signalled a failure (malformed selector or an
    /// internal fault during matching). Carries the engine's diagnostic
    /// message verbatim; never retried.
    #[error("selector engine failure: {0}")]
    Engine(String),

    /// An engine result could not be adapted to the expected host shape
    /// (e.g. a non-element in an element collection). Never silently
    /// coerced.
    #[error("type adaptation failed: {0}")]
    TypeAdaptation(String),

    /// A second top-level session was requested while one is active on
    /// the same facade. Public operations are not reentrant.
    #[error("an engine session is already active on this facade")]
    ReentrantSession,

    /// Document tree error
    #[error("document error: {0}")]
    Dom(#[from] DomError),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl BridgeError {
    /// Create a construction failure
    pub fn construction(message: impl Into<String>) -> Self {
        BridgeError::Construction(message.into())
    }

    /// Create an engine execution failure
    pub fn engine(message: impl Into<String>) -> Self {
        BridgeError::Engine(message.into())
    }

    /// Create a type-adaptation failure
    pub fn adaptation(message: impl Into<String>) -> Self {
        BridgeError::TypeAdaptation(message.into())
    }
}

impl From<JsError> for BridgeError {
    fn from(e: JsError) -> Self {
        BridgeError::Engine(e.to_string())
    }
}

/// Result type alias for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = BridgeError::construction("script artifact missing");
        assert_eq!(
            err.to_string(),
            "construction failed: script artifact missing"
        );

        let err = BridgeError::engine("unknown pseudo-selector :flaky");
        assert!(err.to_string().contains(":flaky"));
    }

    #[test]
    fn test_adaptation_helper() {
        let err = BridgeError::adaptation("non-element in element collection");
        assert!(matches!(err, BridgeError::TypeAdaptation(_)));
    }

    #[test]
    fn test_reentrant_session_message() {
        let err = BridgeError::ReentrantSession;
        assert!(err.to_string().contains("already active"));
    }
}
