//! Selector engine script artifact handling.
//!
//! The selector engine is an external collaborator: a precompiled,
//! versioned script bundled into the crate (or overridden through
//! configuration) that exposes the `Selector` calling contract. The
//! bundled artifact is validated exactly once per process; evaluation
//! binds it to one facade's context at construction time, which is the
//! only expensive step.

use std::borrow::Cow;

use boa_engine::{Context, Source};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::config::BridgeConfig;
use crate::error::{BridgeError, Result};

/// Name of the global callable the artifact must export
pub(crate) const SELECTOR_ENGINE_EXPORT: &str = "Selector";

/// Engine prelude evaluated before anything is wrapped. Installs the
/// helper used to materialize host objects as proxies.
pub(crate) const ENGINE_PRELUDE: &str = r#"
function __hostProxy(target, handler) {
    "use strict";
    return new Proxy(target, handler);
}
"#;

/// Process-wide, one-time validation of the bundled artifact. Immutable
/// after first use; shared by every facade.
static BUNDLED_ARTIFACT: Lazy<std::result::Result<ScriptArtifact, String>> =
    Lazy::new(|| ScriptArtifact::validate(Cow::Borrowed(crate::SELECTOR_ENGINE_JS)));

/// A validated selector engine script
#[derive(Clone, Debug)]
pub(crate) struct ScriptArtifact {
    source: Cow<'static, str>,
}

impl ScriptArtifact {
    fn validate(source: Cow<'static, str>) -> std::result::Result<ScriptArtifact, String> {
        if source.trim().is_empty() {
            return Err("selector engine script is empty".to_string());
        }
        if !source.contains(SELECTOR_ENGINE_EXPORT) {
            return Err(format!(
                "selector engine script never mentions its required export '{SELECTOR_ENGINE_EXPORT}'"
            ));
        }
        Ok(ScriptArtifact { source })
    }

    /// Load the artifact for a facade: the configured override file, or
    /// the process-wide bundled artifact.
    pub(crate) fn load(config: &BridgeConfig) -> Result<ScriptArtifact> {
        if let Some(path) = &config.engine_script_path {
            let source = std::fs::read_to_string(path)
                .map_err(crate::config::ConfigError::Io)
                .map_err(BridgeError::Config)?;
            debug!(path = %path.display(), "loaded selector engine override");
            return Self::validate(Cow::Owned(source)).map_err(BridgeError::construction);
        }

        BUNDLED_ARTIFACT
            .as_ref()
            .map(Clone::clone)
            .map_err(|message| BridgeError::construction(message.clone()))
    }

    /// The script source
    pub(crate) fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate the artifact in a facade's context. Any failure here is a
    /// fatal construction failure.
    pub(crate) fn evaluate(&self, ctx: &mut Context) -> Result<()> {
        ctx.eval(Source::from_bytes(self.source().as_bytes()))
            .map_err(|e| {
                BridgeError::construction(format!("selector engine script failed to evaluate: {e}"))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bundled_artifact_validates() {
        let artifact = ScriptArtifact::load(&BridgeConfig::default()).unwrap();
        assert!(artifact.source().contains(SELECTOR_ENGINE_EXPORT));
    }

    #[test]
    fn test_empty_source_rejected() {
        assert!(ScriptArtifact::validate(Cow::Borrowed("  \n")).is_err());
    }

    #[test]
    fn test_source_without_export_rejected() {
        assert!(ScriptArtifact::validate(Cow::Borrowed("var x = 1;")).is_err());
    }

    #[test]
    fn test_missing_override_is_fatal() {
        let config =
            BridgeConfig::default().with_engine_script_path("/nonexistent/engine.js".into());
        let err = ScriptArtifact::load(&config).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    #[test]
    fn test_prelude_evaluates() {
        let mut ctx = Context::default();
        assert!(ctx
            .eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .is_ok());
    }

    #[test]
    fn test_bundled_artifact_evaluates() {
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .unwrap();
        let artifact = ScriptArtifact::load(&BridgeConfig::default()).unwrap();
        assert!(artifact.evaluate(&mut ctx).is_ok());
    }
}
