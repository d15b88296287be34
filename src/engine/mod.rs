//! Embedded engine management.
//!
//! `EngineHost` owns one embedded JavaScript context per facade: it
//! evaluates the prelude and the selector engine artifact, binds the
//! wrapped document into the top-level scope (as `document`, with `window`
//! aliasing the global object), resolves the engine's exported handle, and
//! hands out scoped sessions for every boundary-crossing operation.

pub(crate) mod compiler;
pub(crate) mod session;

use std::cell::RefCell;
use std::rc::Rc;

use boa_engine::{js_string, Context, JsObject, JsString, JsValue, Source};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::dom::Document;
use crate::error::{BridgeError, Result};
use crate::metrics::BoundaryMetrics;
use crate::wrap::{HostValue, WrapFactory, WrapHook};
use compiler::{ScriptArtifact, ENGINE_PRELUDE, SELECTOR_ENGINE_EXPORT};

pub(crate) use session::ScopedSession;

/// One facade's engine: context, factory stack, and the resolved selector
/// engine handle.
pub(crate) struct EngineHost {
    context: RefCell<Context>,
    hook: WrapHook,
    handle: JsObject,
    metrics: Rc<BoundaryMetrics>,
    trace_boundary: bool,
}

impl EngineHost {
    /// Build the engine for one facade. Every failure here is fatal: no
    /// partially constructed host is returned.
    pub(crate) fn new(
        document: &Document,
        config: &BridgeConfig,
        metrics: Rc<BoundaryMetrics>,
    ) -> Result<Self> {
        let artifact = ScriptArtifact::load(config)?;

        let mut context = Context::default();
        context
            .eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .map_err(|e| {
                BridgeError::construction(format!("engine prelude failed to evaluate: {e}"))
            })?;

        let hook = WrapHook::new();
        let factory = WrapFactory::new(config.trace_boundary, Rc::clone(&metrics));

        // Construction-time session: the factory must be installed while
        // the document is wrapped and the artifact runs, and restored on
        // every path out.
        hook.push(Rc::clone(&factory));
        let setup = Self::bind_scope(document, &artifact, &factory, &hook, &mut context);
        hook.pop();
        let handle = setup?;

        info!(
            export = SELECTOR_ENGINE_EXPORT,
            trace_boundary = config.trace_boundary,
            "selector engine ready"
        );

        Ok(Self {
            context: RefCell::new(context),
            hook,
            handle,
            metrics,
            trace_boundary: config.trace_boundary,
        })
    }

    fn bind_scope(
        document: &Document,
        artifact: &ScriptArtifact,
        factory: &Rc<WrapFactory>,
        hook: &WrapHook,
        context: &mut Context,
    ) -> Result<JsObject> {
        let wrapped_document = factory
            .wrap(hook, HostValue::Node(document.root().clone()), context)
            .map_err(|e| {
                BridgeError::construction(format!("failed to wrap the document: {e}"))
            })?;

        let global = context.global_object();
        global
            .set(js_string!("document"), wrapped_document, false, context)
            .map_err(|e| BridgeError::construction(e.to_string()))?;
        let global_alias = JsValue::from(global.clone());
        global
            .set(js_string!("window"), global_alias, false, context)
            .map_err(|e| BridgeError::construction(e.to_string()))?;

        artifact.evaluate(context)?;
        debug!("selector engine artifact evaluated");

        let handle = context
            .global_object()
            .get(JsString::from(SELECTOR_ENGINE_EXPORT), context)
            .map_err(|e| BridgeError::construction(e.to_string()))?;
        handle
            .as_object()
            .filter(|o| o.is_callable())
            .cloned()
            .ok_or_else(|| {
                BridgeError::construction(format!(
                    "selector engine export '{SELECTOR_ENGINE_EXPORT}' is missing or not callable"
                ))
            })
    }

    /// Open a fresh scoped session, capturing the instrumentation flag
    pub(crate) fn session(&self) -> Result<ScopedSession<'_>> {
        ScopedSession::enter(
            &self.context,
            &self.hook,
            WrapFactory::new(self.trace_boundary, Rc::clone(&self.metrics)),
        )
    }

    /// The selector engine's exported callable
    pub(crate) fn handle(&self) -> &JsObject {
        &self.handle
    }

    /// The engine's wrap-factory stack
    pub(crate) fn hook(&self) -> &WrapHook {
        &self.hook
    }
}
