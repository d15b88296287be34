//! Scoped engine sessions.
//!
//! Every boundary-crossing operation runs inside exactly one session.
//! Entering acquires the engine context and installs the session's wrap
//! factory on the factory stack; dropping the session restores both, on
//! every exit path. Sessions are not reentrant: a second `enter` while
//! one is live on the same facade fails instead of nesting.

use std::cell::{RefCell, RefMut};
use std::rc::Rc;

use boa_engine::{Context, JsValue};
use tracing::trace;

use crate::error::{BridgeError, Result};
use crate::wrap::{HostValue, WrapFactory, WrapHook};

/// One active engine session. Owns the context borrow and the installed
/// wrap factory for its duration.
pub(crate) struct ScopedSession<'a> {
    context: RefMut<'a, Context>,
    hook: WrapHook,
    factory: Rc<WrapFactory>,
}

impl<'a> ScopedSession<'a> {
    /// Acquire the engine context and install `factory`. Fails with
    /// [`BridgeError::ReentrantSession`] if a session is already active.
    pub(crate) fn enter(
        context: &'a RefCell<Context>,
        hook: &WrapHook,
        factory: Rc<WrapFactory>,
    ) -> Result<Self> {
        let context = context
            .try_borrow_mut()
            .map_err(|_| BridgeError::ReentrantSession)?;
        hook.push(Rc::clone(&factory));
        trace!(
            depth = hook.depth(),
            instrumented = factory.instrumented(),
            "entered engine session"
        );
        Ok(Self {
            context,
            hook: hook.clone(),
            factory,
        })
    }

    /// The live execution context
    pub(crate) fn context(&mut self) -> &mut Context {
        &mut self.context
    }

    /// The wrap factory installed by this session
    pub(crate) fn factory(&self) -> &Rc<WrapFactory> {
        &self.factory
    }

    /// Wrap a host value through this session's factory
    pub(crate) fn wrap(&mut self, value: HostValue) -> Result<JsValue> {
        let factory = Rc::clone(&self.factory);
        let hook = self.hook.clone();
        factory
            .wrap(&hook, value, &mut self.context)
            .map_err(BridgeError::from)
    }
}

impl Drop for ScopedSession<'_> {
    fn drop(&mut self) {
        self.hook.pop();
        trace!(depth = self.hook.depth(), "released engine session");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BoundaryMetrics;

    fn harness() -> (RefCell<Context>, WrapHook) {
        (RefCell::new(Context::default()), WrapHook::new())
    }

    fn factory() -> Rc<WrapFactory> {
        WrapFactory::new(false, Rc::new(BoundaryMetrics::new()))
    }

    #[test]
    fn test_session_installs_and_restores_factory() {
        let (context, hook) = harness();
        assert_eq!(hook.depth(), 0);
        {
            let _session = ScopedSession::enter(&context, &hook, factory()).unwrap();
            assert_eq!(hook.depth(), 1);
        }
        assert_eq!(hook.depth(), 0);
        assert!(context.try_borrow_mut().is_ok());
    }

    #[test]
    fn test_nested_session_is_rejected() {
        let (context, hook) = harness();
        let first = ScopedSession::enter(&context, &hook, factory()).unwrap();
        let second = ScopedSession::enter(&context, &hook, factory());
        assert!(matches!(second, Err(BridgeError::ReentrantSession)));

        // The failed attempt must not disturb the active session's stack.
        assert_eq!(hook.depth(), 1);
        drop(first);
        assert_eq!(hook.depth(), 0);
    }

    #[test]
    fn test_release_on_failure_paths() {
        let (context, hook) = harness();
        let result: Result<()> = (|| {
            let _session = ScopedSession::enter(&context, &hook, factory())?;
            Err(BridgeError::engine("simulated matcher fault"))
        })();
        assert!(result.is_err());
        assert_eq!(hook.depth(), 0);
        assert!(context.try_borrow_mut().is_ok());
    }

    #[test]
    fn test_instrumentation_flag_captured_at_entry() {
        let (context, hook) = harness();
        let instrumented = WrapFactory::new(true, Rc::new(BoundaryMetrics::new()));
        let session = ScopedSession::enter(&context, &hook, instrumented).unwrap();
        assert!(session.factory().instrumented());
    }
}
