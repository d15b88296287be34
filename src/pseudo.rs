//! User-defined pseudo-selector adaptation.
//!
//! A pseudo-selector is a host-side predicate over one element, optionally
//! parameterized by the selector's parenthesized argument. The selector
//! engine requires a two-stage convention: a factory invoked once per
//! selector compilation with the argument (or nothing), returning a
//! matcher invoked once per candidate element. The adapter here keeps the
//! captured argument as explicit state rather than closed-over mutables.

use std::collections::HashMap;
use std::rc::Rc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace};

use crate::dom::NodeRef;
use crate::wrap::{resolve_node, WrapHook};

/// A user-supplied pseudo-selector predicate.
///
/// Implemented for free by any `Fn(&NodeRef, Option<&str>) -> bool`.
pub trait Pseudo {
    /// Test one candidate element. `argument` is the literal parenthesized
    /// selector argument, or `None` when the selector supplied none.
    fn matches(&self, element: &NodeRef, argument: Option<&str>) -> bool;
}

impl<F> Pseudo for F
where
    F: Fn(&NodeRef, Option<&str>) -> bool,
{
    fn matches(&self, element: &NodeRef, argument: Option<&str>) -> bool {
        self(element, argument)
    }
}

/// Per-facade registry of pseudo-selector names. A name, once registered,
/// cannot be unregistered; re-registering overwrites (last write wins).
#[derive(Default)]
pub(crate) struct PseudoRegistry {
    entries: HashMap<String, Rc<dyn Pseudo>>,
}

impl PseudoRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, name: &str, predicate: Rc<dyn Pseudo>) {
        self.entries.insert(name.to_string(), predicate);
    }

    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

/// Stage-2 adapter value: the predicate plus the argument captured by the
/// factory call. One instance per selector compilation.
pub(crate) struct PseudoMatcher {
    predicate: Rc<dyn Pseudo>,
    captured: Option<String>,
    hook: WrapHook,
}

impl PseudoMatcher {
    fn test(&self, candidate: &JsValue, ctx: &mut Context) -> Result<bool, boa_engine::JsError> {
        let element = resolve_node(candidate, &self.hook, ctx)?.ok_or_else(|| {
            JsNativeError::typ().with_message("pseudo-selector matcher expects a host element")
        })?;
        Ok(self.predicate.matches(&element, self.captured.as_deref()))
    }
}

#[derive(Trace, Finalize)]
struct FactoryCaptures {
    #[unsafe_ignore_trace]
    predicate: Rc<dyn Pseudo>,
    #[unsafe_ignore_trace]
    hook: WrapHook,
}

#[derive(Trace, Finalize)]
struct MatcherCaptures {
    #[unsafe_ignore_trace]
    matcher: Rc<PseudoMatcher>,
}

/// Build the stage-1 factory function handed to the selector engine's
/// pseudo registration hook. Called by the engine once per selector
/// compilation with zero or one string argument; returns the stage-2
/// matcher for that compilation.
pub(crate) fn build_factory(
    predicate: Rc<dyn Pseudo>,
    hook: WrapHook,
    ctx: &mut Context,
) -> JsObject {
    let factory = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let captured = args
                .get(0)
                .and_then(JsValue::as_string)
                .map(|s| s.to_std_string_escaped());

            let matcher = Rc::new(PseudoMatcher {
                predicate: Rc::clone(&captures.predicate),
                captured,
                hook: captures.hook.clone(),
            });

            let stage2 = NativeFunction::from_copy_closure_with_captures(
                |_this, args, captures, ctx| {
                    let candidate = args.get(0).cloned().unwrap_or_default();
                    Ok(JsValue::from(captures.matcher.test(&candidate, ctx)?))
                },
                MatcherCaptures { matcher },
            );

            let func = FunctionObjectBuilder::new(ctx.realm(), stage2)
                .name(js_string!("pseudoMatcher"))
                .length(1)
                .build();
            Ok(JsValue::from(func))
        },
        FactoryCaptures { predicate, hook },
    );

    FunctionObjectBuilder::new(ctx.realm(), factory)
        .name(js_string!("pseudoFactory"))
        .length(1)
        .build()
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::engine::compiler::ENGINE_PRELUDE;
    use crate::metrics::BoundaryMetrics;
    use crate::wrap::{HostValue, WrapFactory};
    use boa_engine::Source;

    fn test_context() -> Context {
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .unwrap();
        ctx
    }

    #[test]
    fn test_registry_overwrites_and_never_unregisters() {
        let mut registry = PseudoRegistry::new();
        assert!(!registry.contains("header"));

        registry.insert("header", Rc::new(|_: &NodeRef, _: Option<&str>| true));
        assert!(registry.contains("header"));
        assert_eq!(registry.len(), 1);

        registry.insert("header", Rc::new(|_: &NodeRef, _: Option<&str>| false));
        assert!(registry.contains("header"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_two_stage_adapter_captures_argument() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body><p id=\"x\">text</p></body>").unwrap();
        let p = doc.document_element().unwrap().children()[0].clone();

        let hook = WrapHook::new();
        hook.push(WrapFactory::new(false, Rc::new(BoundaryMetrics::new())));
        let wrapped = hook.wrap(HostValue::Node(p.clone()), ctx).unwrap();

        let predicate: Rc<dyn Pseudo> = Rc::new(|element: &NodeRef, arg: Option<&str>| {
            element.attribute("id").as_deref() == arg
        });
        let factory = build_factory(predicate, hook, ctx);

        // Stage 1 with an argument, stage 2 against the element.
        let matcher = factory
            .call(&JsValue::undefined(), &[JsValue::from(js_string!("x"))], ctx)
            .unwrap();
        let matcher = matcher.as_object().cloned().unwrap();
        let hit = matcher
            .call(&JsValue::undefined(), &[wrapped.clone()], ctx)
            .unwrap();
        assert_eq!(hit.as_boolean(), Some(true));

        let matcher_miss = factory
            .call(&JsValue::undefined(), &[JsValue::from(js_string!("y"))], ctx)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        let miss = matcher_miss
            .call(&JsValue::undefined(), &[wrapped], ctx)
            .unwrap();
        assert_eq!(miss.as_boolean(), Some(false));
    }

    #[test]
    fn test_factory_with_no_argument_captures_none() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body><p>text</p></body>").unwrap();
        let p = doc.document_element().unwrap().children()[0].clone();

        let hook = WrapHook::new();
        hook.push(WrapFactory::new(false, Rc::new(BoundaryMetrics::new())));
        let wrapped = hook.wrap(HostValue::Node(p), ctx).unwrap();

        let predicate: Rc<dyn Pseudo> =
            Rc::new(|_: &NodeRef, arg: Option<&str>| arg.is_none());
        let factory = build_factory(predicate, hook, ctx);

        let matcher = factory
            .call(&JsValue::undefined(), &[], ctx)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        let hit = matcher.call(&JsValue::undefined(), &[wrapped], ctx).unwrap();
        assert_eq!(hit.as_boolean(), Some(true));
    }

    #[test]
    fn test_matcher_rejects_non_elements() {
        let ctx = &mut test_context();
        let hook = WrapHook::new();
        hook.push(WrapFactory::new(false, Rc::new(BoundaryMetrics::new())));

        let predicate: Rc<dyn Pseudo> = Rc::new(|_: &NodeRef, _: Option<&str>| true);
        let factory = build_factory(predicate, hook, ctx);

        let matcher = factory
            .call(&JsValue::undefined(), &[], ctx)
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();
        let result = matcher.call(&JsValue::undefined(), &[JsValue::from(5)], ctx);
        assert!(result.is_err());
    }
}
