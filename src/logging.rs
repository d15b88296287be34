//! Boundary instrumentation.
//!
//! One generic decorator serves every wrapper variant: it performs the
//! underlying operation and, on the way out, emits exactly one log record
//! per crossing (with an `abrupt` marker when the operation failed to
//! produce a value). Function-valued results are not printed; they are
//! re-wrapped so that calls made through them are themselves logged with
//! arguments and results. Decoration never changes a return value, an
//! error, or a side effect.

use std::rc::Rc;

use boa_engine::object::builtins::JsArray;
use boa_engine::property::PropertyKey;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsResult, JsString, JsValue};
use tracing::info;

use crate::metrics::BoundaryMetrics;
use crate::wrap::proxy::{materialize, Boundary, Key};

/// Tracing target carrying every boundary log record
pub const BOUNDARY_TARGET: &str = "dom_query_bridge::boundary";

/// Install a formatting `tracing` subscriber honoring `RUST_LOG`.
/// Convenience for embedders and tests; installing twice is a no-op.
pub fn init_boundary_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

/// The instrumentation decorator. Wraps any [`Boundary`] and logs every
/// operation crossing the engine boundary.
pub(crate) struct LoggingBoundary {
    inner: Rc<dyn Boundary>,
    metrics: Rc<BoundaryMetrics>,
}

impl LoggingBoundary {
    pub(crate) fn new(inner: Rc<dyn Boundary>, metrics: Rc<BoundaryMetrics>) -> Self {
        Self { inner, metrics }
    }

    fn rewrap_function(
        &self,
        name: String,
        func: JsObject,
        ctx: &mut Context,
    ) -> JsResult<JsValue> {
        let callable: Rc<dyn Boundary> = Rc::new(CallableWrapper::new(name, func));
        let logged: Rc<dyn Boundary> = Rc::new(LoggingBoundary::new(
            callable,
            Rc::clone(&self.metrics),
        ));
        Ok(materialize(logged, ctx)?.into())
    }
}

impl Boundary for LoggingBoundary {
    fn kind(&self) -> &'static str {
        self.inner.kind()
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }

    fn has(&self, key: &Key, ctx: &mut Context) -> JsResult<bool> {
        self.metrics.record_has();
        let shown = match key {
            Key::Name(name) => format!("\"{name}\""),
            Key::Index(index) => index.to_string(),
        };
        match self.inner.has(key, ctx) {
            Ok(present) => {
                info!(target: BOUNDARY_TARGET, "{} in {} => {}", shown, self.describe(), present);
                Ok(present)
            }
            Err(e) => {
                info!(target: BOUNDARY_TARGET, "{} in {} => abrupt", shown, self.describe());
                Err(e)
            }
        }
    }

    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue> {
        self.metrics.record_get();
        match self.inner.get(key, ctx) {
            Ok(value) => {
                let func = value.as_object().filter(|o| o.is_callable()).cloned();
                if let Some(func) = func {
                    // Not logged by value; calls through it are logged.
                    return self.rewrap_function(key.path(), func, ctx);
                }
                info!(
                    target: BOUNDARY_TARGET,
                    "{}{} => {}",
                    self.describe(),
                    key.path(),
                    display_value(&value)
                );
                Ok(value)
            }
            Err(e) => {
                info!(target: BOUNDARY_TARGET, "{}{} => abrupt", self.describe(), key.path());
                Err(e)
            }
        }
    }

    fn put(&self, key: &Key, value: &JsValue, ctx: &mut Context) -> JsResult<()> {
        self.metrics.record_put();
        info!(
            target: BOUNDARY_TARGET,
            "{}{} = {}",
            self.describe(),
            key.path(),
            display_value(value)
        );
        self.inner.put(key, value, ctx)
    }

    fn delete(&self, key: &Key, ctx: &mut Context) -> JsResult<bool> {
        self.metrics.record_delete();
        info!(target: BOUNDARY_TARGET, "delete {}{}", self.describe(), key.path());
        self.inner.delete(key, ctx)
    }

    fn is_callable(&self) -> bool {
        self.inner.is_callable()
    }

    fn callable_target(&self) -> Option<JsObject> {
        self.inner.callable_target()
    }

    fn call(&self, this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
        self.metrics.record_call();
        let lhs = if this.is_undefined() || this.is_null() {
            self.describe()
        } else {
            format!("{}{}", display_value(this), self.describe())
        };
        match self.inner.call(this, args, ctx) {
            Ok(value) => {
                info!(
                    target: BOUNDARY_TARGET,
                    "{}({}) => {}",
                    lhs,
                    printable_args(args),
                    display_value(&value)
                );
                let func = value.as_object().filter(|o| o.is_callable()).cloned();
                if let Some(func) = func {
                    let name = format!("{}()", self.describe());
                    return self.rewrap_function(name, func, ctx);
                }
                Ok(value)
            }
            Err(e) => {
                info!(target: BOUNDARY_TARGET, "{}({}) => abrupt", lhs, printable_args(args));
                Err(e)
            }
        }
    }

    fn construct(&self, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
        self.metrics.record_construct();
        match self.inner.construct(args, ctx) {
            Ok(value) => {
                info!(
                    target: BOUNDARY_TARGET,
                    "new {}({}) => {}",
                    self.describe(),
                    printable_args(args),
                    display_value(&value)
                );
                let func = value.as_object().filter(|o| o.is_callable()).cloned();
                if let Some(func) = func {
                    let name = format!("new {}()", self.describe());
                    return self.rewrap_function(name, func, ctx);
                }
                Ok(value)
            }
            Err(e) => {
                info!(
                    target: BOUNDARY_TARGET,
                    "new {}({}) => abrupt",
                    self.describe(),
                    printable_args(args)
                );
                Err(e)
            }
        }
    }
}

/// Pass-through wrapper around an engine function. Only exists so that the
/// decorator can re-wrap function-valued results and trace calls through
/// them; without instrumentation, functions cross the boundary bare.
pub(crate) struct CallableWrapper {
    name: String,
    func: JsObject,
}

impl CallableWrapper {
    pub(crate) fn new(name: String, func: JsObject) -> Self {
        Self { name, func }
    }
}

impl Boundary for CallableWrapper {
    fn kind(&self) -> &'static str {
        "CallableWrapper"
    }

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn has(&self, key: &Key, ctx: &mut Context) -> JsResult<bool> {
        self.func.has_property(to_property_key(key), ctx)
    }

    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue> {
        self.func.get(to_property_key(key), ctx)
    }

    fn put(&self, key: &Key, value: &JsValue, ctx: &mut Context) -> JsResult<()> {
        self.func
            .set(to_property_key(key), value.clone(), false, ctx)?;
        Ok(())
    }

    fn delete(&self, _key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        // Engine-side function properties are not deletable through the
        // bridge; report the property as kept.
        Ok(false)
    }

    fn is_callable(&self) -> bool {
        true
    }

    fn callable_target(&self) -> Option<JsObject> {
        Some(self.func.clone())
    }

    fn call(&self, this: &JsValue, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
        self.func.call(this, args, ctx)
    }

    fn construct(&self, args: &[JsValue], ctx: &mut Context) -> JsResult<JsValue> {
        let reflect = ctx
            .global_object()
            .get(js_string!("Reflect"), ctx)?
            .as_object()
            .cloned()
            .ok_or_else(|| JsNativeError::typ().with_message("Reflect is not available"))?;
        let construct = reflect
            .get(js_string!("construct"), ctx)?
            .as_object()
            .filter(|o| o.is_callable())
            .cloned()
            .ok_or_else(|| JsNativeError::typ().with_message("Reflect.construct is missing"))?;
        let arguments = JsArray::from_iter(args.iter().cloned(), ctx);
        construct.call(
            &JsValue::from(reflect),
            &[JsValue::from(self.func.clone()), JsValue::from(arguments)],
            ctx,
        )
    }
}

fn to_property_key(key: &Key) -> PropertyKey {
    match key {
        Key::Name(name) => PropertyKey::from(JsString::from(name.as_str())),
        Key::Index(index) => PropertyKey::from(*index),
    }
}

/// Log-friendly rendering of an engine value. Callables are never printed
/// by value.
fn display_value(value: &JsValue) -> String {
    if let Some(s) = value.as_string() {
        return s.to_std_string_escaped();
    }
    if let Some(n) = value.as_number() {
        return n.to_string();
    }
    if let Some(b) = value.as_boolean() {
        return b.to_string();
    }
    if value.is_null() {
        return "null".to_string();
    }
    if value.is_undefined() {
        return "undefined".to_string();
    }
    if value.as_object().map_or(false, |o| o.is_callable()) {
        return "[function]".to_string();
    }
    "[object]".to_string()
}

fn printable_args(args: &[JsValue]) -> String {
    args.iter()
        .map(|v| {
            if let Some(s) = v.as_string() {
                format!("\"{}\"", s.to_std_string_escaped())
            } else {
                display_value(v)
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::engine::compiler::ENGINE_PRELUDE;
    use crate::wrap::node::NodeWrapper;
    use crate::wrap::{WrapFactory, WrapHook};
    use boa_engine::Source;

    fn test_context() -> Context {
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .unwrap();
        ctx
    }

    fn instrumented_hook() -> WrapHook {
        let hook = WrapHook::new();
        hook.push(WrapFactory::new(true, Rc::new(BoundaryMetrics::new())));
        hook
    }

    #[test]
    fn test_decoration_is_transparent_for_gets() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body class=\"toplevel\"><p/></body>").unwrap();
        let body = doc.document_element().unwrap();
        let hook = instrumented_hook();

        let plain = NodeWrapper::new(body.clone(), hook.clone());
        let metrics = Rc::new(BoundaryMetrics::new());
        let logged = LoggingBoundary::new(
            Rc::new(NodeWrapper::new(body, hook)),
            Rc::clone(&metrics),
        );

        let key = Key::Name("className".into());
        let direct = plain.get(&key, ctx).unwrap();
        let decorated = logged.get(&key, ctx).unwrap();
        assert_eq!(
            direct.as_string().map(|s| s.to_std_string_escaped()),
            decorated.as_string().map(|s| s.to_std_string_escaped())
        );
        assert_eq!(metrics.snapshot().gets, 1);
    }

    #[test]
    fn test_decoration_preserves_errors() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body><p/></body>").unwrap();
        let body = doc.document_element().unwrap();
        let hook = instrumented_hook();
        let metrics = Rc::new(BoundaryMetrics::new());
        let logged =
            LoggingBoundary::new(Rc::new(NodeWrapper::new(body, hook)), Rc::clone(&metrics));

        let result = logged.put(&Key::Name("nodeType".into()), &JsValue::from(7), ctx);
        assert!(result.is_err());
        assert_eq!(metrics.snapshot().puts, 1);
    }

    #[test]
    fn test_function_results_are_rewrapped_and_callable() {
        let ctx = &mut test_context();
        let func = ctx
            .eval(Source::from_bytes(b"(function(x) { return x + 1; })"))
            .unwrap()
            .as_object()
            .cloned()
            .unwrap();

        let metrics = Rc::new(BoundaryMetrics::new());
        let callable: Rc<dyn Boundary> =
            Rc::new(CallableWrapper::new(".increment".into(), func));
        let logged = LoggingBoundary::new(callable, Rc::clone(&metrics));

        let result = logged
            .call(&JsValue::undefined(), &[JsValue::from(41)], ctx)
            .unwrap();
        assert_eq!(result.as_number(), Some(42.0));
        assert_eq!(metrics.snapshot().calls, 1);
    }

    #[test]
    fn test_display_value_never_prints_functions() {
        let ctx = &mut test_context();
        let func = ctx
            .eval(Source::from_bytes(b"(function() {})"))
            .unwrap();
        assert_eq!(display_value(&func), "[function]");
        assert_eq!(display_value(&JsValue::from(js_string!("x"))), "x");
        assert_eq!(display_value(&JsValue::null()), "null");
    }

    #[test]
    fn test_printable_args_quotes_strings() {
        let rendered = printable_args(&[
            JsValue::from(js_string!("p")),
            JsValue::from(2),
            JsValue::from(true),
        ]);
        assert_eq!(rendered, "\"p\", 2, true");
    }
}
