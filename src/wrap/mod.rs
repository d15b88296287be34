//! Object wrapping: deciding how each host object is represented inside
//! the engine.
//!
//! The factory dispatches on an explicit closed enum of host shapes, in a
//! fixed order (a host object can satisfy several shape checks, so order
//! matters): tree node first, then the four collection shapes, then the
//! generic opaque fallback. New shapes extend the enum, not a chain of
//! runtime type checks.

pub(crate) mod collection;
pub(crate) mod node;
pub(crate) mod proxy;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{
    js_string, Context, JsNativeError, JsObject, JsResult, JsString, JsValue, NativeFunction,
};
use boa_gc::{Finalize, Trace};

use crate::dom::{AttrEntry, NodeRef, ParseDiagnostic};
use crate::logging::LoggingBoundary;
use crate::metrics::BoundaryMetrics;
use collection::{CollectionItems, CollectionWrapper};
use node::NodeWrapper;
use proxy::{materialize, Boundary, Key};

/// A host value crossing into the engine. Closed over the known host
/// shapes; matched exhaustively by the factory.
pub(crate) enum HostValue {
    /// A single tree node (document, element, text, comment, fragment)
    Node(NodeRef),
    /// A read-only list of strings (e.g. a class token list)
    StringList(Rc<Vec<String>>),
    /// A read-only list of opaque records (e.g. parse diagnostics)
    DiagnosticList(Rc<Vec<ParseDiagnostic>>),
    /// A read-only, ordered list of tree nodes
    NodeList(Rc<Vec<NodeRef>>),
    /// The named attribute map of a node, indexable in insertion order
    AttrMap(NodeRef),
    /// A single attribute entry (opaque fallback)
    AttrEntry(AttrEntry),
    /// A single parse diagnostic (opaque fallback)
    Diagnostic(ParseDiagnostic),
}

/// Per-session wrap factory. Decides the wrapper variant for each host
/// value, applies instrumentation when enabled, and keeps the session's
/// wrapper records so repeated wraps of the same node are referentially
/// consistent.
pub(crate) struct WrapFactory {
    instrumented: bool,
    metrics: Rc<BoundaryMetrics>,
    records: RefCell<HashMap<u64, JsObject>>,
    nodes: RefCell<HashMap<u64, NodeRef>>,
}

impl WrapFactory {
    pub(crate) fn new(instrumented: bool, metrics: Rc<BoundaryMetrics>) -> Rc<Self> {
        Rc::new(Self {
            instrumented,
            metrics,
            records: RefCell::new(HashMap::new()),
            nodes: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) fn instrumented(&self) -> bool {
        self.instrumented
    }

    /// Wrap a host value as an engine value. Pure given the value and the
    /// instrumentation flag, aside from the session record bookkeeping.
    pub(crate) fn wrap(
        &self,
        hook: &WrapHook,
        value: HostValue,
        ctx: &mut Context,
    ) -> JsResult<JsValue> {
        self.metrics.record_wrap();

        match value {
            HostValue::Node(node) => {
                let uid = node.uid();
                let existing = self.records.borrow().get(&uid).cloned();
                if let Some(object) = existing {
                    return Ok(object.into());
                }
                let boundary: Rc<dyn Boundary> =
                    Rc::new(NodeWrapper::new(node.clone(), hook.clone()));
                let object = self.finish(boundary, ctx)?;
                self.records.borrow_mut().insert(uid, object.clone());
                self.nodes.borrow_mut().insert(uid, node);
                Ok(object.into())
            }
            HostValue::StringList(items) => {
                self.wrap_collection(hook, CollectionItems::Strings(items), ctx)
            }
            HostValue::DiagnosticList(items) => {
                self.wrap_collection(hook, CollectionItems::Diagnostics(items), ctx)
            }
            HostValue::NodeList(items) => {
                self.wrap_collection(hook, CollectionItems::Nodes(items), ctx)
            }
            HostValue::AttrMap(node) => {
                self.wrap_collection(hook, CollectionItems::AttrEntries(node), ctx)
            }
            HostValue::AttrEntry(entry) => {
                let boundary: Rc<dyn Boundary> = Rc::new(OpaqueWrapper::attr_entry(&entry));
                Ok(self.finish(boundary, ctx)?.into())
            }
            HostValue::Diagnostic(diagnostic) => {
                let boundary: Rc<dyn Boundary> = Rc::new(OpaqueWrapper::diagnostic(&diagnostic));
                Ok(self.finish(boundary, ctx)?.into())
            }
        }
    }

    fn wrap_collection(
        &self,
        hook: &WrapHook,
        items: CollectionItems,
        ctx: &mut Context,
    ) -> JsResult<JsValue> {
        let boundary: Rc<dyn Boundary> = Rc::new(CollectionWrapper::new(items, hook.clone()));
        Ok(self.finish(boundary, ctx)?.into())
    }

    fn finish(&self, boundary: Rc<dyn Boundary>, ctx: &mut Context) -> JsResult<JsObject> {
        let boundary: Rc<dyn Boundary> = if self.instrumented {
            Rc::new(LoggingBoundary::new(boundary, Rc::clone(&self.metrics)))
        } else {
            boundary
        };
        materialize(boundary, ctx)
    }

    /// Resolve a node wrapped through this factory by its uid
    pub(crate) fn lookup_node(&self, uid: u64) -> Option<NodeRef> {
        self.nodes.borrow().get(&uid).cloned()
    }
}

/// The engine's wrap-factory stack. Sessions push their factory on entry
/// and pop it on release; wrapping performed while the engine is running
/// consults the top of the stack, so nested wrapping inside one session
/// and replacement across sessions both behave.
#[derive(Clone)]
pub(crate) struct WrapHook {
    stack: Rc<RefCell<Vec<Rc<WrapFactory>>>>,
}

impl WrapHook {
    pub(crate) fn new() -> Self {
        Self {
            stack: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub(crate) fn push(&self, factory: Rc<WrapFactory>) {
        self.stack.borrow_mut().push(factory);
    }

    pub(crate) fn pop(&self) {
        self.stack.borrow_mut().pop();
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// The factory installed by the innermost active session
    pub(crate) fn current(&self) -> Option<Rc<WrapFactory>> {
        self.stack.borrow().last().cloned()
    }

    /// Wrap through the currently installed factory
    pub(crate) fn wrap(&self, value: HostValue, ctx: &mut Context) -> JsResult<JsValue> {
        let factory = self.current().ok_or_else(|| {
            JsNativeError::typ().with_message("no wrap factory installed: no active session")
        })?;
        factory.wrap(self, value, ctx)
    }

    /// Resolve a wrapped node by uid, innermost session first
    pub(crate) fn lookup_node(&self, uid: u64) -> Option<NodeRef> {
        for factory in self.stack.borrow().iter().rev() {
            if let Some(node) = factory.lookup_node(uid) {
                return Some(node);
            }
        }
        None
    }
}

/// Resolve an engine value back to the host node it wraps, if it is a node
/// wrapper produced during an active session.
pub(crate) fn resolve_node(
    value: &JsValue,
    hook: &WrapHook,
    ctx: &mut Context,
) -> JsResult<Option<NodeRef>> {
    let object = match value.as_object() {
        Some(object) => object.clone(),
        None => return Ok(None),
    };
    let id = object.get(js_string!("__nodeId"), ctx)?;
    let uid = match id.as_number() {
        Some(n) if n.is_finite() && n >= 0.0 => n as u64,
        _ => return Ok(None),
    };
    Ok(hook.lookup_node(uid))
}

/// Build an engine function that returns a fixed diagnostic string. Used
/// as the `toString` of wrappers.
pub(crate) fn to_string_function(text: String, ctx: &mut Context) -> JsValue {
    #[derive(Trace, Finalize)]
    struct Captures {
        #[unsafe_ignore_trace]
        text: String,
    }

    let function = NativeFunction::from_copy_closure_with_captures(
        |_this, _args, captures, _ctx| {
            Ok(JsValue::from(JsString::from(captures.text.as_str())))
        },
        Captures { text },
    );

    let func = FunctionObjectBuilder::new(ctx.realm(), function)
        .name(js_string!("toString"))
        .length(0)
        .build();
    JsValue::from(func)
}

/// Generic fallback wrapper: exposes only the intrinsic record fields of
/// the host value, no synthesized properties.
pub(crate) struct OpaqueWrapper {
    type_name: &'static str,
    fields: Vec<(&'static str, FieldValue)>,
}

pub(crate) enum FieldValue {
    Str(String),
    Num(f64),
}

impl OpaqueWrapper {
    pub(crate) fn attr_entry(entry: &AttrEntry) -> Self {
        Self {
            type_name: "AttrEntry",
            fields: vec![
                ("name", FieldValue::Str(entry.name.clone())),
                ("value", FieldValue::Str(entry.value.clone())),
            ],
        }
    }

    pub(crate) fn diagnostic(diagnostic: &ParseDiagnostic) -> Self {
        Self {
            type_name: "ParseDiagnostic",
            fields: vec![
                ("message", FieldValue::Str(diagnostic.message.clone())),
                ("byteOffset", FieldValue::Num(diagnostic.byte_offset as f64)),
            ],
        }
    }
}

impl Boundary for OpaqueWrapper {
    fn kind(&self) -> &'static str {
        self.type_name
    }

    fn describe(&self) -> String {
        let fields: Vec<String> = self
            .fields
            .iter()
            .map(|(name, value)| match value {
                FieldValue::Str(s) => format!("{name}: {s}"),
                FieldValue::Num(n) => format!("{name}: {n}"),
            })
            .collect();
        format!("{}{{{}}}", self.type_name, fields.join(", "))
    }

    fn has(&self, key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        match key {
            Key::Name(name) => Ok(name == "toString"
                || self.fields.iter().any(|(n, _)| *n == name.as_str())),
            Key::Index(_) => Ok(false),
        }
    }

    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue> {
        if let Key::Name(name) = key {
            if name == "toString" {
                return Ok(to_string_function(self.describe(), ctx));
            }
            if let Some((_, value)) = self.fields.iter().find(|(n, _)| *n == name.as_str()) {
                return Ok(match value {
                    FieldValue::Str(s) => JsValue::from(JsString::from(s.as_str())),
                    FieldValue::Num(n) => JsValue::from(*n),
                });
            }
        }
        Ok(JsValue::undefined())
    }

    fn put(&self, key: &Key, _value: &JsValue, _ctx: &mut Context) -> JsResult<()> {
        Err(JsNativeError::typ()
            .with_message(format!("cannot set {key} on {}", self.type_name))
            .into())
    }

    fn delete(&self, _key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        Ok(false)
    }
}
