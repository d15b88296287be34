//! Boundary capability interface and engine materialization.
//!
//! Every wrapper variant implements [`Boundary`], the minimal capability
//! set crossing the engine boundary: `has`, `get`, `put`, `delete`,
//! `call`, `construct`, over both string-keyed and index-keyed access.
//! One materialization routine turns any boundary object into an engine
//! `Proxy` whose traps dispatch back into the trait, so decorators compose
//! by wrapping rather than by subclassing each variant.

use std::fmt;
use std::rc::Rc;

use boa_engine::object::ObjectInitializer;
use boa_engine::{js_string, Context, JsNativeError, JsObject, JsResult, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace};

/// Name of the engine-side helper that builds proxies for host objects.
/// Installed by the engine prelude before anything is wrapped.
pub(crate) const PROXY_HELPER: &str = "__hostProxy";

/// A property key crossing the boundary: either a name or an integer index
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Key {
    /// String-keyed access
    Name(String),
    /// Index-keyed access (canonical array indexes only)
    Index(u32),
}

impl Key {
    /// Parse an engine property key. Symbols and other exotic keys yield
    /// `None` and are treated as not-present by every wrapper.
    pub(crate) fn parse(value: &JsValue) -> Option<Key> {
        let s = value.as_string()?.to_std_string_escaped();
        if let Ok(index) = s.parse::<u32>() {
            // "01" is a name, not an index.
            if index.to_string() == s {
                return Some(Key::Index(index));
            }
        }
        Some(Key::Name(s))
    }

    /// Access-path rendering used in log records: `.name` or `[3]`
    pub(crate) fn path(&self) -> String {
        match self {
            Key::Name(name) => format!(".{name}"),
            Key::Index(index) => format!("[{index}]"),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Name(name) => write!(f, "{name}"),
            Key::Index(index) => write!(f, "{index}"),
        }
    }
}

/// The minimal capability interface every wrapper variant exposes to the
/// engine. Decoration (logging) wraps this trait; materialization turns it
/// into an engine object.
pub(crate) trait Boundary {
    /// Static wrapper type name, for diagnostics
    fn kind(&self) -> &'static str;

    /// Diagnostic rendering of the receiver. Observability only; never
    /// used for equality.
    fn describe(&self) -> String;

    /// Property membership
    fn has(&self, key: &Key, ctx: &mut Context) -> JsResult<bool>;

    /// Property read
    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue>;

    /// Property write
    fn put(&self, key: &Key, value: &JsValue, ctx: &mut Context) -> JsResult<()>;

    /// Property deletion; returns whether the property is gone
    fn delete(&self, key: &Key, ctx: &mut Context) -> JsResult<bool>;

    /// Whether the wrapper can be invoked
    fn is_callable(&self) -> bool {
        false
    }

    /// The callable engine object to use as the proxy target, when the
    /// wrapper is invokable
    fn callable_target(&self) -> Option<JsObject> {
        None
    }

    /// Invoke the wrapper
    fn call(&self, _this: &JsValue, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
        Err(JsNativeError::typ()
            .with_message(format!("{} is not callable", self.kind()))
            .into())
    }

    /// Construct through the wrapper
    fn construct(&self, _args: &[JsValue], _ctx: &mut Context) -> JsResult<JsValue> {
        Err(JsNativeError::typ()
            .with_message(format!("{} is not a constructor", self.kind()))
            .into())
    }
}

#[derive(Trace, Finalize)]
struct TrapCaptures {
    #[unsafe_ignore_trace]
    boundary: Rc<dyn Boundary>,
}

impl TrapCaptures {
    fn new(boundary: &Rc<dyn Boundary>) -> Self {
        Self {
            boundary: Rc::clone(boundary),
        }
    }
}

/// Materialize a boundary object as an engine value: a `Proxy` whose traps
/// dispatch into the [`Boundary`] trait.
pub(crate) fn materialize(boundary: Rc<dyn Boundary>, ctx: &mut Context) -> JsResult<JsObject> {
    let target = match boundary.callable_target() {
        Some(func) => func,
        None => ObjectInitializer::new(ctx).build(),
    };

    let get_trap = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let key = match Key::parse(args.get(1).unwrap_or(&JsValue::undefined())) {
                Some(key) => key,
                None => return Ok(JsValue::undefined()),
            };
            captures.boundary.get(&key, ctx)
        },
        TrapCaptures::new(&boundary),
    );

    let set_trap = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let key = match Key::parse(args.get(1).unwrap_or(&JsValue::undefined())) {
                Some(key) => key,
                None => return Ok(JsValue::from(true)),
            };
            let value = args.get(2).cloned().unwrap_or_default();
            captures.boundary.put(&key, &value, ctx)?;
            Ok(JsValue::from(true))
        },
        TrapCaptures::new(&boundary),
    );

    let has_trap = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let key = match Key::parse(args.get(1).unwrap_or(&JsValue::undefined())) {
                Some(key) => key,
                None => return Ok(JsValue::from(false)),
            };
            Ok(JsValue::from(captures.boundary.has(&key, ctx)?))
        },
        TrapCaptures::new(&boundary),
    );

    let delete_trap = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let key = match Key::parse(args.get(1).unwrap_or(&JsValue::undefined())) {
                Some(key) => key,
                None => return Ok(JsValue::from(true)),
            };
            Ok(JsValue::from(captures.boundary.delete(&key, ctx)?))
        },
        TrapCaptures::new(&boundary),
    );

    let invoke_traps = if boundary.is_callable() {
        let apply_trap = NativeFunction::from_copy_closure_with_captures(
            |_this, args, captures, ctx| {
                let this = args.get(1).cloned().unwrap_or_default();
                let call_args =
                    array_values(args.get(2).unwrap_or(&JsValue::undefined()), ctx)?;
                captures.boundary.call(&this, &call_args, ctx)
            },
            TrapCaptures::new(&boundary),
        );
        let construct_trap = NativeFunction::from_copy_closure_with_captures(
            |_this, args, captures, ctx| {
                let call_args =
                    array_values(args.get(1).unwrap_or(&JsValue::undefined()), ctx)?;
                captures.boundary.construct(&call_args, ctx)
            },
            TrapCaptures::new(&boundary),
        );
        Some((apply_trap, construct_trap))
    } else {
        None
    };

    let handler = {
        let mut init = ObjectInitializer::new(ctx);
        init.function(get_trap, js_string!("get"), 3)
            .function(set_trap, js_string!("set"), 4)
            .function(has_trap, js_string!("has"), 2)
            .function(delete_trap, js_string!("deleteProperty"), 2);
        if let Some((apply_trap, construct_trap)) = invoke_traps {
            init.function(apply_trap, js_string!("apply"), 3)
                .function(construct_trap, js_string!("construct"), 3);
        }
        init.build()
    };

    let helper = ctx
        .global_object()
        .get(js_string!("__hostProxy"), ctx)?;
    let helper = helper
        .as_object()
        .filter(|o| o.is_callable())
        .cloned()
        .ok_or_else(|| {
            JsNativeError::typ()
                .with_message(format!("engine prelude helper {PROXY_HELPER} is not installed"))
        })?;

    let proxy = helper.call(
        &JsValue::undefined(),
        &[JsValue::from(target), JsValue::from(handler)],
        ctx,
    )?;

    proxy.as_object().cloned().ok_or_else(|| {
        JsNativeError::typ()
            .with_message("proxy helper did not produce an object")
            .into()
    })
}

/// Read the values of an array-like engine object
pub(crate) fn array_values(value: &JsValue, ctx: &mut Context) -> JsResult<Vec<JsValue>> {
    let obj = match value.as_object() {
        Some(obj) => obj.clone(),
        None => return Ok(Vec::new()),
    };
    let length = obj.get(js_string!("length"), ctx)?.to_u32(ctx)?;
    let mut out = Vec::with_capacity(length as usize);
    for index in 0..length {
        out.push(obj.get(index, ctx)?);
    }
    Ok(out)
}
