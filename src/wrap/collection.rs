//! Collection wrapper: an ordered, read-only, index-addressable view over
//! the host collection shapes.
//!
//! One wrapper serves all four shapes; they differ only in the item
//! accessor. Index access is aliased to that accessor, `length` and an
//! `item(i)` callable are exposed, and everything else falls through to
//! not-present. The underlying collections are read-only views: writes
//! through the wrapper are a type error.

use std::rc::Rc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace};

use crate::dom::{NodeRef, ParseDiagnostic};
use crate::wrap::proxy::{Boundary, Key};
use crate::wrap::{to_string_function, HostValue, WrapHook};

/// The host collection shapes unified behind one item/length surface
#[derive(Clone)]
pub(crate) enum CollectionItems {
    /// Strings (e.g. a class token list); items are engine primitives
    Strings(Rc<Vec<String>>),
    /// Opaque records (parse diagnostics); items wrap as opaque objects
    Diagnostics(Rc<Vec<ParseDiagnostic>>),
    /// Tree nodes in document order
    Nodes(Rc<Vec<NodeRef>>),
    /// The named attribute map of a node; indexable in the map's own
    /// iteration order, no further ordering guarantees
    AttrEntries(NodeRef),
}

impl CollectionItems {
    fn shape(&self) -> &'static str {
        match self {
            CollectionItems::Strings(_) => "StringList",
            CollectionItems::Diagnostics(_) => "DiagnosticList",
            CollectionItems::Nodes(_) => "NodeList",
            CollectionItems::AttrEntries(_) => "AttrMap",
        }
    }

    fn len(&self) -> usize {
        match self {
            CollectionItems::Strings(items) => items.len(),
            CollectionItems::Diagnostics(items) => items.len(),
            CollectionItems::Nodes(items) => items.len(),
            CollectionItems::AttrEntries(node) => node.attribute_count(),
        }
    }

    /// Fetch one item, recursively wrapped through the active factory.
    /// Out-of-range indexes yield `None`.
    fn item(&self, index: usize, hook: &WrapHook, ctx: &mut Context) -> JsResult<Option<JsValue>> {
        match self {
            CollectionItems::Strings(items) => Ok(items
                .get(index)
                .map(|s| JsValue::from(JsString::from(s.as_str())))),
            CollectionItems::Diagnostics(items) => match items.get(index) {
                Some(diagnostic) => Ok(Some(
                    hook.wrap(HostValue::Diagnostic(diagnostic.clone()), ctx)?,
                )),
                None => Ok(None),
            },
            CollectionItems::Nodes(items) => match items.get(index) {
                Some(node) => Ok(Some(hook.wrap(HostValue::Node(node.clone()), ctx)?)),
                None => Ok(None),
            },
            CollectionItems::AttrEntries(node) => {
                match node.attribute_entries().into_iter().nth(index) {
                    Some(entry) => Ok(Some(hook.wrap(HostValue::AttrEntry(entry), ctx)?)),
                    None => Ok(None),
                }
            }
        }
    }
}

pub(crate) struct CollectionWrapper {
    items: CollectionItems,
    hook: WrapHook,
}

impl CollectionWrapper {
    pub(crate) fn new(items: CollectionItems, hook: WrapHook) -> Self {
        Self { items, hook }
    }
}

impl Boundary for CollectionWrapper {
    fn kind(&self) -> &'static str {
        self.items.shape()
    }

    fn describe(&self) -> String {
        format!("{}{{length: {}}}", self.items.shape(), self.items.len())
    }

    fn has(&self, key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        match key {
            Key::Index(index) => Ok((*index as usize) < self.items.len()),
            Key::Name(name) => Ok(matches!(name.as_str(), "length" | "item" | "toString")),
        }
    }

    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue> {
        match key {
            Key::Index(index) => Ok(self
                .items
                .item(*index as usize, &self.hook, ctx)?
                .unwrap_or_default()),
            Key::Name(name) => match name.as_str() {
                "length" => Ok(JsValue::from(self.items.len() as u32)),
                "item" => Ok(item_function(self.items.clone(), self.hook.clone(), ctx)),
                "toString" => Ok(to_string_function(self.describe(), ctx)),
                // Everything else falls through to not-present.
                _ => Ok(JsValue::undefined()),
            },
        }
    }

    fn put(&self, key: &Key, _value: &JsValue, _ctx: &mut Context) -> JsResult<()> {
        Err(JsNativeError::typ()
            .with_message(format!(
                "cannot set {key} on a read-only {}",
                self.items.shape()
            ))
            .into())
    }

    fn delete(&self, _key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        Ok(false)
    }
}

#[derive(Trace, Finalize)]
struct ItemCaptures {
    #[unsafe_ignore_trace]
    items: CollectionItems,
    #[unsafe_ignore_trace]
    hook: WrapHook,
}

/// The `item(i)` accessor alias. Mirrors the host accessor convention:
/// out-of-range and non-numeric arguments yield null.
fn item_function(items: CollectionItems, hook: WrapHook, ctx: &mut Context) -> JsValue {
    let function = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let index = args.get(0).and_then(JsValue::as_number);
            let index = match index {
                Some(n) if n.is_finite() && n >= 0.0 => n as usize,
                _ => return Ok(JsValue::null()),
            };
            Ok(captures
                .items
                .item(index, &captures.hook, ctx)?
                .unwrap_or(JsValue::null()))
        },
        ItemCaptures { items, hook },
    );

    let func = FunctionObjectBuilder::new(ctx.realm(), function)
        .name(js_string!("item"))
        .length(1)
        .build();
    JsValue::from(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::Document;
    use crate::engine::compiler::ENGINE_PRELUDE;
    use crate::metrics::BoundaryMetrics;
    use crate::wrap::WrapFactory;
    use boa_engine::Source;

    fn test_context() -> Context {
        let mut ctx = Context::default();
        ctx.eval(Source::from_bytes(ENGINE_PRELUDE.as_bytes()))
            .unwrap();
        ctx
    }

    fn test_hook() -> WrapHook {
        let hook = WrapHook::new();
        hook.push(WrapFactory::new(false, Rc::new(BoundaryMetrics::new())));
        hook
    }

    #[test]
    fn test_string_list_shape() {
        let ctx = &mut test_context();
        let items = CollectionItems::Strings(Rc::new(vec!["toplevel".into(), "wide".into()]));
        let wrapper = CollectionWrapper::new(items, test_hook());

        assert!(wrapper.has(&Key::Index(0), ctx).unwrap());
        assert!(wrapper.has(&Key::Index(1), ctx).unwrap());
        assert!(!wrapper.has(&Key::Index(2), ctx).unwrap());
        assert!(wrapper.has(&Key::Name("length".into()), ctx).unwrap());
        assert!(!wrapper.has(&Key::Name("push".into()), ctx).unwrap());

        let first = wrapper.get(&Key::Index(0), ctx).unwrap();
        assert_eq!(
            first.as_string().map(|s| s.to_std_string_escaped()),
            Some("toplevel".to_string())
        );

        let length = wrapper.get(&Key::Name("length".into()), ctx).unwrap();
        assert_eq!(length.as_number(), Some(2.0));
    }

    #[test]
    fn test_node_list_wraps_items() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body><p/><p/></body>").unwrap();
        let body = doc.document_element().unwrap();
        let items = CollectionItems::Nodes(Rc::new(body.children()));
        let wrapper = CollectionWrapper::new(items, test_hook());

        let first = wrapper.get(&Key::Index(0), ctx).unwrap();
        assert!(first.is_object());
        let missing = wrapper.get(&Key::Index(5), ctx).unwrap();
        assert!(missing.is_undefined());
    }

    #[test]
    fn test_attr_map_shape() {
        let ctx = &mut test_context();
        let doc = Document::parse("<body class=\"toplevel\" id=\"b\"><p/></body>").unwrap();
        let body = doc.document_element().unwrap();
        let wrapper = CollectionWrapper::new(CollectionItems::AttrEntries(body), test_hook());

        let length = wrapper.get(&Key::Name("length".into()), ctx).unwrap();
        assert_eq!(length.as_number(), Some(2.0));

        let first = wrapper.get(&Key::Index(0), ctx).unwrap();
        assert!(first.is_object());
    }

    #[test]
    fn test_diagnostic_list_shape() {
        let ctx = &mut test_context();
        let (_, diagnostics) = crate::dom::parse_fragment("<a><b>x</a>");
        assert!(!diagnostics.is_empty());
        let wrapper = CollectionWrapper::new(
            CollectionItems::Diagnostics(Rc::new(diagnostics)),
            test_hook(),
        );

        let first = wrapper.get(&Key::Index(0), ctx).unwrap();
        assert!(first.is_object());
    }

    #[test]
    fn test_collections_are_read_only() {
        let ctx = &mut test_context();
        let items = CollectionItems::Strings(Rc::new(vec!["a".into()]));
        let wrapper = CollectionWrapper::new(items, test_hook());

        assert!(wrapper
            .put(&Key::Index(0), &JsValue::from(js_string!("b")), ctx)
            .is_err());
        assert!(wrapper
            .put(&Key::Name("length".into()), &JsValue::from(0), ctx)
            .is_err());
        assert!(!wrapper.delete(&Key::Index(0), ctx).unwrap());
    }

    #[test]
    fn test_describe() {
        let items = CollectionItems::Strings(Rc::new(vec!["a".into(), "b".into()]));
        let wrapper = CollectionWrapper::new(items, test_hook());
        assert_eq!(wrapper.describe(), "StringList{length: 2}");
    }
}
