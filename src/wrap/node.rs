//! Node wrapper: represents a single tree node to the engine.
//!
//! Synthesizes the attribute-backed `id`/`className` properties and the
//! serialized-subtree `innerHTML` property on top of the node's intrinsic
//! host surface. A node that is itself list-like additionally answers
//! integer-indexed access from its own items.

use std::rc::Rc;

use boa_engine::object::FunctionObjectBuilder;
use boa_engine::{js_string, Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace};

use crate::dom::{self, NodeKind, NodeRef};
use crate::wrap::proxy::{Boundary, Key};
use crate::wrap::{resolve_node, to_string_function, HostValue, WrapHook};

/// Engine-visible property names backed by host attributes
const PROPERTY_TO_ATTRIBUTE: &[(&str, &str)] = &[("id", "id"), ("className", "class")];

/// The synthesized serialized-subtree property
const INNER_HTML: &str = "innerHTML";

/// Reserved engine-visible node identity property
const NODE_ID: &str = "__nodeId";

pub(crate) struct NodeWrapper {
    node: NodeRef,
    hook: WrapHook,
}

impl NodeWrapper {
    pub(crate) fn new(node: NodeRef, hook: WrapHook) -> Self {
        Self { node, hook }
    }

    fn backing_attribute(&self, name: &str) -> Option<&'static str> {
        if !self.node.is_element() {
            return None;
        }
        PROPERTY_TO_ATTRIBUTE
            .iter()
            .find(|(property, _)| *property == name)
            .map(|(_, attribute)| *attribute)
    }

    /// Serialize the subtree: shallow-structure clones of each direct
    /// child (structure and text preserved, attributes dropped) assembled
    /// into a synthetic fragment and serialized. The attribute loss is a
    /// documented limitation of this operation.
    fn inner_html(&self) -> String {
        let fragment = NodeRef::new_fragment();
        for child in self.node.children() {
            fragment.append_child(&child.clone_structure());
        }
        fragment.serialize()
    }

    /// Wholesale child replacement: parse the value as a fragment in a
    /// detached tree, import each resulting child, drop the current
    /// children, append the imported ones. Not well-formedness-preserving
    /// for malformed input; the fragment parser recovers best-effort.
    fn set_inner_html(&self, markup: &str) {
        let (fragment, diagnostics) = dom::parse_fragment(markup);
        for diagnostic in &diagnostics {
            tracing::warn!(
                target: "dom_query_bridge::boundary",
                byte_offset = diagnostic.byte_offset,
                "subtree replacement recovered from malformed markup: {}",
                diagnostic.message
            );
        }
        let imported: Vec<NodeRef> = fragment
            .children()
            .iter()
            .map(NodeRef::clone_imported)
            .collect();
        self.node.replace_children(imported);
    }

    fn intrinsic_has(&self, name: &str) -> bool {
        match name {
            "nodeType" | "nodeName" | "nodeValue" | "parentNode" | "childNodes"
            | "attributes" | "classList" | "ownerDocument" | "getAttribute" | "contains"
            | "toString" | NODE_ID => true,
            "documentElement" => self.node.is_document(),
            "length" => self.node.item_list().is_some(),
            _ => false,
        }
    }

    fn intrinsic_get(&self, name: &str, ctx: &mut Context) -> JsResult<JsValue> {
        match name {
            "nodeType" => Ok(JsValue::from(self.node.node_type())),
            "nodeName" => Ok(JsValue::from(JsString::from(self.node.name()))),
            "nodeValue" => match self.node.kind() {
                NodeKind::Text | NodeKind::Comment => {
                    Ok(JsValue::from(JsString::from(self.node.node_value().as_str())))
                }
                _ => Ok(JsValue::null()),
            },
            "parentNode" => match self.node.parent() {
                Some(parent) => self.hook.wrap(HostValue::Node(parent), ctx),
                None => Ok(JsValue::null()),
            },
            "childNodes" => self
                .hook
                .wrap(HostValue::NodeList(Rc::new(self.node.children())), ctx),
            "attributes" => self.hook.wrap(HostValue::AttrMap(self.node.clone()), ctx),
            "classList" => self
                .hook
                .wrap(HostValue::StringList(Rc::new(self.node.class_list())), ctx),
            "ownerDocument" => match self.node.owner_document() {
                Some(doc) => self.hook.wrap(HostValue::Node(doc), ctx),
                None => Ok(JsValue::null()),
            },
            "documentElement" if self.node.is_document() => {
                match self.node.children().into_iter().find(NodeRef::is_element) {
                    Some(element) => self.hook.wrap(HostValue::Node(element), ctx),
                    None => Ok(JsValue::null()),
                }
            }
            "length" => match self.node.item_list() {
                Some(items) => Ok(JsValue::from(items.len() as u32)),
                None => Ok(JsValue::undefined()),
            },
            "getAttribute" => Ok(get_attribute_function(self.node.clone(), ctx)),
            "contains" => Ok(contains_function(self.node.clone(), self.hook.clone(), ctx)),
            "toString" => Ok(to_string_function(self.describe(), ctx)),
            NODE_ID => Ok(JsValue::from(self.node.uid() as f64)),
            _ => Ok(JsValue::undefined()),
        }
    }
}

impl Boundary for NodeWrapper {
    fn kind(&self) -> &'static str {
        "DomNode"
    }

    fn describe(&self) -> String {
        let mut out = format!(
            "DomNode{{kind: {:?}, name: {}, uid: {}",
            self.node.kind(),
            self.node.name(),
            self.node.uid()
        );
        if let Some(items) = self.node.item_list() {
            out.push_str(&format!(", items: {}", items.len()));
        }
        out.push('}');
        out
    }

    fn has(&self, key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        match key {
            Key::Name(name) => Ok(self.backing_attribute(name).is_some()
                || name == INNER_HTML
                || self.intrinsic_has(name)),
            Key::Index(index) => match self.node.item_list() {
                Some(items) => Ok((*index as usize) < items.len()),
                None => Ok(false),
            },
        }
    }

    fn get(&self, key: &Key, ctx: &mut Context) -> JsResult<JsValue> {
        match key {
            Key::Name(name) => {
                if let Some(attribute) = self.backing_attribute(name) {
                    // Absent attributes read as the empty string, never null.
                    let value = self.node.attribute(attribute).unwrap_or_default();
                    return Ok(JsValue::from(JsString::from(value.as_str())));
                }
                if name == INNER_HTML {
                    return Ok(JsValue::from(JsString::from(self.inner_html().as_str())));
                }
                self.intrinsic_get(name, ctx)
            }
            Key::Index(index) => match self.node.item_list() {
                Some(items) => match items.get(*index as usize) {
                    Some(item) => self.hook.wrap(HostValue::Node(item.clone()), ctx),
                    // Out of range is "not present", not an error.
                    None => Ok(JsValue::undefined()),
                },
                None => Ok(JsValue::undefined()),
            },
        }
    }

    fn put(&self, key: &Key, value: &JsValue, ctx: &mut Context) -> JsResult<()> {
        match key {
            Key::Name(name) => {
                if let Some(attribute) = self.backing_attribute(name) {
                    let string = value.to_string(ctx)?.to_std_string_escaped();
                    self.node.set_attribute(attribute, &string);
                    return Ok(());
                }
                if name == INNER_HTML {
                    let markup = value.to_string(ctx)?.to_std_string_escaped();
                    self.set_inner_html(&markup);
                    return Ok(());
                }
                Err(JsNativeError::typ()
                    .with_message(format!("cannot set {name} on a host node"))
                    .into())
            }
            Key::Index(index) => Err(JsNativeError::typ()
                .with_message(format!("cannot set [{index}] on a host node"))
                .into()),
        }
    }

    fn delete(&self, _key: &Key, _ctx: &mut Context) -> JsResult<bool> {
        Ok(false)
    }
}

#[derive(Trace, Finalize)]
struct NodeCaptures {
    #[unsafe_ignore_trace]
    node: NodeRef,
}

fn get_attribute_function(node: NodeRef, ctx: &mut Context) -> JsValue {
    let function = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let name = args
                .get(0)
                .cloned()
                .unwrap_or_default()
                .to_string(ctx)?
                .to_std_string_escaped();
            match captures.node.attribute(&name) {
                Some(value) => Ok(JsValue::from(JsString::from(value.as_str()))),
                None => Ok(JsValue::null()),
            }
        },
        NodeCaptures { node },
    );

    let func = FunctionObjectBuilder::new(ctx.realm(), function)
        .name(js_string!("getAttribute"))
        .length(1)
        .build();
    JsValue::from(func)
}

#[derive(Trace, Finalize)]
struct ContainsCaptures {
    #[unsafe_ignore_trace]
    node: NodeRef,
    #[unsafe_ignore_trace]
    hook: WrapHook,
}

fn contains_function(node: NodeRef, hook: WrapHook, ctx: &mut Context) -> JsValue {
    let function = NativeFunction::from_copy_closure_with_captures(
        |_this, args, captures, ctx| {
            let other = args.get(0).cloned().unwrap_or_default();
            let contained = match resolve_node(&other, &captures.hook, ctx)? {
                Some(other) => captures.node.contains(&other),
                None => false,
            };
            Ok(JsValue::from(contained))
        },
        ContainsCaptures { node, hook },
    );

    let func = FunctionObjectBuilder::new(ctx.realm(), function)
        .name(js_string!("contains"))
        .length(1)
        .build();
    JsValue::from(func)
}
