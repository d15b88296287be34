//! Host document tree.
//!
//! This is the host-side data model the bridge operates on: a mutable,
//! handle-based tree of document/element/text/comment/fragment nodes.
//! Parsing and serialization delegate to `quick-xml` event streams; the
//! tree itself stays engine-agnostic. Handles are cheap `Rc` clones, so
//! the caller keeps ownership of the tree and the bridge shares it.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

use quick_xml::events::Event;
use quick_xml::Reader;

/// Process-wide node id counter. Ids are never reused, which is what lets
/// wrappers and the selector script agree on node identity.
static NEXT_UID: AtomicU64 = AtomicU64::new(1);

/// Node kinds in the host tree
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// The document node itself
    Document,
    /// An element node, possibly attribute-bearing
    Element,
    /// A text node
    Text,
    /// A comment node
    Comment,
    /// A detached fragment: a node that is itself list-like
    Fragment,
}

impl NodeKind {
    /// The numeric node type exposed to the engine (DOM-compatible)
    pub fn node_type(self) -> u32 {
        match self {
            NodeKind::Element => 1,
            NodeKind::Text => 3,
            NodeKind::Comment => 8,
            NodeKind::Document => 9,
            NodeKind::Fragment => 11,
        }
    }
}

/// A single name/value attribute entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrEntry {
    /// Attribute name
    pub name: String,
    /// Attribute value
    pub value: String,
}

/// A diagnostic recorded while leniently parsing markup
#[derive(Debug, Clone)]
pub struct ParseDiagnostic {
    /// What was recovered from
    pub message: String,
    /// Approximate byte offset into the input
    pub byte_offset: usize,
}

/// Parse errors for whole documents
#[derive(Debug, thiserror::Error)]
pub enum DomError {
    /// The tokenizer failed and no recovery was possible
    #[error("markup parse error at byte {byte_offset}: {message}")]
    Parse {
        /// Tokenizer message
        message: String,
        /// Byte offset into the input
        byte_offset: usize,
    },

    /// The input contained no document element
    #[error("document has no root element")]
    NoRootElement,
}

struct NodeData {
    uid: u64,
    kind: NodeKind,
    name: String,
    value: RefCell<String>,
    attrs: RefCell<Vec<AttrEntry>>,
    children: RefCell<Vec<NodeRef>>,
    parent: RefCell<Weak<NodeData>>,
}

/// A cheap handle to a node in the host tree. Identity is handle identity:
/// two `NodeRef`s are equal iff they point at the same node.
#[derive(Clone)]
pub struct NodeRef(Rc<NodeData>);

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for NodeRef {}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeRef")
            .field("kind", &self.0.kind)
            .field("name", &self.0.name)
            .field("uid", &self.0.uid)
            .finish()
    }
}

impl NodeRef {
    fn new(kind: NodeKind, name: &str, value: &str) -> Self {
        NodeRef(Rc::new(NodeData {
            uid: NEXT_UID.fetch_add(1, Ordering::Relaxed),
            kind,
            name: name.to_string(),
            value: RefCell::new(value.to_string()),
            attrs: RefCell::new(Vec::new()),
            children: RefCell::new(Vec::new()),
            parent: RefCell::new(Weak::new()),
        }))
    }

    /// Create a detached element node
    pub fn new_element(name: &str) -> Self {
        Self::new(NodeKind::Element, name, "")
    }

    /// Create a detached text node
    pub fn new_text(text: &str) -> Self {
        Self::new(NodeKind::Text, "#text", text)
    }

    /// Create a detached comment node
    pub fn new_comment(text: &str) -> Self {
        Self::new(NodeKind::Comment, "#comment", text)
    }

    /// Create a detached, list-like fragment node
    pub fn new_fragment() -> Self {
        Self::new(NodeKind::Fragment, "#fragment", "")
    }

    fn new_document() -> Self {
        Self::new(NodeKind::Document, "#document", "")
    }

    /// Process-unique node id
    pub fn uid(&self) -> u64 {
        self.0.uid
    }

    /// Node kind
    pub fn kind(&self) -> NodeKind {
        self.0.kind
    }

    /// Whether this is an element node
    pub fn is_element(&self) -> bool {
        self.0.kind == NodeKind::Element
    }

    /// Whether this is the document node
    pub fn is_document(&self) -> bool {
        self.0.kind == NodeKind::Document
    }

    /// Node name (`#text`, `#comment`, `#document`, `#fragment`, or the
    /// element tag name)
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Text content of text/comment nodes; empty for the rest
    pub fn node_value(&self) -> String {
        self.0.value.borrow().clone()
    }

    /// DOM-compatible numeric node type
    pub fn node_type(&self) -> u32 {
        self.0.kind.node_type()
    }

    /// Look up an attribute by name
    pub fn attribute(&self, name: &str) -> Option<String> {
        self.0
            .attrs
            .borrow()
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.clone())
    }

    /// Set (or replace) an attribute
    pub fn set_attribute(&self, name: &str, value: &str) {
        let mut attrs = self.0.attrs.borrow_mut();
        if let Some(existing) = attrs.iter_mut().find(|a| a.name == name) {
            existing.value = value.to_string();
            return;
        }
        attrs.push(AttrEntry {
            name: name.to_string(),
            value: value.to_string(),
        });
    }

    /// Snapshot of the attribute entries, in insertion order
    pub fn attribute_entries(&self) -> Vec<AttrEntry> {
        self.0.attrs.borrow().clone()
    }

    /// Number of attributes
    pub fn attribute_count(&self) -> usize {
        self.0.attrs.borrow().len()
    }

    /// Whitespace-separated tokens of the `class` attribute
    pub fn class_list(&self) -> Vec<String> {
        self.attribute("class")
            .map(|v| v.split_whitespace().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Snapshot of the child nodes
    pub fn children(&self) -> Vec<NodeRef> {
        self.0.children.borrow().clone()
    }

    /// Number of children
    pub fn child_count(&self) -> usize {
        self.0.children.borrow().len()
    }

    /// Parent node, if attached
    pub fn parent(&self) -> Option<NodeRef> {
        self.0.parent.borrow().upgrade().map(NodeRef)
    }

    /// The document node this node is attached under, if any
    pub fn owner_document(&self) -> Option<NodeRef> {
        let mut cursor = self.parent();
        while let Some(node) = cursor {
            if node.is_document() {
                return Some(node);
            }
            cursor = node.parent();
        }
        None
    }

    /// Append a child, detaching it from any previous parent
    pub fn append_child(&self, child: &NodeRef) {
        if let Some(old_parent) = child.parent() {
            old_parent.remove_child(child);
        }
        *child.0.parent.borrow_mut() = Rc::downgrade(&self.0);
        self.0.children.borrow_mut().push(child.clone());
    }

    fn remove_child(&self, child: &NodeRef) {
        self.0
            .children
            .borrow_mut()
            .retain(|c| !Rc::ptr_eq(&c.0, &child.0));
        *child.0.parent.borrow_mut() = Weak::new();
    }

    /// Replace all children with the given nodes (wholesale replacement)
    pub fn replace_children(&self, new_children: Vec<NodeRef>) {
        for old in self.0.children.borrow().iter() {
            *old.0.parent.borrow_mut() = Weak::new();
        }
        self.0.children.borrow_mut().clear();
        for child in new_children {
            self.append_child(&child);
        }
    }

    /// Strict-descendant check: true iff `other` is below this node.
    /// Non-reflexive; false for siblings and ancestors.
    pub fn contains(&self, other: &NodeRef) -> bool {
        let mut cursor = other.parent();
        while let Some(node) = cursor {
            if node == *self {
                return true;
            }
            cursor = node.parent();
        }
        false
    }

    /// The node's own item list, for node kinds that are themselves
    /// list-like. Only fragments qualify.
    pub fn item_list(&self) -> Option<Vec<NodeRef>> {
        if self.0.kind == NodeKind::Fragment {
            Some(self.children())
        } else {
            None
        }
    }

    /// Element descendants in document order, excluding this node
    pub fn descendant_elements(&self) -> Vec<NodeRef> {
        let mut out = Vec::new();
        fn walk(node: &NodeRef, out: &mut Vec<NodeRef>) {
            for child in node.children() {
                if child.is_element() {
                    out.push(child.clone());
                }
                walk(&child, out);
            }
        }
        walk(self, &mut out);
        out
    }

    /// Find a node by uid anywhere in this subtree (including self)
    pub fn find_by_uid(&self, uid: u64) -> Option<NodeRef> {
        if self.uid() == uid {
            return Some(self.clone());
        }
        for child in self.children() {
            if let Some(found) = child.find_by_uid(uid) {
                return Some(found);
            }
        }
        None
    }

    /// Concatenated text content of the subtree, in document order
    pub fn text_content(&self) -> String {
        match self.0.kind {
            NodeKind::Text => self.node_value(),
            NodeKind::Comment => String::new(),
            _ => {
                let mut out = String::new();
                for child in self.children() {
                    out.push_str(&child.text_content());
                }
                out
            }
        }
    }

    /// Deep clone that preserves structure, names, and text, but drops
    /// attributes. Used for subtree serialization; the attribute loss is a
    /// documented limitation of that operation.
    pub fn clone_structure(&self) -> NodeRef {
        let clone = NodeRef::new(self.0.kind, &self.0.name, &self.0.value.borrow());
        for child in self.children() {
            clone.append_child(&child.clone_structure());
        }
        clone
    }

    /// Deep clone that keeps attributes, assigning fresh uids. Used to
    /// import parsed fragment children into a target tree.
    pub fn clone_imported(&self) -> NodeRef {
        let clone = NodeRef::new(self.0.kind, &self.0.name, &self.0.value.borrow());
        *clone.0.attrs.borrow_mut() = self.attribute_entries();
        for child in self.children() {
            clone.append_child(&child.clone_imported());
        }
        clone
    }

    /// Serialize this subtree to markup. For fragments and documents this
    /// is the concatenation of the serialized children.
    pub fn serialize(&self) -> String {
        let mut out = String::new();
        serialize_node(self, &mut out);
        out
    }
}

fn serialize_node(node: &NodeRef, out: &mut String) {
    match node.kind() {
        NodeKind::Text => out.push_str(&quick_xml::escape::escape(&node.node_value())),
        NodeKind::Comment => {
            out.push_str("<!--");
            out.push_str(&node.node_value());
            out.push_str("-->");
        }
        NodeKind::Document | NodeKind::Fragment => {
            for child in node.children() {
                serialize_node(&child, out);
            }
        }
        NodeKind::Element => {
            out.push('<');
            out.push_str(node.name());
            for attr in node.attribute_entries() {
                out.push(' ');
                out.push_str(&attr.name);
                out.push_str("=\"");
                out.push_str(&quick_xml::escape::escape(&attr.value));
                out.push('"');
            }
            let children = node.children();
            if children.is_empty() {
                out.push_str("/>");
            } else {
                out.push('>');
                for child in children {
                    serialize_node(&child, out);
                }
                out.push_str("</");
                out.push_str(node.name());
                out.push('>');
            }
        }
    }
}

/// An in-memory document: the document node plus the diagnostics its parse
/// recorded. Cloning shares the tree; it never deep-copies.
#[derive(Clone)]
pub struct Document {
    root: NodeRef,
    diagnostics: Rc<Vec<ParseDiagnostic>>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("root", &self.root)
            .field("diagnostics", &self.diagnostics.len())
            .finish()
    }
}

impl Document {
    /// Parse markup into a document. Recoverable oddities (mismatched end
    /// tags, unclosed elements, undecodable text) are repaired and recorded
    /// as diagnostics; hard tokenizer failures are errors.
    pub fn parse(markup: &str) -> Result<Document, DomError> {
        let root = NodeRef::new_document();
        let mut diagnostics = Vec::new();
        build_tree(markup, &root, &mut diagnostics)?;

        if !root.children().iter().any(NodeRef::is_element) {
            return Err(DomError::NoRootElement);
        }

        tracing::debug!(
            diagnostics = diagnostics.len(),
            "parsed document"
        );

        Ok(Document {
            root,
            diagnostics: Rc::new(diagnostics),
        })
    }

    /// The document node
    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    /// The document element (first element child of the document node)
    pub fn document_element(&self) -> Option<NodeRef> {
        self.root.children().into_iter().find(NodeRef::is_element)
    }

    /// Diagnostics recorded while parsing
    pub fn diagnostics(&self) -> Rc<Vec<ParseDiagnostic>> {
        Rc::clone(&self.diagnostics)
    }

    /// Serialize the whole document back to markup
    pub fn serialize(&self) -> String {
        self.root.serialize()
    }
}

/// Parse markup into a detached fragment. Never fails: a hard tokenizer
/// failure keeps the unconsumed remainder as a text node and records a
/// diagnostic. Misuse with unbalanced markup yields accordingly malformed
/// (but structurally valid) results.
pub fn parse_fragment(markup: &str) -> (NodeRef, Vec<ParseDiagnostic>) {
    let fragment = NodeRef::new_fragment();
    let mut diagnostics = Vec::new();
    let wrapped = format!("<root>{markup}</root>");

    // A hard tokenizer failure becomes a diagnostic plus a raw-text tail.
    if let Err(DomError::Parse {
        message,
        byte_offset,
    }) = build_tree(&wrapped, &fragment, &mut diagnostics)
    {
        diagnostics.push(ParseDiagnostic {
            message,
            byte_offset,
        });
        let rest = &wrapped[byte_offset.min(wrapped.len())..];
        let rest = rest.strip_suffix("</root>").unwrap_or(rest);
        if !rest.is_empty() {
            fragment.append_child(&NodeRef::new_text(rest));
        }
    }

    // Unwrap the synthetic root: its children become the fragment's.
    if let Some(synthetic) = fragment
        .children()
        .into_iter()
        .find(|c| c.is_element() && c.name() == "root")
    {
        let mut lifted = Vec::new();
        let mut replaced = false;
        for child in fragment.children() {
            if child == synthetic && !replaced {
                lifted.extend(synthetic.children());
                replaced = true;
            } else {
                lifted.push(child);
            }
        }
        fragment.replace_children(lifted);
    }

    (fragment, diagnostics)
}

/// Event-driven tree construction shared by document and fragment parsing.
/// Hard tokenizer errors propagate to the caller; documents treat them as
/// fatal, fragments recover from them.
fn build_tree(
    markup: &str,
    parent: &NodeRef,
    diagnostics: &mut Vec<ParseDiagnostic>,
) -> Result<(), DomError> {
    let mut reader = Reader::from_str(markup);
    let mut stack: Vec<NodeRef> = vec![parent.clone()];

    loop {
        let position = reader.buffer_position();
        match reader.read_event() {
            Ok(Event::Start(start)) => {
                let element = element_from_start(&start, diagnostics, position);
                let top = stack.last().cloned().unwrap_or_else(|| parent.clone());
                top.append_child(&element);
                stack.push(element);
            }
            Ok(Event::Empty(start)) => {
                let element = element_from_start(&start, diagnostics, position);
                let top = stack.last().cloned().unwrap_or_else(|| parent.clone());
                top.append_child(&element);
            }
            Ok(Event::End(end)) => {
                let name = String::from_utf8_lossy(end.name().as_ref()).into_owned();
                close_element(&name, &mut stack, diagnostics, position);
            }
            Ok(Event::Text(text)) => {
                let content = match text.unescape() {
                    Ok(c) => c.into_owned(),
                    Err(e) => {
                        diagnostics.push(ParseDiagnostic {
                            message: format!("kept undecodable text raw: {e}"),
                            byte_offset: position,
                        });
                        String::from_utf8_lossy(text.as_ref()).into_owned()
                    }
                };
                if !content.is_empty() {
                    let top = stack.last().cloned().unwrap_or_else(|| parent.clone());
                    top.append_child(&NodeRef::new_text(&content));
                }
            }
            Ok(Event::CData(cdata)) => {
                let content = String::from_utf8_lossy(&cdata.into_inner()).into_owned();
                let top = stack.last().cloned().unwrap_or_else(|| parent.clone());
                top.append_child(&NodeRef::new_text(&content));
            }
            Ok(Event::Comment(text)) => {
                let content = String::from_utf8_lossy(text.as_ref()).into_owned();
                let top = stack.last().cloned().unwrap_or_else(|| parent.clone());
                top.append_child(&NodeRef::new_comment(&content));
            }
            Ok(Event::Decl(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) => {}
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(DomError::Parse {
                    message: e.to_string(),
                    byte_offset: position,
                });
            }
        }
    }

    if stack.len() > 1 {
        diagnostics.push(ParseDiagnostic {
            message: format!("auto-closed {} unclosed element(s) at end of input", stack.len() - 1),
            byte_offset: reader.buffer_position(),
        });
    }

    Ok(())
}

fn element_from_start(
    start: &quick_xml::events::BytesStart<'_>,
    diagnostics: &mut Vec<ParseDiagnostic>,
    position: usize,
) -> NodeRef {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let element = NodeRef::new_element(&name);

    for attr in start.attributes() {
        match attr {
            Ok(attr) => {
                let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                let value = match attr.unescape_value() {
                    Ok(v) => v.into_owned(),
                    Err(e) => {
                        diagnostics.push(ParseDiagnostic {
                            message: format!("kept undecodable attribute value raw: {e}"),
                            byte_offset: position,
                        });
                        String::from_utf8_lossy(&attr.value).into_owned()
                    }
                };
                element.set_attribute(&key, &value);
            }
            Err(e) => {
                diagnostics.push(ParseDiagnostic {
                    message: format!("dropped malformed attribute: {e}"),
                    byte_offset: position,
                });
            }
        }
    }

    element
}

fn close_element(
    name: &str,
    stack: &mut Vec<NodeRef>,
    diagnostics: &mut Vec<ParseDiagnostic>,
    position: usize,
) {
    // The bottom entry is the parse root and must survive recovery.
    let matching = stack
        .iter()
        .skip(1)
        .rposition(|n| n.name() == name)
        .map(|i| i + 1);

    match matching {
        Some(index) => {
            if index != stack.len() - 1 {
                diagnostics.push(ParseDiagnostic {
                    message: format!(
                        "auto-closed {} element(s) at mismatched </{}>",
                        stack.len() - 1 - index,
                        name
                    ),
                    byte_offset: position,
                });
            }
            stack.truncate(index);
        }
        None => {
            diagnostics.push(ParseDiagnostic {
                message: format!("dropped stray </{name}>"),
                byte_offset: position,
            });
        }
    }
}
