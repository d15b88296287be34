//! The public query facade.
//!
//! `DomQuery` composes the engine host, the wrap factory stack, the
//! pseudo-selector registry, and the boundary metrics into the
//! single-threaded public surface. Every public operation opens one fresh
//! scoped session, runs to completion on the calling thread, and adapts
//! the engine's result back to host types.

use std::rc::Rc;
use std::time::Instant;

use boa_engine::{JsObject, JsString, JsValue};
use tracing::{debug, info};

use crate::config::BridgeConfig;
use crate::dom::{Document, NodeRef};
use crate::engine::{EngineHost, ScopedSession};
use crate::error::{BridgeError, Result};
use crate::metrics::{BoundaryMetrics, BoundarySnapshot};
use crate::pseudo::{self, Pseudo, PseudoRegistry};
use crate::wrap::HostValue;

/// Selector queries over one document, delegated to the embedded selector
/// engine. Single-threaded by design: the embedded context is
/// thread-affine, and a facade must not be shared across threads.
pub struct DomQuery {
    engine: EngineHost,
    document: Document,
    pseudos: PseudoRegistry,
    metrics: Rc<BoundaryMetrics>,
    config: BridgeConfig,
}

impl DomQuery {
    /// Build a facade over `document` with configuration taken from the
    /// environment.
    pub fn new(document: &Document) -> Result<Self> {
        Self::with_config(document, BridgeConfig::from_env())
    }

    /// Build a facade over `document` with an explicit configuration.
    /// Construction failures are fatal: no partial facade is returned.
    pub fn with_config(document: &Document, config: BridgeConfig) -> Result<Self> {
        config.validate()?;
        let metrics = Rc::new(BoundaryMetrics::new());
        let engine = EngineHost::new(document, &config, Rc::clone(&metrics))?;

        Ok(Self {
            engine,
            document: document.clone(),
            pseudos: PseudoRegistry::new(),
            metrics,
            config,
        })
    }

    /// The document this facade queries
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Select every element of the document matching `selector`, in
    /// document order.
    pub fn select(&self, selector: &str) -> Result<Vec<NodeRef>> {
        self.run_select(selector, None)
    }

    /// Select every element below `context` matching `selector`, in
    /// document order.
    pub fn select_in(&self, selector: &str, context: &NodeRef) -> Result<Vec<NodeRef>> {
        self.run_select(selector, Some(context))
    }

    fn run_select(&self, selector: &str, context: Option<&NodeRef>) -> Result<Vec<NodeRef>> {
        self.check_selector(selector)?;
        let started = Instant::now();
        let mut session = self.engine.session()?;

        let mut args = vec![JsValue::from(JsString::from(selector))];
        if let Some(context) = context {
            args.push(session.wrap(HostValue::Node(context.clone()))?);
        }

        let handle = self.engine.handle().clone();
        let result = handle.call(&JsValue::undefined(), &args, session.context())?;
        let nodes = self.extract_elements(&result, &mut session)?;

        self.metrics.record_query(started.elapsed());
        debug!(selector, matched = nodes.len(), "select completed");
        Ok(nodes)
    }

    /// Whether `node` matches `selector`. The node must be an element.
    pub fn matches_selector(&self, node: &NodeRef, selector: &str) -> Result<bool> {
        self.check_selector(selector)?;
        if !node.is_element() {
            return Err(BridgeError::adaptation(
                "matchesSelector expects an element node",
            ));
        }
        let started = Instant::now();
        let mut session = self.engine.session()?;

        let method = self.engine_method("matchesSelector", &mut session)?;
        let wrapped = session.wrap(HostValue::Node(node.clone()))?;
        let this = JsValue::from(self.engine.handle().clone());
        let result = method.call(
            &this,
            &[wrapped, JsValue::from(JsString::from(selector))],
            session.context(),
        )?;

        self.metrics.record_query(started.elapsed());
        Ok(result.to_boolean())
    }

    /// Filter `nodes` down to those matching `selector`, preserving input
    /// order.
    pub fn matches(&self, selector: &str, nodes: &[NodeRef]) -> Result<Vec<NodeRef>> {
        self.check_selector(selector)?;
        let started = Instant::now();
        let mut session = self.engine.session()?;

        let method = self.engine_method("matches", &mut session)?;
        let collection = session.wrap(HostValue::NodeList(Rc::new(nodes.to_vec())))?;
        let this = JsValue::from(self.engine.handle().clone());
        let result = method.call(
            &this,
            &[JsValue::from(JsString::from(selector)), collection],
            session.context(),
        )?;
        let matched = self.extract_elements(&result, &mut session)?;

        self.metrics.record_query(started.elapsed());
        Ok(matched)
    }

    /// Whether `child` is a strict descendant of `parent`
    pub fn contains(&self, parent: &NodeRef, child: &NodeRef) -> Result<bool> {
        let started = Instant::now();
        let mut session = self.engine.session()?;

        let method = self.engine_method("contains", &mut session)?;
        let parent = session.wrap(HostValue::Node(parent.clone()))?;
        let child = session.wrap(HostValue::Node(child.clone()))?;
        let this = JsValue::from(self.engine.handle().clone());
        let result = method.call(&this, &[parent, child], session.context())?;

        self.metrics.record_query(started.elapsed());
        Ok(result.to_boolean())
    }

    /// Concatenated text content of a node's subtree
    pub fn get_text(&self, node: &NodeRef) -> Result<String> {
        let started = Instant::now();
        let mut session = self.engine.session()?;
        let text = self.get_text_in(node, &mut session)?;
        self.metrics.record_query(started.elapsed());
        Ok(text)
    }

    /// Ordered concatenation of the text of each node in `nodes`.
    ///
    /// The engine is asked per node rather than being handed a host array,
    /// which keeps each node's wrapping independent of array reflection.
    pub fn get_text_all(&self, nodes: &[NodeRef]) -> Result<String> {
        let started = Instant::now();
        let mut session = self.engine.session()?;
        let mut out = String::new();
        for node in nodes {
            out.push_str(&self.get_text_in(node, &mut session)?);
        }
        self.metrics.record_query(started.elapsed());
        Ok(out)
    }

    fn get_text_in(&self, node: &NodeRef, session: &mut ScopedSession<'_>) -> Result<String> {
        let method = self.engine_method("getText", session)?;
        let wrapped = session.wrap(HostValue::Node(node.clone()))?;
        let this = JsValue::from(self.engine.handle().clone());
        let result = method.call(&this, &[wrapped], session.context())?;
        Ok(result.to_string(session.context())?.to_std_string_escaped())
    }

    /// The value of `name` on `node`, as the selector engine reports it.
    /// Absent attributes read as the empty string.
    pub fn attr(&self, node: &NodeRef, name: &str) -> Result<String> {
        let started = Instant::now();
        let mut session = self.engine.session()?;

        let method = self.engine_method("attr", &mut session)?;
        let wrapped = session.wrap(HostValue::Node(node.clone()))?;
        let this = JsValue::from(self.engine.handle().clone());
        let result = method.call(
            &this,
            &[wrapped, JsValue::from(JsString::from(name))],
            session.context(),
        )?;

        self.metrics.record_query(started.elapsed());
        if result.is_null() || result.is_undefined() {
            return Ok(String::new());
        }
        Ok(result.to_string(session.context())?.to_std_string_escaped())
    }

    /// Register a user-defined pseudo-selector under `name`. Immediately
    /// visible to subsequent queries; re-registering a name overwrites the
    /// previous adapter.
    pub fn create_pseudo(&mut self, name: &str, predicate: impl Pseudo + 'static) -> Result<()> {
        let predicate: Rc<dyn Pseudo> = Rc::new(predicate);
        {
            let mut session = self.engine.session()?;

            let factory = pseudo::build_factory(
                Rc::clone(&predicate),
                self.engine.hook().clone(),
                session.context(),
            );

            let selectors = self
                .engine
                .handle()
                .get(JsString::from("selectors"), session.context())?;
            let selectors = selectors.as_object().cloned().ok_or_else(|| {
                BridgeError::engine("selector engine has no 'selectors' surface")
            })?;

            let create = selectors.get(JsString::from("createPseudo"), session.context())?;
            let create = create
                .as_object()
                .filter(|o| o.is_callable())
                .cloned()
                .ok_or_else(|| {
                    BridgeError::engine("selector engine is missing 'selectors.createPseudo'")
                })?;

            let registered = create.call(
                &JsValue::from(selectors.clone()),
                &[JsValue::from(factory)],
                session.context(),
            )?;

            let pseudos = selectors.get(JsString::from("pseudos"), session.context())?;
            let pseudos = pseudos.as_object().cloned().ok_or_else(|| {
                BridgeError::engine("selector engine has no 'selectors.pseudos' map")
            })?;
            pseudos.set(
                JsString::from(name),
                registered,
                false,
                session.context(),
            )?;
        }

        self.pseudos.insert(name, predicate);
        info!(name, "registered pseudo-selector");
        Ok(())
    }

    /// Whether `name` has been registered on this facade
    pub fn has_pseudo(&self, name: &str) -> bool {
        self.pseudos.contains(name)
    }

    /// Snapshot of the boundary metrics
    pub fn metrics(&self) -> BoundarySnapshot {
        self.metrics.snapshot()
    }

    fn check_selector(&self, selector: &str) -> Result<()> {
        if selector.len() > self.config.max_selector_len {
            return Err(BridgeError::engine(format!(
                "selector exceeds the configured maximum length of {}",
                self.config.max_selector_len
            )));
        }
        Ok(())
    }

    fn engine_method(
        &self,
        name: &str,
        session: &mut ScopedSession<'_>,
    ) -> Result<JsObject> {
        let value = self
            .engine
            .handle()
            .get(JsString::from(name), session.context())?;
        value
            .as_object()
            .filter(|o| o.is_callable())
            .cloned()
            .ok_or_else(|| {
                BridgeError::engine(format!("selector engine is missing operation '{name}'"))
            })
    }

    /// Adapt an engine result collection back to host element nodes.
    /// Anything that is not an element wrapped during this facade's
    /// lifetime is a type-adaptation failure, never a silent coercion.
    fn extract_elements(
        &self,
        value: &JsValue,
        session: &mut ScopedSession<'_>,
    ) -> Result<Vec<NodeRef>> {
        let collection = value.as_object().cloned().ok_or_else(|| {
            BridgeError::adaptation("selector engine returned a non-collection result")
        })?;
        let length = collection
            .get(JsString::from("length"), session.context())?
            .to_u32(session.context())?;

        let mut out = Vec::with_capacity(length as usize);
        for index in 0..length {
            let item = collection.get(index, session.context())?;
            out.push(self.resolve_element(&item, session)?);
        }
        Ok(out)
    }

    fn resolve_element(
        &self,
        item: &JsValue,
        session: &mut ScopedSession<'_>,
    ) -> Result<NodeRef> {
        let object = item.as_object().cloned().ok_or_else(|| {
            BridgeError::adaptation("non-node value in an element collection")
        })?;
        let id = object.get(JsString::from("__nodeId"), session.context())?;
        let uid = id.as_number().filter(|n| n.is_finite() && *n >= 0.0).ok_or_else(|| {
            BridgeError::adaptation("engine object is not a host node wrapper")
        })? as u64;

        let node = session
            .factory()
            .lookup_node(uid)
            .or_else(|| self.document.root().find_by_uid(uid))
            .ok_or_else(|| {
                BridgeError::adaptation(format!("no host node with id {uid} is attached"))
            })?;

        if !node.is_element() {
            return Err(BridgeError::adaptation(
                "non-element node in an element collection",
            ));
        }
        Ok(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse(
            "<html><head class=\"toplevel\"><title>Testing 1 2 3</title></head>\
             <body class=\"toplevel\"><p id=\"hello\">Hello, world!</p>\
             <p id=\"goodbye\">Goodbye, world!</p></body></html>",
        )
        .unwrap()
    }

    fn names(nodes: &[NodeRef]) -> Vec<String> {
        nodes.iter().map(|n| n.name().to_string()).collect()
    }

    #[test]
    fn test_select_by_tag() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let found = query.select("p").unwrap();
        assert_eq!(names(&found), vec!["p", "p"]);
        assert_eq!(found[0].attribute("id").as_deref(), Some("hello"));
        assert_eq!(found[1].attribute("id").as_deref(), Some("goodbye"));
    }

    #[test]
    fn test_select_universal_in_document_order() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let found = query.select("*").unwrap();
        assert_eq!(names(&found), vec!["html", "head", "title", "body", "p", "p"]);
    }

    #[test]
    fn test_select_by_class_word_match() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let found = query.select("[class~=toplevel]").unwrap();
        assert_eq!(names(&found), vec!["head", "body"]);
    }

    #[test]
    fn test_select_by_id_and_descendant() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();

        let found = query.select("#goodbye").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute("id").as_deref(), Some("goodbye"));

        let nested = query.select("body p").unwrap();
        assert_eq!(nested.len(), 2);

        let child = query.select("html > body > p#hello").unwrap();
        assert_eq!(child.len(), 1);

        let sibling = query.select("p#hello + p").unwrap();
        assert_eq!(sibling.len(), 1);
        assert_eq!(sibling[0].attribute("id").as_deref(), Some("goodbye"));
    }

    #[test]
    fn test_select_not_root_excludes_root_only() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let found = query.select(":not(:root)").unwrap();
        assert_eq!(names(&found), vec!["head", "title", "body", "p", "p"]);
    }

    #[test]
    fn test_select_in_context() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let body = query.select("body").unwrap().remove(0);
        let found = query.select_in("*", &body).unwrap();
        assert_eq!(names(&found), vec!["p", "p"]);
    }

    #[test]
    fn test_matches_selector_agrees_with_select() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let selected = query.select("p").unwrap();
        for node in &selected {
            assert!(query.matches_selector(node, "p").unwrap());
        }
        for node in &query.select(":not(p)").unwrap() {
            assert!(!query.matches_selector(node, "p").unwrap());
        }
    }

    #[test]
    fn test_matches_selector_rejects_non_elements() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let result = query.matches_selector(doc.root(), "p");
        assert!(matches!(result, Err(BridgeError::TypeAdaptation(_))));
    }

    #[test]
    fn test_matches_filters_collection() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let all = query.select("*").unwrap();
        let matched = query.matches("p", &all).unwrap();
        assert_eq!(names(&matched), vec!["p", "p"]);
    }

    #[test]
    fn test_contains() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let body = query.select("body").unwrap().remove(0);
        let hello = query.select("#hello").unwrap().remove(0);
        let head = query.select("head").unwrap().remove(0);

        assert!(query.contains(&body, &hello).unwrap());
        assert!(!query.contains(&hello, &body).unwrap());
        assert!(!query.contains(&body, &body).unwrap());
        assert!(!query.contains(&head, &hello).unwrap());
    }

    #[test]
    fn test_get_text() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let body = query.select("body").unwrap().remove(0);
        assert_eq!(query.get_text(&body).unwrap(), "Hello, world!Goodbye, world!");

        let paragraphs = query.select("p").unwrap();
        assert_eq!(
            query.get_text_all(&paragraphs).unwrap(),
            "Hello, world!Goodbye, world!"
        );
    }

    #[test]
    fn test_attr() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        let paragraphs = query.select("p").unwrap();
        assert_eq!(query.attr(&paragraphs[1], "id").unwrap(), "goodbye");
        assert_eq!(query.attr(&paragraphs[0], "missing").unwrap(), "");
    }

    #[test]
    fn test_create_pseudo_with_argument() {
        let doc = sample();
        let mut query = DomQuery::new(&doc).unwrap();
        assert!(!query.has_pseudo("attr-is"));

        query
            .create_pseudo("attr-is", |element: &NodeRef, arg: Option<&str>| {
                match arg.and_then(|pair| pair.split_once('=')) {
                    Some((name, value)) => element.attribute(name).as_deref() == Some(value),
                    None => false,
                }
            })
            .unwrap();
        assert!(query.has_pseudo("attr-is"));

        let found = query.select(":attr-is(id=goodbye)").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].attribute("id").as_deref(), Some("goodbye"));
    }

    #[test]
    fn test_create_pseudo_without_argument_sees_none() {
        let doc = sample();
        let mut query = DomQuery::new(&doc).unwrap();
        query
            .create_pseudo("argless", |_: &NodeRef, arg: Option<&str>| arg.is_none())
            .unwrap();

        let found = query.select("p:argless").unwrap();
        assert_eq!(found.len(), 2);

        let none = query.select("p:argless(x)").unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_create_pseudo_overwrites() {
        let doc = sample();
        let mut query = DomQuery::new(&doc).unwrap();
        query
            .create_pseudo("flip", |_: &NodeRef, _: Option<&str>| true)
            .unwrap();
        assert_eq!(query.select("p:flip").unwrap().len(), 2);

        query
            .create_pseudo("flip", |_: &NodeRef, _: Option<&str>| false)
            .unwrap();
        assert!(query.select("p:flip").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_selector_is_engine_error() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        assert!(matches!(
            query.select("p["),
            Err(BridgeError::Engine(_))
        ));
        assert!(matches!(
            query.select(":unknown-pseudo"),
            Err(BridgeError::Engine(_))
        ));
    }

    #[test]
    fn test_selector_length_limit() {
        let doc = sample();
        let query = DomQuery::with_config(
            &doc,
            BridgeConfig::default().with_max_selector_len(4),
        )
        .unwrap();
        assert!(query.select("p").is_ok());
        assert!(query.select("p.too-long").is_err());
    }

    #[test]
    fn test_metrics_accumulate() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        query.select("p").unwrap();
        query.select("body").unwrap();
        let snapshot = query.metrics();
        assert_eq!(snapshot.queries, 2);
        assert!(snapshot.wraps > 0);
    }

    #[test]
    fn test_instrumented_facade_behaves_identically() {
        let doc = sample();
        let plain = DomQuery::new(&doc).unwrap();
        let traced = DomQuery::with_config(
            &doc,
            BridgeConfig::default().with_trace_boundary(true),
        )
        .unwrap();

        let a = plain.select("[class~=toplevel]").unwrap();
        let b = traced.select("[class~=toplevel]").unwrap();
        assert_eq!(names(&a), names(&b));
        assert_eq!(
            plain.get_text(&a[1]).unwrap(),
            traced.get_text(&b[1]).unwrap()
        );
    }

    #[test]
    fn test_boundary_ops_only_recorded_when_instrumented() {
        let doc = sample();

        let plain = DomQuery::new(&doc).unwrap();
        plain.select("p").unwrap();
        // Without instrumentation no decorator sits on the boundary, so
        // no per-operation records exist; wrapping still happens.
        let snapshot = plain.metrics();
        assert_eq!(snapshot.gets, 0);
        assert!(snapshot.wraps > 0);

        let traced = DomQuery::with_config(
            &doc,
            BridgeConfig::default().with_trace_boundary(true),
        )
        .unwrap();
        traced.select("p").unwrap();
        assert!(traced.metrics().gets > 0);
    }

    #[test]
    fn test_session_restored_after_failure() {
        let doc = sample();
        let query = DomQuery::new(&doc).unwrap();
        assert!(query.select("p[").is_err());
        // The failed query released its session; the next one runs fine.
        assert_eq!(query.select("p").unwrap().len(), 2);
    }
}
