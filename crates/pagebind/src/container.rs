//! Container registry.
//!
//! A container is a node that owns an ordered map of sanitized element
//! identifiers to elements. Registration scopes the element within the
//! container; nested containers are additionally recorded so lookups can
//! descend into them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::dispatcher::Event;
use crate::element::Element;
use crate::locator::{is_blank, sanitize};
use crate::node::{Capabilities, Node};
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;

/// Storage shared by every handle to one container
#[derive(Debug)]
pub(crate) struct Registry {
    key: String,
    url: RefCell<Option<String>>,
    elements: RefCell<IndexMap<String, Element>>,
    nested: RefCell<Vec<Node>>,
    anchors: RefCell<Vec<Node>>,
}

impl Registry {
    pub(crate) fn new(key: String) -> Self {
        Self {
            key,
            url: RefCell::new(None),
            elements: RefCell::new(IndexMap::new()),
            nested: RefCell::new(Vec::new()),
            anchors: RefCell::new(Vec::new()),
        }
    }

    pub(crate) fn key(&self) -> &str {
        &self.key
    }

    pub(crate) fn url(&self) -> Option<String> {
        self.url.borrow().clone()
    }

    pub(crate) fn set_url(&self, url: Option<String>) {
        *self.url.borrow_mut() = url;
    }

    /// Alternate context nodes kept alive for this container's elements
    pub(crate) fn anchors(&self) -> Vec<Node> {
        self.anchors.borrow().clone()
    }

    pub(crate) fn anchor(&self, node: Node) {
        let mut anchors = self.anchors.borrow_mut();
        if !anchors.iter().any(|held| held.ptr_eq(&node)) {
            anchors.push(node);
        }
    }
}

/// Handle to a container node and its registry
#[derive(Clone)]
pub struct Container {
    node: Node,
    registry: Rc<Registry>,
}

impl Container {
    /// Create an empty container with a blank locator
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        let registry = Rc::new(Registry::new(key.into()));
        let node = Node::with_registry(String::new(), Rc::clone(&registry));
        Self { node, registry }
    }

    pub(crate) const fn from_parts(node: Node, registry: Rc<Registry>) -> Self {
        Self { node, registry }
    }

    /// The container's own node
    #[must_use]
    pub const fn node(&self) -> &Node {
        &self.node
    }

    /// Key of the definition this container was built from
    #[must_use]
    pub fn key(&self) -> &str {
        self.registry.key()
    }

    /// Name for messages: the declared name, else the key
    #[must_use]
    pub fn display_name(&self) -> String {
        self.node
            .name()
            .filter(|n| !is_blank(n))
            .unwrap_or_else(|| self.key().to_string())
    }

    /// Page url
    #[must_use]
    pub fn url(&self) -> Option<String> {
        self.registry.url()
    }

    /// Set the page url
    pub fn set_url(&self, url: Option<String>) {
        self.registry.set_url(url);
    }

    /// Register an element and scope it within this container
    pub fn add_element(&self, id: &str, element: impl Into<Element>) {
        self.register(id, element.into(), true);
    }

    /// Register several elements
    pub fn add_elements<I, S, E>(&self, elements: I)
    where
        I: IntoIterator<Item = (S, E)>,
        S: AsRef<str>,
        E: Into<Element>,
    {
        for (id, element) in elements {
            self.add_element(id.as_ref(), element);
        }
    }

    pub(crate) fn register(&self, id: &str, element: Element, set_context: bool) {
        if set_context {
            element.node().set_context(&self.node);
        }
        let key = sanitize(id);
        trace!(container = %self.key(), id = %key, "element registered");
        if let Some(previous) = self.registry.elements.borrow_mut().insert(key.clone(), element) {
            debug!(
                container = %self.key(),
                id = %key,
                replaced = %previous.node().display_name(),
                "element id reused"
            );
        }
    }

    /// Record a nested container for deep lookups
    pub fn add_nested_container(&self, container: &Container) {
        self.add_nested_node(container.node().clone());
    }

    fn add_nested_node(&self, node: Node) {
        let mut nested = self.registry.nested.borrow_mut();
        if !nested.iter().any(|n| n.ptr_eq(&node)) {
            nested.push(node);
        }
    }

    /// Element registered under `id`
    pub fn get_element(&self, id: &str) -> PagebindResult<Element> {
        self.find(&sanitize(id))
            .ok_or_else(|| PagebindError::UnknownIdentifier {
                container: self.display_name(),
                id: id.to_string(),
                known: self.element_ids(),
            })
    }

    /// Element registered under `id` here or, depth-first, in a nested container
    pub fn deep_get_element(&self, id: &str) -> PagebindResult<Element> {
        self.deep_find(&sanitize(id))
            .ok_or_else(|| PagebindError::UnknownIdentifier {
                container: self.display_name(),
                id: id.to_string(),
                known: self.element_ids(),
            })
    }

    fn find(&self, key: &str) -> Option<Element> {
        self.registry.elements.borrow().get(key).cloned()
    }

    fn deep_find(&self, key: &str) -> Option<Element> {
        if let Some(element) = self.find(key) {
            return Some(element);
        }
        self.nested_containers()
            .iter()
            .find_map(|nested| nested.deep_find(key))
    }

    /// Keep `context` alive for as long as this container.
    ///
    /// Nodes point at their context weakly; an alternate context taken from
    /// the session cache is owned here so it outlives [`Session::reset`].
    pub fn hold_context(&self, context: &Container) {
        self.registry.anchor(context.node().clone());
    }

    /// Registered identifiers in insertion order
    #[must_use]
    pub fn element_ids(&self) -> Vec<String> {
        self.registry.elements.borrow().keys().cloned().collect()
    }

    /// Snapshot of the registered elements in insertion order
    #[must_use]
    pub fn elements(&self) -> Vec<(String, Element)> {
        self.registry
            .elements
            .borrow()
            .iter()
            .map(|(k, e)| (k.clone(), e.clone()))
            .collect()
    }

    fn elements_with(&self, capability: Capabilities) -> Vec<(String, Element)> {
        self.elements()
            .into_iter()
            .filter(|(_, e)| e.capabilities().contains(capability))
            .collect()
    }

    /// Elements whose value can be changed
    #[must_use]
    pub fn editable_elements(&self) -> Vec<(String, Element)> {
        self.elements_with(Capabilities::EDIT)
    }

    /// Elements whose value can be read
    #[must_use]
    pub fn readable_elements(&self) -> Vec<(String, Element)> {
        self.elements_with(Capabilities::READ)
    }

    /// Nested containers in registration order
    #[must_use]
    pub fn nested_containers(&self) -> Vec<Container> {
        self.registry
            .nested
            .borrow()
            .iter()
            .filter_map(Node::as_container)
            .collect()
    }

    /// Number of registered elements
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry.elements.borrow().len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry.elements.borrow().is_empty()
    }

    /// Change the value of every editable element named in `values`.
    ///
    /// Keys are sanitized; keys without an editable element are ignored and
    /// editable elements without a key are left untouched. Elements are
    /// written in registration order.
    pub fn change_values<I, K, V>(&self, session: &Session, values: I) -> PagebindResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let wanted: HashMap<String, String> = values
            .into_iter()
            .map(|(k, v)| (sanitize(k.as_ref()), v.as_ref().to_string()))
            .collect();

        for (id, element) in self.editable_elements() {
            if let Some(value) = wanted.get(&id) {
                element.change_value(session, value)?;
            }
        }
        Ok(())
    }

    /// Read every readable element.
    ///
    /// Optional elements that are not displayed, or whose read fails, are left
    /// out of the result. Session loss always propagates.
    pub fn read_values(&self, session: &Session) -> PagebindResult<IndexMap<String, String>> {
        let wait = session.config().optional_wait;
        let mut values = IndexMap::new();

        for (id, element) in self.readable_elements() {
            if element.is_optional() {
                let displayed = match element.is_displayed(session, wait) {
                    Ok(displayed) => displayed,
                    Err(err) if err.is_session_lost() => return Err(err),
                    Err(err) => {
                        trace!(id = %id, error = %err, "optional display check failed");
                        false
                    }
                };
                if !displayed {
                    debug!(container = %self.key(), id = %id, "optional element absent, skipped");
                    continue;
                }
            }

            match element.read_value(session) {
                Ok(value) => {
                    let _ = values.insert(id, value);
                }
                Err(err) if element.is_optional() && !err.is_session_lost() => {
                    debug!(
                        container = %self.key(),
                        id = %id,
                        error = %err,
                        "optional element unreadable, skipped"
                    );
                }
                Err(err) => return Err(err),
            }
        }
        Ok(values)
    }

    /// Readable values serialized as a JSON object in registration order
    pub fn read_json(&self, session: &Session) -> PagebindResult<String> {
        Ok(serde_json::to_string(&self.read_values(session)?)?)
    }

    /// Change values from a JSON object; non-string values use their JSON text
    pub fn change_json(&self, session: &Session, json: &str) -> PagebindResult<()> {
        let parsed: IndexMap<String, serde_json::Value> =
            serde_json::from_str(json).map_err(|err| PagebindError::InvalidValue {
                element: self.display_name(),
                value: json.to_string(),
                message: err.to_string(),
            })?;
        let values = parsed.into_iter().map(|(k, v)| {
            let text = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, text)
        });
        self.change_values(session, values)
    }

    /// Whether the container is displayed.
    ///
    /// A container with its own locator asks the driver; a logical grouping
    /// is displayed when every non-optional child is.
    pub fn is_displayed(&self, session: &Session, wait: bool) -> PagebindResult<bool> {
        if !is_blank(&self.node.locator()) {
            let args = [wait.to_string()];
            return session
                .dispatcher()
                .dispatch(session, &self.node, Event::IsDisplayed, &args, || {
                    session.driver().is_element_displayed(&self.node, wait)
                });
        }

        for (_, element) in self.elements() {
            if element.is_optional() {
                continue;
            }
            if !element.is_displayed(session, wait)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Deep-clone every child into `target`, scoping copies within it
    pub(crate) fn clone_children_into(&self, target: &Container) {
        let nested = self.registry.nested.borrow().clone();

        for (id, element) in self.elements() {
            let copy = element.deep_clone();
            let scoped_here = element
                .node()
                .context()
                .is_some_and(|ctx| ctx.ptr_eq(&self.node));
            if scoped_here {
                copy.node().set_context(&target.node);
            }
            if nested.iter().any(|n| n.ptr_eq(element.node())) {
                target.add_nested_node(copy.node().clone());
            }
            target.register(&id, copy, false);
        }

        let registered: Vec<Element> = self.elements().into_iter().map(|(_, e)| e).collect();
        for node in nested {
            if registered.iter().any(|e| e.node().ptr_eq(&node)) {
                continue;
            }
            let copy = node.deep_clone();
            if node.context().is_some_and(|ctx| ctx.ptr_eq(&self.node)) {
                copy.set_context(&target.node);
            }
            target.add_nested_node(copy);
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("key", &self.key())
            .field("locator", &self.node.locator())
            .field("elements", &self.element_ids())
            .finish()
    }
}
