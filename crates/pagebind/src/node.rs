//! Locatable nodes: the composition primitive of a page graph.
//!
//! Every element, container and table row is a [`Node`]. A node holds its own
//! locator fragment and a non-owning back-reference to its context (the
//! container it is scoped within). The effective locator handed to a driver is
//! the [`Node::locator_path`]: the chain of ancestor fragments, truncated at the
//! first node whose locator is absolute.
//!
//! ```text
//!   Container (css=form#login)          owns children (strong)
//!      │  ▲
//!      │  └──── context (weak) ─────┐
//!      ▼                            │
//!   Node (id=username)  ────────────┘
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::container::{Container, Registry};
use crate::dispatcher::ListenerSet;
use crate::locator::{is_blank, PATH_SEPARATOR};
use crate::page_object::ContainerRef;
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;

bitflags! {
    /// Behaviours a node supports, fixed when the node is created
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// Value can be read
        const READ = 1;
        /// Value can be changed
        const EDIT = 1 << 1;
        /// Has a selected/checked state
        const SELECT = 1 << 2;
        /// Carries a meaningful display name
        const NAMED = 1 << 3;
        /// Can be acted upon (clicked)
        const ACT = 1 << 4;
    }
}

impl Capabilities {
    /// Human readable name of a single capability
    #[must_use]
    pub fn label(self) -> &'static str {
        if self == Self::READ {
            "read value"
        } else if self == Self::EDIT {
            "change value"
        } else if self == Self::SELECT {
            "selection"
        } else if self == Self::NAMED {
            "naming"
        } else if self == Self::ACT {
            "perform action"
        } else {
            "capability set"
        }
    }
}

/// Catalogue of element kinds and the capabilities they carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementType {
    /// Clickable button
    Button,
    /// Hyperlink, clickable and readable
    Link,
    /// Static text
    Label,
    /// Text field
    TextInput,
    /// Checkbox or toggle
    Checkbox,
    /// Select box
    Dropdown,
    /// Image, read through its `src`
    Image,
    /// Group of elements
    Container,
}

impl ElementType {
    /// Capabilities carried by this element type
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Button => Capabilities::ACT | Capabilities::NAMED,
            Self::Link => Capabilities::ACT | Capabilities::NAMED | Capabilities::READ,
            Self::Label | Self::Image => Capabilities::READ,
            Self::TextInput => Capabilities::READ | Capabilities::EDIT,
            Self::Checkbox | Self::Dropdown => {
                Capabilities::READ | Capabilities::EDIT | Capabilities::SELECT
            }
            Self::Container => Capabilities::READ | Capabilities::EDIT | Capabilities::NAMED,
        }
    }

    /// Reader used when metadata does not name one
    #[must_use]
    pub fn default_reader(&self) -> Reader {
        match self {
            Self::TextInput | Self::Dropdown => Reader::Value,
            Self::Checkbox => Reader::Checked,
            Self::Image => Reader::Attribute("src".to_string()),
            Self::Button | Self::Link | Self::Label | Self::Container => Reader::Text,
        }
    }
}

/// Closure signature for custom readers
pub type ReadFn = dyn Fn(&Session, &Node) -> PagebindResult<String>;

/// How read-value obtains an element's value
#[derive(Clone)]
pub enum Reader {
    /// Text content
    Text,
    /// `value` property
    Value,
    /// `checked` state
    Checked,
    /// Named attribute
    Attribute(String),
    /// Caller supplied function
    Custom(Rc<ReadFn>),
}

impl Reader {
    /// Create a custom reader
    pub fn custom(f: impl Fn(&Session, &Node) -> PagebindResult<String> + 'static) -> Self {
        Self::Custom(Rc::new(f))
    }

    /// Attribute fetched from the driver, if this reader is attribute based
    #[must_use]
    pub fn attribute_name(&self) -> Option<&str> {
        match self {
            Self::Text => Some("textContent"),
            Self::Value => Some("value"),
            Self::Checked => Some("checked"),
            Self::Attribute(name) => Some(name),
            Self::Custom(_) => None,
        }
    }

    pub(crate) fn read(&self, session: &Session, node: &Node) -> PagebindResult<String> {
        match self {
            Self::Custom(f) => f(session, node),
            other => {
                let name = other.attribute_name().unwrap_or("textContent");
                session.driver().get_attribute_of_element(node, name)
            }
        }
    }
}

impl fmt::Debug for Reader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("Text"),
            Self::Value => f.write_str("Value"),
            Self::Checked => f.write_str("Checked"),
            Self::Attribute(name) => f.debug_tuple("Attribute").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Debug, Clone)]
struct NodeState {
    locator: String,
    context: Option<Weak<NodeInner>>,
    use_context_lookup: bool,
    name: Option<String>,
    optional: bool,
    reader: Reader,
    next: Option<ContainerRef>,
}

pub(crate) struct NodeInner {
    element_type: ElementType,
    capabilities: Capabilities,
    state: RefCell<NodeState>,
    listeners: RefCell<ListenerSet>,
    registry: Option<Rc<Registry>>,
}

/// Handle to a locatable node.
///
/// Cloning the handle shares the node; use [`Node::ptr_eq`] for identity.
#[derive(Clone)]
pub struct Node {
    inner: Rc<NodeInner>,
}

impl Node {
    /// Create an element node
    #[must_use]
    pub fn new(element_type: ElementType, locator: impl Into<String>) -> Self {
        let registry = (element_type == ElementType::Container)
            .then(|| Rc::new(Registry::new(String::new())));
        Self::from_parts(element_type, locator.into(), registry)
    }

    pub(crate) fn with_registry(locator: String, registry: Rc<Registry>) -> Self {
        Self::from_parts(ElementType::Container, locator, Some(registry))
    }

    fn from_parts(
        element_type: ElementType,
        locator: String,
        registry: Option<Rc<Registry>>,
    ) -> Self {
        Self {
            inner: Rc::new(NodeInner {
                element_type,
                capabilities: element_type.capabilities(),
                state: RefCell::new(NodeState {
                    locator,
                    context: None,
                    use_context_lookup: true,
                    name: None,
                    optional: false,
                    reader: element_type.default_reader(),
                    next: None,
                }),
                listeners: RefCell::new(ListenerSet::default()),
                registry,
            }),
        }
    }

    /// Element type this node was created as
    #[must_use]
    pub fn element_type(&self) -> ElementType {
        self.inner.element_type
    }

    /// Capabilities of this node
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    /// Whether this node carries every capability in `capability`
    #[must_use]
    pub fn has(&self, capability: Capabilities) -> bool {
        self.inner.capabilities.contains(capability)
    }

    /// Fail with a capability mismatch unless the node supports `capability`
    pub fn require(&self, capability: Capabilities) -> PagebindResult<()> {
        if self.has(capability) {
            Ok(())
        } else {
            Err(PagebindError::CapabilityMismatch {
                element: self.display_name(),
                capability: capability.label().to_string(),
            })
        }
    }

    /// Own locator fragment
    #[must_use]
    pub fn locator(&self) -> String {
        self.inner.state.borrow().locator.clone()
    }

    /// Replace the locator fragment
    pub fn set_locator(&self, locator: impl Into<String>) {
        self.inner.state.borrow_mut().locator = locator.into();
    }

    /// Context node, if it is still alive
    #[must_use]
    pub fn context(&self) -> Option<Node> {
        self.inner
            .state
            .borrow()
            .context
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|inner| Self { inner })
    }

    /// Scope this node within `context`
    pub fn set_context(&self, context: &Node) {
        self.inner.state.borrow_mut().context = Some(Rc::downgrade(&context.inner));
    }

    /// Detach this node from its context
    pub fn clear_context(&self) {
        self.inner.state.borrow_mut().context = None;
    }

    /// Whether ancestor locators are chained when resolving this node
    #[must_use]
    pub fn use_context_lookup(&self) -> bool {
        self.inner.state.borrow().use_context_lookup
    }

    /// Set whether ancestor locators are chained
    pub fn set_use_context_lookup(&self, value: bool) {
        self.inner.state.borrow_mut().use_context_lookup = value;
    }

    /// Declared name
    #[must_use]
    pub fn name(&self) -> Option<String> {
        self.inner.state.borrow().name.clone()
    }

    /// Set the declared name
    pub fn set_name(&self, name: impl Into<String>) {
        self.inner.state.borrow_mut().name = Some(name.into());
    }

    /// Name for messages: the declared name, else the raw locator
    #[must_use]
    pub fn display_name(&self) -> String {
        let state = self.inner.state.borrow();
        match &state.name {
            Some(name) if !is_blank(name) => name.clone(),
            _ => state.locator.clone(),
        }
    }

    /// Whether the element may be absent
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.inner.state.borrow().optional
    }

    /// Mark the element as possibly absent
    pub fn set_optional(&self, optional: bool) {
        self.inner.state.borrow_mut().optional = optional;
    }

    /// Reader used by read-value
    #[must_use]
    pub fn reader(&self) -> Reader {
        self.inner.state.borrow().reader.clone()
    }

    /// Replace the reader
    pub fn set_reader(&self, reader: Reader) {
        self.inner.state.borrow_mut().reader = reader;
    }

    /// Container reached after acting on this node
    #[must_use]
    pub fn next_target(&self) -> Option<ContainerRef> {
        self.inner.state.borrow().next
    }

    /// Set the container reached after acting on this node
    pub fn set_next_target(&self, target: Option<ContainerRef>) {
        self.inner.state.borrow_mut().next = target;
    }

    /// Listeners attached to this node
    #[must_use]
    pub fn listeners(&self) -> ListenerSet {
        self.inner.listeners.borrow().clone()
    }

    /// Merge `listeners` into the node's listener set
    pub fn attach_listeners(&self, listeners: &ListenerSet) {
        self.inner.listeners.borrow_mut().extend(listeners);
    }

    /// Run `f` with mutable access to the node's listener set
    pub fn with_listeners<T>(&self, f: impl FnOnce(&mut ListenerSet) -> T) -> T {
        f(&mut self.inner.listeners.borrow_mut())
    }

    /// View this node as a container
    #[must_use]
    pub fn as_container(&self) -> Option<Container> {
        self.inner
            .registry
            .as_ref()
            .map(|registry| Container::from_parts(self.clone(), Rc::clone(registry)))
    }

    /// Whether this node is a container
    #[must_use]
    pub fn is_container(&self) -> bool {
        self.inner.registry.is_some()
    }

    /// Identity comparison
    #[must_use]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Ordered locator fragments from the outermost ancestor to this node.
    ///
    /// Walks up the context chain collecting non-blank locators and stops after
    /// the first node that does not use context lookup. Never fails: a dropped
    /// or missing context ends the walk.
    #[must_use]
    pub fn locator_path(&self) -> Vec<String> {
        let mut stack = Vec::new();
        let mut current = Some(self.clone());
        while let Some(node) = current {
            let state = node.inner.state.borrow();
            if !is_blank(&state.locator) {
                stack.push(state.locator.clone());
            }
            if !state.use_context_lookup {
                break;
            }
            drop(state);
            current = node.context();
        }
        stack.reverse();
        stack
    }

    /// Locator path joined for diagnostics
    #[must_use]
    pub fn path_display(&self) -> String {
        self.locator_path().join(PATH_SEPARATOR)
    }

    /// Copy this node's attributes into a fresh node with `locator`.
    ///
    /// The copy shares the context and listeners but has an empty registry;
    /// it is used for counting queries.
    #[must_use]
    pub(crate) fn shallow_copy(&self, locator: String) -> Self {
        let registry = self
            .inner
            .registry
            .as_ref()
            .map(|r| Rc::new(Registry::new(r.key().to_string())));
        let copy = Self::from_parts(self.inner.element_type, String::new(), registry);
        let mut state = self.inner.state.borrow().clone();
        state.locator = locator;
        *copy.inner.state.borrow_mut() = state;
        copy.attach_listeners(&self.listeners());
        copy
    }

    /// Copy this node with all attributes, recursively cloning container
    /// children so the copy owns an independent subtree.
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        let copy = match &self.inner.registry {
            Some(registry) => {
                let cloned = Rc::new(Registry::new(registry.key().to_string()));
                cloned.set_url(registry.url());
                for anchor in registry.anchors() {
                    cloned.anchor(anchor);
                }
                Self::with_registry(String::new(), cloned)
            }
            None => Self::from_parts(self.inner.element_type, String::new(), None),
        };
        *copy.inner.state.borrow_mut() = self.inner.state.borrow().clone();
        copy.attach_listeners(&self.listeners());

        if let (Some(source), Some(target)) = (self.as_container(), copy.as_container()) {
            source.clone_children_into(&target);
        }
        copy
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("Node")
            .field("element_type", &self.inner.element_type)
            .field("name", &state.name)
            .field("locator", &state.locator)
            .field("use_context_lookup", &state.use_context_lookup)
            .field("optional", &state.optional)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(links: &[(&str, bool)]) -> Vec<Node> {
        let nodes: Vec<Node> = links
            .iter()
            .map(|(locator, lookup)| {
                let node = Node::new(ElementType::Container, *locator);
                node.set_use_context_lookup(*lookup);
                node
            })
            .collect();
        for pair in nodes.windows(2) {
            pair[1].set_context(&pair[0]);
        }
        nodes
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_path_root_to_leaf() {
            let nodes = chain(&[("css=body", true), ("css=form", true), ("id=user", true)]);
            assert_eq!(
                nodes[2].locator_path(),
                vec!["css=body", "css=form", "id=user"]
            );
            assert_eq!(nodes[2].path_display(), "css=body > css=form > id=user");
        }

        #[test]
        fn test_blank_locator_does_not_break_chain() {
            let nodes = chain(&[("css=body", true), ("", true), ("id=user", true)]);
            assert_eq!(nodes[2].locator_path(), vec!["css=body", "id=user"]);
        }

        #[test]
        fn test_truncates_at_absolute_ancestor_inclusive() {
            let nodes = chain(&[
                ("css=html", true),
                ("css=dialog", false),
                ("css=form", true),
                ("id=user", true),
            ]);
            assert_eq!(
                nodes[3].locator_path(),
                vec!["css=dialog", "css=form", "id=user"]
            );
        }

        #[test]
        fn test_absolute_leaf_ignores_context() {
            let nodes = chain(&[("css=form", true), ("//div[@id='toast']", false)]);
            assert_eq!(nodes[1].locator_path(), vec!["//div[@id='toast']"]);
        }

        #[test]
        fn test_dropped_context_ends_walk() {
            let leaf = Node::new(ElementType::Label, "css=span");
            {
                let parent = Node::new(ElementType::Container, "css=div");
                leaf.set_context(&parent);
                assert_eq!(leaf.locator_path().len(), 2);
            }
            assert!(leaf.context().is_none());
            assert_eq!(leaf.locator_path(), vec!["css=span"]);
        }
    }

    mod capability_tests {
        use super::*;

        #[test]
        fn test_element_capabilities() {
            let button = Node::new(ElementType::Button, "id=go");
            assert!(button.has(Capabilities::ACT));
            assert!(!button.has(Capabilities::EDIT));
            let err = button.require(Capabilities::EDIT).unwrap_err();
            assert!(matches!(err, PagebindError::CapabilityMismatch { .. }));
        }

        #[test]
        fn test_container_nodes_have_registry() {
            assert!(Node::new(ElementType::Container, "").is_container());
            assert!(!Node::new(ElementType::Label, "css=p").is_container());
        }

        #[test]
        fn test_display_name_falls_back_to_locator() {
            let node = Node::new(ElementType::Label, "css=h1");
            assert_eq!(node.display_name(), "css=h1");
            node.set_name("Title");
            assert_eq!(node.display_name(), "Title");
        }
    }

    mod clone_tests {
        use super::*;

        #[test]
        fn test_deep_clone_copies_attributes() {
            let parent = Node::new(ElementType::Container, "css=ul");
            let node = Node::new(ElementType::Label, ".//li[%d]");
            node.set_context(&parent);
            node.set_name("Item");
            node.set_optional(true);

            let copy = node.deep_clone();
            assert!(!copy.ptr_eq(&node));
            assert_eq!(copy.locator(), ".//li[%d]");
            assert_eq!(copy.name().as_deref(), Some("Item"));
            assert!(copy.is_optional());
            assert!(copy.context().unwrap().ptr_eq(&parent));
        }

        #[test]
        fn test_shallow_copy_uses_new_locator() {
            let node = Node::new(ElementType::Label, ".//li[%d]");
            let copy = node.shallow_copy(".//li".to_string());
            assert_eq!(copy.locator(), ".//li");
            assert_eq!(node.locator(), ".//li[%d]");
        }
    }

    mod path_property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_path_matches_truncated_ancestors(
                links in proptest::collection::vec(("(css=[a-z]{1,4})?", any::<bool>()), 1..8)
            ) {
                let links_ref: Vec<(&str, bool)> =
                    links.iter().map(|(l, b)| (l.as_str(), *b)).collect();
                let nodes = chain(&links_ref);

                let mut expected = Vec::new();
                for (locator, lookup) in links.iter().rev() {
                    if !locator.is_empty() {
                        expected.push(locator.clone());
                    }
                    if !lookup {
                        break;
                    }
                }
                expected.reverse();

                prop_assert_eq!(nodes[nodes.len() - 1].locator_path(), expected);
            }
        }
    }
}
