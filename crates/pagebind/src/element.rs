//! Capability operations.
//!
//! Every read, write, action and visibility check on a [`Node`] checks the
//! node's capabilities and then runs through the session dispatcher. An
//! [`Element`] is what a container registers: a single node or a dynamic
//! resolver. Resolvers forward single-element operations to their canonical
//! instance (index 1, or the empty template key).

use tracing::debug;

use crate::config::parse_flag;
use crate::container::Container;
use crate::dispatcher::Event;
use crate::indexed::IndexedResolver;
use crate::node::{Capabilities, ElementType, Node};
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;
use crate::templated::TemplatedResolver;

impl Node {
    /// Write `value` into the element.
    ///
    /// Checkboxes take a boolean flag and are clicked only when the state
    /// differs; containers take a JSON object of child values.
    pub fn change_value(&self, session: &Session, value: &str) -> PagebindResult<()> {
        self.require(Capabilities::EDIT)?;
        if let Some(container) = self.as_container() {
            return container.change_json(session, value);
        }

        let args = [value.to_string()];
        match self.element_type() {
            ElementType::Checkbox => {
                let desired = parse_flag(value).ok_or_else(|| PagebindError::InvalidValue {
                    element: self.display_name(),
                    value: value.to_string(),
                    message: "expected a boolean flag".to_string(),
                })?;
                session
                    .dispatcher()
                    .dispatch(session, self, Event::ChangeValue, &args, || {
                        let current = self.reader().read(session, self)?;
                        if parse_flag(&current).unwrap_or(false) == desired {
                            debug!(element = %self.display_name(), "checkbox already in state");
                            return Ok(());
                        }
                        session.driver().click_on_element(self)
                    })
            }
            _ => session
                .dispatcher()
                .dispatch(session, self, Event::ChangeValue, &args, || {
                    session.driver().send_keys_to_element(self, value)
                }),
        }
    }

    /// Read the element's value with its reader; containers read as JSON
    pub fn read_value(&self, session: &Session) -> PagebindResult<String> {
        self.require(Capabilities::READ)?;
        if let Some(container) = self.as_container() {
            return container.read_json(session);
        }
        let reader = self.reader();
        session
            .dispatcher()
            .dispatch(session, self, Event::ReadValue, &[], || reader.read(session, self))
    }

    /// Click the element
    pub fn perform_action(&self, session: &Session) -> PagebindResult<()> {
        self.require(Capabilities::ACT)?;
        session
            .dispatcher()
            .dispatch(session, self, Event::Act, &[], || {
                session.driver().click_on_element(self)
            })
    }

    /// Click the element and return the declared next container, if any
    pub fn perform_action_and_next(
        &self,
        session: &Session,
    ) -> PagebindResult<Option<Container>> {
        self.perform_action(session)?;
        self.next_target()
            .map(|target| session.resolve(&target))
            .transpose()
    }

    /// Whether the element is displayed
    pub fn is_displayed(&self, session: &Session, wait: bool) -> PagebindResult<bool> {
        if let Some(container) = self.as_container() {
            return container.is_displayed(session, wait);
        }
        let args = [wait.to_string()];
        session
            .dispatcher()
            .dispatch(session, self, Event::IsDisplayed, &args, || {
                session.driver().is_element_displayed(self, wait)
            })
    }

    /// Whether the element is enabled
    pub fn is_enabled(&self, session: &Session) -> PagebindResult<bool> {
        session
            .dispatcher()
            .guard(session, self, Event::ReadValue, &[], || {
                session.driver().is_element_enabled(self)
            })
    }

    /// Raw attribute of the element
    pub fn attribute(&self, session: &Session, name: &str) -> PagebindResult<String> {
        session
            .dispatcher()
            .guard(session, self, Event::ReadValue, &[], || {
                session.driver().get_attribute_of_element(self, name)
            })
    }

    /// Block until the element is displayed, as the waiter decides
    pub fn wait_until_displayed(&self, session: &Session) -> PagebindResult<()> {
        let description = format!("{} to be displayed", self.display_name());
        session
            .waiter()
            .wait_for_condition(&description, &mut || self.is_displayed(session, false))
    }
}

/// Entry of a container registry
#[derive(Debug, Clone)]
pub enum Element {
    /// Plain node
    Single(Node),
    /// Numbered instances of one declaration
    Indexed(IndexedResolver),
    /// Argument-keyed instances of one declaration
    Templated(TemplatedResolver),
}

impl Element {
    /// Declared node (the resolver base for dynamic elements)
    #[must_use]
    pub fn node(&self) -> &Node {
        match self {
            Self::Single(node) => node,
            Self::Indexed(resolver) => resolver.base(),
            Self::Templated(resolver) => resolver.base(),
        }
    }

    /// Instance single-element operations act on
    pub fn canonical(&self, session: &Session) -> PagebindResult<Node> {
        match self {
            Self::Single(node) => Ok(node.clone()),
            Self::Indexed(resolver) => resolver.index(session, 1),
            Self::Templated(resolver) => resolver.resolve(&[""]),
        }
    }

    /// Capabilities of the declared node
    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        self.node().capabilities()
    }

    /// Whether the element may be absent
    #[must_use]
    pub fn is_optional(&self) -> bool {
        self.node().is_optional()
    }

    /// See [`Node::change_value`]
    pub fn change_value(&self, session: &Session, value: &str) -> PagebindResult<()> {
        self.canonical(session)?.change_value(session, value)
    }

    /// See [`Node::read_value`]
    pub fn read_value(&self, session: &Session) -> PagebindResult<String> {
        self.canonical(session)?.read_value(session)
    }

    /// See [`Node::perform_action`]
    pub fn perform_action(&self, session: &Session) -> PagebindResult<()> {
        self.canonical(session)?.perform_action(session)
    }

    /// See [`Node::perform_action_and_next`]
    pub fn perform_action_and_next(
        &self,
        session: &Session,
    ) -> PagebindResult<Option<Container>> {
        self.canonical(session)?.perform_action_and_next(session)
    }

    /// See [`Node::is_displayed`]
    pub fn is_displayed(&self, session: &Session, wait: bool) -> PagebindResult<bool> {
        self.canonical(session)?.is_displayed(session, wait)
    }

    /// See [`Node::is_enabled`]
    pub fn is_enabled(&self, session: &Session) -> PagebindResult<bool> {
        self.canonical(session)?.is_enabled(session)
    }

    /// See [`Node::wait_until_displayed`]
    pub fn wait_until_displayed(&self, session: &Session) -> PagebindResult<()> {
        self.canonical(session)?.wait_until_displayed(session)
    }

    /// Copy the element; resolvers start with an empty cache
    #[must_use]
    pub fn deep_clone(&self) -> Self {
        match self {
            Self::Single(node) => Self::Single(node.deep_clone()),
            Self::Indexed(resolver) => {
                Self::Indexed(IndexedResolver::new(resolver.base().deep_clone()))
            }
            Self::Templated(resolver) => {
                Self::Templated(TemplatedResolver::new(resolver.base().deep_clone()))
            }
        }
    }

    /// Indexed resolver, if this element is one
    #[must_use]
    pub const fn as_indexed(&self) -> Option<&IndexedResolver> {
        match self {
            Self::Indexed(resolver) => Some(resolver),
            _ => None,
        }
    }

    /// Templated resolver, if this element is one
    #[must_use]
    pub const fn as_templated(&self) -> Option<&TemplatedResolver> {
        match self {
            Self::Templated(resolver) => Some(resolver),
            _ => None,
        }
    }

    /// Container view of a single container node
    #[must_use]
    pub fn as_container(&self) -> Option<Container> {
        match self {
            Self::Single(node) => node.as_container(),
            _ => None,
        }
    }
}

impl From<Node> for Element {
    fn from(node: Node) -> Self {
        Self::Single(node)
    }
}

impl From<Container> for Element {
    fn from(container: Container) -> Self {
        Self::Single(container.node().clone())
    }
}

impl From<IndexedResolver> for Element {
    fn from(resolver: IndexedResolver) -> Self {
        Self::Indexed(resolver)
    }
}

impl From<TemplatedResolver> for Element {
    fn from(resolver: TemplatedResolver) -> Self {
        Self::Templated(resolver)
    }
}
