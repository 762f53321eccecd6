//! Collaborator traits - the only way the engine touches a browser
//!
//! The engine never speaks a browser protocol. Every primitive it needs is
//! reached through one of four narrow traits, so a real driver, a remote
//! bridge or the [`MockDriver`] used in tests can be swapped freely.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │  Session                                                         │
//! │                                                                  │
//! │  ┌──────────┐  ┌────────────────┐  ┌──────────┐  ┌───────────┐  │
//! │  │  Driver  │  │ ElementCounter │  │  Waiter  │  │ Reporter  │  │
//! │  │ click,   │  │ live element   │  │ blocking │  │ info,     │  │
//! │  │ type,... │  │ cardinality    │  │ polling  │  │ warn,...  │  │
//! │  └──────────┘  └────────────────┘  └──────────┘  └───────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Drivers receive the [`Node`] itself and resolve it through
//! [`Node::locator_path`].

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};

use tracing::{info, trace, warn};

use crate::node::Node;
use crate::result::{PagebindError, PagebindResult};

/// Browser primitives used by capability operations
pub trait Driver {
    /// Click the element
    fn click_on_element(&self, node: &Node) -> PagebindResult<()>;

    /// Type text into the element
    fn send_keys_to_element(&self, node: &Node, text: &str) -> PagebindResult<()>;

    /// Whether the element is displayed, optionally waiting for it
    fn is_element_displayed(&self, node: &Node, wait: bool) -> PagebindResult<bool>;

    /// Whether the element is enabled
    fn is_element_enabled(&self, node: &Node) -> PagebindResult<bool>;

    /// Read an attribute or property of the element
    fn get_attribute_of_element(&self, node: &Node, name: &str) -> PagebindResult<String>;

    /// Scroll the element into view
    fn scroll_to_element(&self, node: &Node) -> PagebindResult<()>;

    /// Visually mark the element
    fn highlight_element(&self, node: &Node) -> PagebindResult<()>;

    /// Remove the visual mark
    fn unhighlight_element(&self, node: &Node) -> PagebindResult<()>;

    /// Capture the current page
    fn take_screenshot(&self) -> PagebindResult<Vec<u8>>;
}

/// Live element cardinality
pub trait ElementCounter {
    /// Number of elements currently matching the node's locator path
    fn get_elements_count(&self, node: &Node) -> PagebindResult<usize>;
}

/// Blocking synchronization, including its timeout policy
pub trait Waiter {
    /// Block until the page settles after an interaction
    fn wait_for_page_update(&self) -> PagebindResult<()>;

    /// Poll `condition` until it holds or the waiter gives up
    fn wait_for_condition(
        &self,
        description: &str,
        condition: &mut dyn FnMut() -> PagebindResult<bool>,
    ) -> PagebindResult<()>;
}

/// User-facing report sink
pub trait Reporter {
    /// Progress message
    fn info(&self, message: &str);

    /// Recoverable problem
    fn warn(&self, message: &str, error: Option<&PagebindError>);

    /// Diagnostic detail
    fn trace(&self, message: &str, error: Option<&PagebindError>);
}

/// Reporter forwarding to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn info(&self, message: &str) {
        info!(target: "pagebind::report", "{message}");
    }

    fn warn(&self, message: &str, error: Option<&PagebindError>) {
        match error {
            Some(err) => warn!(target: "pagebind::report", error = %err, "{message}"),
            None => warn!(target: "pagebind::report", "{message}"),
        }
    }

    fn trace(&self, message: &str, error: Option<&PagebindError>) {
        match error {
            Some(err) => trace!(target: "pagebind::report", error = %err, "{message}"),
            None => trace!(target: "pagebind::report", "{message}"),
        }
    }
}

/// Failure injected into the mock for one locator path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    /// Ordinary driver error
    Driver,
    /// Session loss
    SessionLost,
}

/// Mock collaborators for unit testing.
///
/// Elements are keyed by their rendered locator path
/// (`"css=form > id=user"`). Typing stores the text as the element's `value`,
/// clicking toggles its `checked` attribute.
#[derive(Debug)]
pub struct MockDriver {
    default_displayed: Cell<bool>,
    displayed: RefCell<HashMap<String, bool>>,
    disabled: RefCell<HashSet<String>>,
    attributes: RefCell<HashMap<(String, String), String>>,
    counts: RefCell<HashMap<String, usize>>,
    failures: RefCell<HashMap<String, MockFailure>>,
    screenshot: RefCell<Option<Vec<u8>>>,
    call_history: RefCell<Vec<String>>,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self {
            default_displayed: Cell::new(true),
            displayed: RefCell::default(),
            disabled: RefCell::default(),
            attributes: RefCell::default(),
            counts: RefCell::default(),
            failures: RefCell::default(),
            screenshot: RefCell::default(),
            call_history: RefCell::default(),
        }
    }
}

impl MockDriver {
    /// Create new mock driver; every element is displayed by default
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Visibility for elements without an explicit entry
    pub fn set_default_displayed(&self, displayed: bool) {
        self.default_displayed.set(displayed);
    }

    /// Set visibility for a path
    pub fn set_displayed(&self, path: &str, displayed: bool) {
        let _ = self.displayed.borrow_mut().insert(path.to_string(), displayed);
    }

    /// Mark a path as disabled
    pub fn set_disabled(&self, path: &str) {
        let _ = self.disabled.borrow_mut().insert(path.to_string());
    }

    /// Set an attribute value for a path
    pub fn set_attribute(&self, path: &str, name: &str, value: &str) {
        let _ = self
            .attributes
            .borrow_mut()
            .insert((path.to_string(), name.to_string()), value.to_string());
    }

    /// Read back an attribute value
    #[must_use]
    pub fn attribute(&self, path: &str, name: &str) -> Option<String> {
        self.attributes
            .borrow()
            .get(&(path.to_string(), name.to_string()))
            .cloned()
    }

    /// Set the live count for a counting path
    pub fn set_count(&self, path: &str, count: usize) {
        let _ = self.counts.borrow_mut().insert(path.to_string(), count);
    }

    /// Make every call on a path fail
    pub fn fail_on(&self, path: &str, failure: MockFailure) {
        let _ = self.failures.borrow_mut().insert(path.to_string(), failure);
    }

    /// Remove an injected failure
    pub fn clear_failure(&self, path: &str) {
        let _ = self.failures.borrow_mut().remove(path);
    }

    /// Set mock screenshot
    pub fn set_screenshot(&self, data: Vec<u8>) {
        *self.screenshot.borrow_mut() = Some(data);
    }

    /// Get call history
    #[must_use]
    pub fn history(&self) -> Vec<String> {
        self.call_history.borrow().clone()
    }

    /// Check if method was called
    #[must_use]
    pub fn was_called(&self, method: &str) -> bool {
        self.call_history
            .borrow()
            .iter()
            .any(|c| c.starts_with(method))
    }

    /// Number of recorded calls starting with `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.call_history
            .borrow()
            .iter()
            .filter(|c| c.starts_with(method))
            .count()
    }

    fn record(&self, method: &str, node: &Node) -> PagebindResult<String> {
        self.record_with(method, node, "")
    }

    fn record_with(&self, method: &str, node: &Node, detail: &str) -> PagebindResult<String> {
        let path = node.path_display();
        self.call_history
            .borrow_mut()
            .push(format!("{method}:{path}{detail}"));
        match self.failures.borrow().get(&path) {
            Some(MockFailure::Driver) => Err(PagebindError::driver(format!(
                "{method} failed for {path}"
            ))),
            Some(MockFailure::SessionLost) => Err(PagebindError::session_lost(format!(
                "session lost during {method}"
            ))),
            None => Ok(path),
        }
    }
}

impl Driver for MockDriver {
    fn click_on_element(&self, node: &Node) -> PagebindResult<()> {
        let path = self.record("click_on_element", node)?;
        let key = (path, "checked".to_string());
        let mut attributes = self.attributes.borrow_mut();
        let checked = attributes.get(&key).is_some_and(|v| v == "true");
        let _ = attributes.insert(key, (!checked).to_string());
        Ok(())
    }

    fn send_keys_to_element(&self, node: &Node, text: &str) -> PagebindResult<()> {
        let path = self.record("send_keys_to_element", node)?;
        let _ = self
            .attributes
            .borrow_mut()
            .insert((path, "value".to_string()), text.to_string());
        Ok(())
    }

    fn is_element_displayed(&self, node: &Node, wait: bool) -> PagebindResult<bool> {
        let path = self.record_with("is_element_displayed", node, &format!(":wait={wait}"))?;
        Ok(self
            .displayed
            .borrow()
            .get(&path)
            .copied()
            .unwrap_or_else(|| self.default_displayed.get()))
    }

    fn is_element_enabled(&self, node: &Node) -> PagebindResult<bool> {
        let path = self.record("is_element_enabled", node)?;
        Ok(!self.disabled.borrow().contains(&path))
    }

    fn get_attribute_of_element(&self, node: &Node, name: &str) -> PagebindResult<String> {
        let path = self.record("get_attribute_of_element", node)?;
        Ok(self.attribute(&path, name).unwrap_or_default())
    }

    fn scroll_to_element(&self, node: &Node) -> PagebindResult<()> {
        self.record("scroll_to_element", node).map(|_| ())
    }

    fn highlight_element(&self, node: &Node) -> PagebindResult<()> {
        self.record("highlight_element", node).map(|_| ())
    }

    fn unhighlight_element(&self, node: &Node) -> PagebindResult<()> {
        self.record("unhighlight_element", node).map(|_| ())
    }

    fn take_screenshot(&self) -> PagebindResult<Vec<u8>> {
        self.call_history
            .borrow_mut()
            .push("take_screenshot".to_string());
        self.screenshot
            .borrow()
            .clone()
            .ok_or_else(|| PagebindError::driver("No mock screenshot set"))
    }
}

impl ElementCounter for MockDriver {
    fn get_elements_count(&self, node: &Node) -> PagebindResult<usize> {
        let path = self.record("get_elements_count", node)?;
        Ok(self.counts.borrow().get(&path).copied().unwrap_or(0))
    }
}

impl Waiter for MockDriver {
    fn wait_for_page_update(&self) -> PagebindResult<()> {
        self.call_history
            .borrow_mut()
            .push("wait_for_page_update".to_string());
        Ok(())
    }

    fn wait_for_condition(
        &self,
        description: &str,
        condition: &mut dyn FnMut() -> PagebindResult<bool>,
    ) -> PagebindResult<()> {
        self.call_history
            .borrow_mut()
            .push(format!("wait_for_condition:{description}"));
        if condition()? {
            Ok(())
        } else {
            Err(PagebindError::driver(format!(
                "Condition not met: {description}"
            )))
        }
    }
}
