//! Event dispatch around every capability call.
//!
//! ```text
//!   before (registration order) ──► operation ──► after (reverse order)
//!                                        │
//!                                        └─ error ──► normalize ──► caller
//! ```
//!
//! After-listener failures are swallowed unless they are the fatal
//! session-loss kind. Errors leaving the pipeline carry the action
//! description, the element's display name and its full locator path.

use std::backtrace::Backtrace;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::node::Node;
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;

/// Frames inside the interception layer are dropped from error traces
const DISPATCH_FRAME_PREFIX: &str = "pagebind::dispatcher::";

/// Frames of the crate itself are always kept
const CRATE_FRAME_PREFIX: &str = "pagebind::";

/// Interaction kinds that pass through the dispatcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Event {
    /// Write a value
    ChangeValue,
    /// Read a value
    ReadValue,
    /// Click or otherwise act
    Act,
    /// Visibility check
    IsDisplayed,
}

impl Event {
    /// Every event kind
    pub const ALL: [Self; 4] = [
        Self::ChangeValue,
        Self::ReadValue,
        Self::Act,
        Self::IsDisplayed,
    ];

    /// Default description
    #[must_use]
    pub const fn description(&self) -> &'static str {
        match self {
            Self::ChangeValue => "change value",
            Self::ReadValue => "read value",
            Self::Act => "perform action",
            Self::IsDisplayed => "check visibility",
        }
    }

    /// Message template with `{N}` placeholders bound to call arguments
    #[must_use]
    pub const fn message_template(&self) -> Option<&'static str> {
        match self {
            Self::ChangeValue => Some("change value to '{0}'"),
            Self::IsDisplayed => Some("check visibility (wait: {0})"),
            Self::ReadValue | Self::Act => None,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

/// Substitute `{N}` placeholders with positional arguments.
///
/// Placeholders without a matching argument are left in place.
#[must_use]
pub fn format_message(template: &str, args: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let tail = &rest[open + 1..];
        let arg = tail.find('}').and_then(|close| {
            let digits = &tail[..close];
            let index = digits
                .bytes()
                .all(|b| b.is_ascii_digit())
                .then(|| digits.parse::<usize>().ok())
                .flatten()?;
            args.get(index).map(|arg| (arg, close))
        });
        match arg {
            Some((arg, close)) => {
                out.push_str(arg);
                rest = &tail[close + 1..];
            }
            None => {
                out.push('{');
                rest = tail;
            }
        }
    }
    out.push_str(rest);
    out
}

/// What a listener sees of an in-flight call
#[derive(Debug, Clone, Copy)]
pub struct EventContext<'a> {
    /// Event kind
    pub event: Event,
    /// Target node
    pub node: &'a Node,
    /// Call arguments, rendered as strings
    pub args: &'a [String],
}

impl EventContext<'_> {
    /// Action description with arguments substituted
    #[must_use]
    pub fn describe(&self) -> String {
        match self.event.message_template() {
            Some(template) => format_message(template, self.args),
            None => self.event.description().to_string(),
        }
    }
}

/// Interceptor attached to a node.
///
/// Both hooks default to doing nothing.
pub trait Listener {
    /// Name used to keep listener sets free of duplicates
    fn name(&self) -> &str;

    /// Runs before the operation; an error aborts the call
    fn before(&self, _session: &Session, _ctx: &EventContext<'_>) -> PagebindResult<()> {
        Ok(())
    }

    /// Runs after a successful operation
    fn after(&self, _session: &Session, _ctx: &EventContext<'_>) -> PagebindResult<()> {
        Ok(())
    }
}

/// Ordered listener sets, one per event kind
#[derive(Clone, Default)]
pub struct ListenerSet {
    by_event: HashMap<Event, Vec<Rc<dyn Listener>>>,
}

impl ListenerSet {
    /// Create an empty set
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for one event kind; a listener with the same name
    /// is only registered once
    pub fn add(&mut self, event: Event, listener: Rc<dyn Listener>) {
        let listeners = self.by_event.entry(event).or_default();
        if !listeners.iter().any(|l| l.name() == listener.name()) {
            listeners.push(listener);
        }
    }

    /// Register a listener for several event kinds
    pub fn add_for(&mut self, events: &[Event], listener: &Rc<dyn Listener>) {
        for event in events {
            self.add(*event, Rc::clone(listener));
        }
    }

    /// Remove a listener from every event kind
    pub fn remove(&mut self, name: &str) {
        for listeners in self.by_event.values_mut() {
            listeners.retain(|l| l.name() != name);
        }
    }

    /// Merge another set, keeping this set's entries first
    pub fn extend(&mut self, other: &Self) {
        for event in Event::ALL {
            if let Some(listeners) = other.by_event.get(&event) {
                for listener in listeners {
                    self.add(event, Rc::clone(listener));
                }
            }
        }
    }

    /// Listeners for an event in registration order
    #[must_use]
    pub fn listeners(&self, event: Event) -> Vec<Rc<dyn Listener>> {
        self.by_event.get(&event).cloned().unwrap_or_default()
    }

    /// Names of the listeners for an event in registration order
    #[must_use]
    pub fn names(&self, event: Event) -> Vec<String> {
        self.by_event
            .get(&event)
            .map(|ls| ls.iter().map(|l| l.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Whether no listener is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_event.values().all(Vec::is_empty)
    }
}

impl fmt::Debug for ListenerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for event in Event::ALL {
            if let Some(listeners) = self.by_event.get(&event) {
                let names: Vec<&str> = listeners.iter().map(|l| l.name()).collect();
                let _ = map.entry(&event, &names);
            }
        }
        map.finish()
    }
}

/// Per-session dispatch state
#[derive(Debug, Default)]
pub struct Dispatcher {
    after_suppressed: Cell<bool>,
}

/// Restores the suppression flag when dropped
struct SuppressionGuard<'a> {
    flag: &'a Cell<bool>,
    previous: bool,
}

impl Drop for SuppressionGuard<'_> {
    fn drop(&mut self) {
        self.flag.set(self.previous);
    }
}

impl Dispatcher {
    /// Create a dispatcher
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether after-listeners are currently suppressed
    #[must_use]
    pub fn after_suppressed(&self) -> bool {
        self.after_suppressed.get()
    }

    /// Run `f` with after-listeners suppressed; the previous state is restored
    /// on exit, including unwinding
    pub fn without_after_listeners<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = SuppressionGuard {
            flag: &self.after_suppressed,
            previous: self.after_suppressed.replace(true),
        };
        f()
    }

    /// Run `op` through the before/after pipeline of `node`'s listeners
    pub fn dispatch<T>(
        &self,
        session: &Session,
        node: &Node,
        event: Event,
        args: &[String],
        op: impl FnOnce() -> PagebindResult<T>,
    ) -> PagebindResult<T> {
        let ctx = EventContext { event, node, args };
        let listeners = node.listeners().listeners(event);

        for listener in &listeners {
            if let Err(err) = listener.before(session, &ctx) {
                return Err(self.normalize(session, &ctx, err));
            }
        }

        let value = op().map_err(|err| self.normalize(session, &ctx, err))?;

        if self.after_suppressed() {
            trace!(event = %event, element = %node.display_name(), "after-listeners suppressed");
            return Ok(value);
        }

        for listener in listeners.iter().rev() {
            if let Err(err) = listener.after(session, &ctx) {
                if err.is_session_lost() {
                    return Err(self.normalize(session, &ctx, err));
                }
                trace!(listener = listener.name(), error = %err, "after-listener failed");
                session.reporter().trace(
                    &format!("Listener '{}' failed after {}", listener.name(), ctx.describe()),
                    Some(&err),
                );
            }
        }

        Ok(value)
    }

    /// Run `op` without listeners, normalizing its errors the same way
    pub fn guard<T>(
        &self,
        session: &Session,
        node: &Node,
        event: Event,
        args: &[String],
        op: impl FnOnce() -> PagebindResult<T>,
    ) -> PagebindResult<T> {
        let ctx = EventContext { event, node, args };
        op().map_err(|err| self.normalize(session, &ctx, err))
    }

    /// Annotate an error with the element context.
    ///
    /// Contract violations pass through unchanged, as do errors a nested
    /// dispatch already annotated.
    pub fn normalize(
        &self,
        session: &Session,
        ctx: &EventContext<'_>,
        err: PagebindError,
    ) -> PagebindError {
        if err.is_normalized() {
            return err;
        }

        let action = ctx.describe();
        let element = ctx.node.display_name();
        let path = ctx.node.path_display();

        match err {
            PagebindError::SessionLost { message, .. } => {
                debug!(%action, %element, "session lost");
                PagebindError::SessionLost {
                    action,
                    element,
                    path,
                    message,
                }
            }
            PagebindError::Configuration { .. }
            | PagebindError::UnknownIdentifier { .. }
            | PagebindError::CapabilityMismatch { .. }
            | PagebindError::InvalidIndex { .. }
            | PagebindError::InvalidValue { .. }
            | PagebindError::Template { .. }
            | PagebindError::NotFound { .. } => err,
            other => {
                let config = session.config();
                let screenshot = if config.capture_screenshots {
                    match session.driver().take_screenshot() {
                        Ok(data) => Some(data),
                        Err(capture_err) => {
                            trace!(error = %capture_err, "screenshot capture failed");
                            None
                        }
                    }
                } else {
                    None
                };
                let frames = if config.capture_frames {
                    capture_frames(&config.frame_allow_prefixes)
                } else {
                    Vec::new()
                };
                debug!(%action, %element, %path, error = %other, "interaction failed");
                PagebindError::Interaction {
                    action,
                    element,
                    path,
                    message: other.to_string(),
                    screenshot,
                    frames,
                }
            }
        }
    }
}

fn capture_frames(allow_prefixes: &[String]) -> Vec<String> {
    filter_frames(&Backtrace::force_capture().to_string(), allow_prefixes)
}

/// Keep only frames of this crate or an allow-listed prefix, dropping the
/// interception layer itself.
#[must_use]
pub fn filter_frames(backtrace: &str, allow_prefixes: &[String]) -> Vec<String> {
    backtrace
        .lines()
        .filter_map(|line| {
            let (index, symbol) = line.trim_start().split_once(": ")?;
            index.parse::<usize>().ok()?;
            Some(symbol.trim())
        })
        .filter(|symbol| !symbol.starts_with(DISPATCH_FRAME_PREFIX))
        .filter(|symbol| {
            symbol.starts_with(CRATE_FRAME_PREFIX)
                || allow_prefixes.iter().any(|p| symbol.starts_with(p.as_str()))
        })
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::node::ElementType;
    use std::cell::RefCell;

    struct Recording {
        name: String,
        log: Rc<RefCell<Vec<String>>>,
        fail_after: Option<fn() -> PagebindError>,
    }

    impl Listener for Recording {
        fn name(&self) -> &str {
            &self.name
        }

        fn before(&self, _session: &Session, _ctx: &EventContext<'_>) -> PagebindResult<()> {
            self.log.borrow_mut().push(format!("before:{}", self.name));
            Ok(())
        }

        fn after(&self, _session: &Session, _ctx: &EventContext<'_>) -> PagebindResult<()> {
            self.log.borrow_mut().push(format!("after:{}", self.name));
            match self.fail_after {
                Some(make) => Err(make()),
                None => Ok(()),
            }
        }
    }

    fn recording(
        name: &str,
        log: &Rc<RefCell<Vec<String>>>,
        fail_after: Option<fn() -> PagebindError>,
    ) -> Rc<dyn Listener> {
        Rc::new(Recording {
            name: name.to_string(),
            log: Rc::clone(log),
            fail_after,
        })
    }

    fn session() -> (Rc<MockDriver>, Session) {
        let mock = Rc::new(MockDriver::new());
        let session = Session::builder()
            .collaborators(Rc::clone(&mock))
            .build()
            .unwrap();
        (mock, session)
    }

    mod ordering_tests {
        use super::*;

        #[test]
        fn test_before_in_order_after_in_reverse() {
            let (_mock, session) = session();
            let log = Rc::new(RefCell::new(Vec::new()));
            let node = Node::new(ElementType::Button, "id=go");
            node.with_listeners(|set| {
                set.add(Event::Act, recording("L1", &log, None));
                set.add(Event::Act, recording("L2", &log, None));
            });

            session
                .dispatcher()
                .dispatch(&session, &node, Event::Act, &[], || Ok(()))
                .unwrap();

            assert_eq!(
                *log.borrow(),
                vec!["before:L1", "before:L2", "after:L2", "after:L1"]
            );
        }

        #[test]
        fn test_failure_skips_after_listeners() {
            let (_mock, session) = session();
            let log = Rc::new(RefCell::new(Vec::new()));
            let node = Node::new(ElementType::Button, "id=go");
            node.with_listeners(|set| set.add(Event::Act, recording("L1", &log, None)));

            let result: PagebindResult<()> = session.dispatcher().dispatch(
                &session,
                &node,
                Event::Act,
                &[],
                || Err(PagebindError::driver("detached")),
            );

            assert!(matches!(result, Err(PagebindError::Interaction { .. })));
            assert_eq!(*log.borrow(), vec!["before:L1"]);
        }

        #[test]
        fn test_duplicate_names_registered_once() {
            let log = Rc::new(RefCell::new(Vec::new()));
            let mut set = ListenerSet::new();
            set.add(Event::Act, recording("L1", &log, None));
            set.add(Event::Act, recording("L1", &log, None));
            assert_eq!(set.names(Event::Act), vec!["L1"]);
            set.remove("L1");
            assert!(set.is_empty());
        }
    }

    mod suppression_tests {
        use super::*;

        #[test]
        fn test_suppression_skips_after_and_restores() {
            let (_mock, session) = session();
            let log = Rc::new(RefCell::new(Vec::new()));
            let node = Node::new(ElementType::Button, "id=go");
            node.with_listeners(|set| set.add(Event::Act, recording("L1", &log, None)));

            let dispatcher = session.dispatcher();
            dispatcher
                .without_after_listeners(|| {
                    dispatcher.dispatch(&session, &node, Event::Act, &[], || Ok(()))
                })
                .unwrap();

            assert_eq!(*log.borrow(), vec!["before:L1"]);
            assert!(!dispatcher.after_suppressed());
        }

        #[test]
        fn test_suppression_restored_after_error() {
            let (_mock, session) = session();
            let dispatcher = session.dispatcher();
            let result: PagebindResult<()> =
                dispatcher.without_after_listeners(|| Err(PagebindError::driver("boom")));
            assert!(result.is_err());
            assert!(!dispatcher.after_suppressed());
        }

        #[test]
        fn test_nested_suppression_keeps_outer_state() {
            let (_mock, session) = session();
            let dispatcher = session.dispatcher();
            dispatcher.without_after_listeners(|| {
                dispatcher.without_after_listeners(|| {});
                assert!(dispatcher.after_suppressed());
            });
            assert!(!dispatcher.after_suppressed());
        }
    }

    mod after_failure_tests {
        use super::*;

        #[test]
        fn test_after_failure_is_swallowed() {
            let (_mock, session) = session();
            let log = Rc::new(RefCell::new(Vec::new()));
            let node = Node::new(ElementType::Button, "id=go");
            node.with_listeners(|set| {
                set.add(Event::ReadValue, recording("L1", &log, None));
                set.add(
                    Event::ReadValue,
                    recording("L2", &log, Some(|| PagebindError::driver("flaky"))),
                );
            });

            let value = session
                .dispatcher()
                .dispatch(&session, &node, Event::ReadValue, &[], || {
                    Ok("ok".to_string())
                })
                .unwrap();

            assert_eq!(value, "ok");
            assert_eq!(log.borrow().last().map(String::as_str), Some("after:L1"));
        }

        #[test]
        fn test_session_loss_in_after_propagates() {
            let (_mock, session) = session();
            let log = Rc::new(RefCell::new(Vec::new()));
            let node = Node::new(ElementType::Button, "id=go");
            node.with_listeners(|set| {
                set.add(
                    Event::Act,
                    recording("L1", &log, Some(|| PagebindError::session_lost("gone"))),
                );
            });

            let err = session
                .dispatcher()
                .dispatch(&session, &node, Event::Act, &[], || Ok(()))
                .unwrap_err();

            match err {
                PagebindError::SessionLost { element, path, .. } => {
                    assert_eq!(element, "id=go");
                    assert_eq!(path, "id=go");
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    mod normalize_tests {
        use super::*;

        #[test]
        fn test_interaction_error_is_enriched() {
            let (mock, session) = session();
            mock.set_screenshot(vec![9, 9]);
            let form = Node::new(ElementType::Container, "css=form");
            let field = Node::new(ElementType::TextInput, "id=user");
            field.set_context(&form);
            field.set_name("Username");

            let err = session
                .dispatcher()
                .dispatch(
                    &session,
                    &field,
                    Event::ChangeValue,
                    &["bob".to_string()],
                    || -> PagebindResult<()> { Err(PagebindError::driver("not interactable")) },
                )
                .unwrap_err();

            match err {
                PagebindError::Interaction {
                    action,
                    element,
                    path,
                    message,
                    screenshot,
                    ..
                } => {
                    assert_eq!(action, "change value to 'bob'");
                    assert_eq!(element, "Username");
                    assert_eq!(path, "css=form > id=user");
                    assert!(message.contains("not interactable"));
                    assert_eq!(screenshot, Some(vec![9, 9]));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_session_loss_is_not_enriched_with_page_state() {
            let (mock, session) = session();
            mock.set_screenshot(vec![1]);
            let node = Node::new(ElementType::Button, "id=go");
            let err = session
                .dispatcher()
                .dispatch(&session, &node, Event::Act, &[], || -> PagebindResult<()> {
                    Err(PagebindError::session_lost("browser closed"))
                })
                .unwrap_err();
            assert!(err.is_session_lost());
            assert!(err.screenshot_base64().is_none());
            assert!(!mock.was_called("take_screenshot"));
        }

        #[test]
        fn test_contract_violations_pass_through() {
            let (_mock, session) = session();
            let node = Node::new(ElementType::Button, "id=go");
            let err = session
                .dispatcher()
                .guard(&session, &node, Event::Act, &[], || -> PagebindResult<()> {
                    Err(PagebindError::InvalidIndex {
                        element: "x".to_string(),
                        index: 0,
                    })
                })
                .unwrap_err();
            assert!(matches!(err, PagebindError::InvalidIndex { .. }));
        }

        #[test]
        fn test_format_message() {
            let args = vec!["a".to_string(), "b".to_string()];
            assert_eq!(format_message("{1}-{0}-{2}", &args), "b-a-{2}");
        }

        #[test]
        fn test_format_message_does_not_rescan_arguments() {
            let args = vec!["{1}".to_string(), "x".to_string()];
            assert_eq!(format_message("type '{0}' then {1}", &args), "type '{1}' then x");
            assert_eq!(format_message("{} {a} {", &args), "{} {a} {");
        }
    }

    mod frame_tests {
        use super::*;

        #[test]
        fn test_filter_frames_keeps_crate_and_allow_list() {
            let trace = "   0: std::backtrace::Backtrace::force_capture\n\
                         \x20            at /rustc/library/std/src/backtrace.rs:312:9\n\
                         \x20  1: pagebind::dispatcher::Dispatcher::normalize\n\
                         \x20  2: pagebind::element::<impl pagebind::node::Node>::read_value\n\
                         \x20  3: my_tests::login::fills_form\n\
                         \x20  4: core::ops::function::FnOnce::call_once\n";
            let frames = filter_frames(trace, &["my_tests::".to_string()]);
            assert_eq!(
                frames,
                vec![
                    "pagebind::element::<impl pagebind::node::Node>::read_value",
                    "my_tests::login::fills_form",
                ]
            );
        }
    }
}
