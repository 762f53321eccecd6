//! Default listeners attached by the factory.
//!
//! | Listener | Events | Before | After |
//! |---|---|---|---|
//! | [`LoggingListener`] | all | report the action | trace completion |
//! | [`HighlightListener`] | act, change, read | highlight | unhighlight |
//! | [`ScrollListener`] | act, change | scroll into view | |
//! | [`PageUpdateListener`] | act, change | | wait for the page |
//!
//! Highlighting and scrolling are cosmetic: their failures are reported and
//! ignored unless the session is gone.

use std::rc::Rc;

use tracing::{debug, trace};

use crate::config::FrameworkConfig;
use crate::dispatcher::{Event, EventContext, Listener, ListenerSet};
use crate::result::PagebindResult;
use crate::session::Session;

/// Reports every interaction
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingListener;

impl Listener for LoggingListener {
    fn name(&self) -> &str {
        "logging"
    }

    fn before(&self, session: &Session, ctx: &EventContext<'_>) -> PagebindResult<()> {
        match ctx.event {
            Event::ChangeValue | Event::Act => session.reporter().info(&format!(
                "{} on {}",
                ctx.describe(),
                ctx.node.display_name()
            )),
            Event::ReadValue | Event::IsDisplayed => {
                debug!(
                    session = %session.id(),
                    action = %ctx.describe(),
                    element = %ctx.node.display_name(),
                    "inspecting"
                );
            }
        }
        Ok(())
    }

    fn after(&self, session: &Session, ctx: &EventContext<'_>) -> PagebindResult<()> {
        trace!(
            session = %session.id(),
            action = %ctx.describe(),
            element = %ctx.node.display_name(),
            "done"
        );
        Ok(())
    }
}

/// Swallow a cosmetic failure unless it is fatal
fn cosmetic(session: &Session, what: &str, result: PagebindResult<()>) -> PagebindResult<()> {
    match result {
        Err(err) if !err.is_session_lost() => {
            session.reporter().warn(&format!("Could not {what}"), Some(&err));
            Ok(())
        }
        other => other,
    }
}

/// Outlines elements while they are used
#[derive(Debug, Clone, Copy, Default)]
pub struct HighlightListener;

impl Listener for HighlightListener {
    fn name(&self) -> &str {
        "highlight"
    }

    fn before(&self, session: &Session, ctx: &EventContext<'_>) -> PagebindResult<()> {
        cosmetic(session, "highlight element", session.driver().highlight_element(ctx.node))
    }

    fn after(&self, session: &Session, ctx: &EventContext<'_>) -> PagebindResult<()> {
        cosmetic(session, "unhighlight element", session.driver().unhighlight_element(ctx.node))
    }
}

/// Scrolls elements into view before they are used
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrollListener;

impl Listener for ScrollListener {
    fn name(&self) -> &str {
        "scroll"
    }

    fn before(&self, session: &Session, ctx: &EventContext<'_>) -> PagebindResult<()> {
        cosmetic(session, "scroll to element", session.driver().scroll_to_element(ctx.node))
    }
}

/// Waits for the page to settle after writes and actions
#[derive(Debug, Clone, Copy, Default)]
pub struct PageUpdateListener;

impl Listener for PageUpdateListener {
    fn name(&self) -> &str {
        "page-update"
    }

    fn after(&self, session: &Session, _ctx: &EventContext<'_>) -> PagebindResult<()> {
        session.waiter().wait_for_page_update()
    }
}

/// Listener set the factory attaches under `config`
#[must_use]
pub fn default_listeners(config: &FrameworkConfig) -> ListenerSet {
    let mut set = ListenerSet::new();
    let writes = [Event::ChangeValue, Event::Act];

    let logging: Rc<dyn Listener> = Rc::new(LoggingListener);
    set.add_for(&Event::ALL, &logging);

    if config.scroll_into_view {
        let scroll: Rc<dyn Listener> = Rc::new(ScrollListener);
        set.add_for(&writes, &scroll);
    }
    if config.highlight {
        let highlight: Rc<dyn Listener> = Rc::new(HighlightListener);
        set.add_for(&[Event::ChangeValue, Event::Act, Event::ReadValue], &highlight);
    }
    if config.wait_for_page_update {
        let page_update: Rc<dyn Listener> = Rc::new(PageUpdateListener);
        set.add_for(&writes, &page_update);
    }
    set
}
