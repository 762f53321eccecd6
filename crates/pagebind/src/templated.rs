//! Templated resolver: one declaration, many argument-keyed instances.
//!
//! The base locator is a printf-style template (`.//option[@value='%s']`);
//! each distinct argument tuple yields one memoized clone.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::locator::format_template;
use crate::node::Node;
use crate::result::PagebindResult;

struct TemplatedInner {
    base: Node,
    clones: RefCell<HashMap<Vec<String>, Node>>,
}

/// Lazy, memoizing multiplier of a base node by substitution arguments
#[derive(Clone)]
pub struct TemplatedResolver {
    inner: Rc<TemplatedInner>,
}

impl TemplatedResolver {
    /// Wrap a base node whose locator is a format template
    #[must_use]
    pub fn new(base: Node) -> Self {
        Self {
            inner: Rc::new(TemplatedInner {
                base,
                clones: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Declared node
    #[must_use]
    pub fn base(&self) -> &Node {
        &self.inner.base
    }

    /// Instance for an argument tuple, compared by value
    pub fn resolve<S: AsRef<str>>(&self, args: &[S]) -> PagebindResult<Node> {
        let key: Vec<String> = args.iter().map(|a| a.as_ref().to_string()).collect();
        if let Some(existing) = self.inner.clones.borrow().get(&key) {
            trace!(element = %self.inner.base.display_name(), ?key, "templated cache hit");
            return Ok(existing.clone());
        }

        let base = &self.inner.base;
        let locator = format_template(&base.locator(), &key)?;
        let clone = base.deep_clone();
        clone.set_locator(locator);
        if let Some(name) = base.name() {
            clone.set_name(format!("{name} [{}]", key.join(", ")));
        }
        debug!(locator = %clone.locator(), "templated clone created");
        let _ = self.inner.clones.borrow_mut().insert(key, clone.clone());
        Ok(clone)
    }

    /// Number of memoized clones
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.inner.clones.borrow().len()
    }

    /// Forget every memoized clone
    pub fn clear_cache(&self) {
        self.inner.clones.borrow_mut().clear();
    }
}

impl fmt::Debug for TemplatedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplatedResolver")
            .field("base", &self.inner.base)
            .field("cached", &self.cached_len())
            .finish()
    }
}
