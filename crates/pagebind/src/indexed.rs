//! Indexed resolver: one declaration, many numbered instances.
//!
//! ```text
//!   base  .//li[%d]            count() ─► ElementCounter(.//li)   (never cached)
//!     │
//!     ├── index(1)  ─► clone .//li[1]   ┐
//!     ├── index(2)  ─► clone .//li[2]   ├ memoized per index
//!     └── index(-1) ─► index(count())   ┘
//! ```
//!
//! Indexes are 1-based. Negative indexes count from the end and need a live
//! count; positive ones never query the page.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use crate::dispatcher::Event;
use crate::locator::{counting_locator, index_locator};
use crate::node::Node;
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;

struct IndexedInner {
    base: Node,
    clones: RefCell<BTreeMap<usize, Node>>,
}

/// Lazy, memoizing multiplier of a base node by position
#[derive(Clone)]
pub struct IndexedResolver {
    inner: Rc<IndexedInner>,
}

impl IndexedResolver {
    /// Wrap a base node whose locator is an index template
    #[must_use]
    pub fn new(base: Node) -> Self {
        Self {
            inner: Rc::new(IndexedInner {
                base,
                clones: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    /// Declared node
    #[must_use]
    pub fn base(&self) -> &Node {
        &self.inner.base
    }

    /// Number of instances currently on the page
    pub fn count(&self, session: &Session) -> PagebindResult<usize> {
        let base = &self.inner.base;
        let query = base.shallow_copy(counting_locator(&base.locator()));
        session
            .dispatcher()
            .guard(session, base, Event::ReadValue, &[], || {
                session.counter().get_elements_count(&query)
            })
    }

    /// Instance at a 1-based index; negative indexes count from the end
    pub fn index(&self, session: &Session, index: i64) -> PagebindResult<Node> {
        let position = self.normalize(session, index)?;
        Ok(self.resolve(position))
    }

    fn normalize(&self, session: &Session, index: i64) -> PagebindResult<usize> {
        let invalid = || PagebindError::InvalidIndex {
            element: self.inner.base.display_name(),
            index,
        };
        if index == 0 {
            return Err(invalid());
        }
        if index > 0 {
            return usize::try_from(index).map_err(|_| invalid());
        }
        let count = i64::try_from(self.count(session)?).unwrap_or(i64::MAX);
        let position = count + 1 + index;
        if position < 1 {
            return Err(invalid());
        }
        usize::try_from(position).map_err(|_| invalid())
    }

    /// Memoized clone for a normalized position
    pub(crate) fn resolve(&self, position: usize) -> Node {
        if let Some(existing) = self.inner.clones.borrow().get(&position) {
            trace!(element = %self.inner.base.display_name(), position, "indexed cache hit");
            return existing.clone();
        }

        let base = &self.inner.base;
        let clone = base.deep_clone();
        clone.set_locator(index_locator(&base.locator(), position));
        if let Some(name) = base.name() {
            clone.set_name(format!("{name} [{position}]"));
        }
        let _ = self
            .inner
            .clones
            .borrow_mut()
            .insert(position, clone.clone());
        debug!(locator = %clone.locator(), position, "indexed clone created");
        clone
    }

    /// Instances `1..=count()`, re-counting on every call
    pub fn get_all(&self, session: &Session) -> PagebindResult<Vec<Node>> {
        let count = self.count(session)?;
        Ok((1..=count).map(|position| self.resolve(position)).collect())
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

    /// Read every instance
    pub fn read_values(&self, session: &Session) -> PagebindResult<Vec<String>> {
        self.get_all(session)?
            .iter()
            .map(|node| node.read_value(session))
            .collect()
    }

    /// Act on every instance
    pub fn perform_actions(&self, session: &Session) -> PagebindResult<()> {
        for node in self.get_all(session)? {
            node.perform_action(session)?;
        }
        Ok(())
    }

    /// Write the same value into every instance
    pub fn change_values_all(&self, session: &Session, value: &str) -> PagebindResult<()> {
        for node in self.get_all(session)? {
            node.change_value(session, value)?;
        }
        Ok(())
    }

    /// Write `values[i]` into instance `i + 1`
    pub fn change_values<S: AsRef<str>>(
        &self,
        session: &Session,
        values: &[S],
    ) -> PagebindResult<()> {
        for (offset, value) in values.iter().enumerate() {
            self.resolve(offset + 1).change_value(session, value.as_ref())?;
        }
        Ok(())
    }

    /// First instance whose value satisfies `predicate`
    pub fn find_element(
        &self,
        session: &Session,
        predicate: impl Fn(&str) -> bool,
    ) -> PagebindResult<Option<Node>> {
        Ok(self
            .find_index(session, predicate)?
            .map(|position| self.resolve(position)))
    }

    /// Index of the first instance whose value satisfies `predicate`
    pub fn find_index(
        &self,
        session: &Session,
        predicate: impl Fn(&str) -> bool,
    ) -> PagebindResult<Option<usize>> {
        let count = self.count(session)?;
        for position in 1..=count {
            let value = self.resolve(position).read_value(session)?;
            if predicate(&value) {
                return Ok(Some(position));
            }
        }
        Ok(None)
    }

    /// Indexes matching each of `values`, in scan order.
    ///
    /// `values` is consumed as a multiset: every value matches at most one
    /// instance. Fails with the unmatched values if the scan ends first.
    pub fn find_indexes_of_all_values<S: AsRef<str>>(
        &self,
        session: &Session,
        values: &[S],
        matches: impl Fn(&str, &str) -> bool,
    ) -> PagebindResult<Vec<usize>> {
        let mut remaining: Vec<&str> = values.iter().map(AsRef::as_ref).collect();
        let mut found = Vec::new();
        let count = self.count(session)?;

        for position in 1..=count {
            if remaining.is_empty() {
                break;
            }
            let actual = self.resolve(position).read_value(session)?;
            if let Some(slot) = remaining.iter().position(|expected| matches(expected, &actual)) {
                let _ = remaining.remove(slot);
                found.push(position);
            }
        }

        if remaining.is_empty() {
            Ok(found)
        } else {
            Err(PagebindError::NotFound {
                element: self.inner.base.display_name(),
                unmatched: remaining.into_iter().map(str::to_string).collect(),
            })
        }
    }
}

impl fmt::Debug for IndexedResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedResolver")
            .field("base", &self.inner.base)
            .field("cached", &self.inner.clones.borrow().keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::node::ElementType;

    fn session() -> (Rc<MockDriver>, Session) {
        let mock = Rc::new(MockDriver::new());
        let session = Session::builder()
            .collaborators(Rc::clone(&mock))
            .build()
            .unwrap();
        (mock, session)
    }

    fn items(mock: &MockDriver, count: usize) -> IndexedResolver {
        mock.set_count(".//li", count);
        IndexedResolver::new(Node::new(ElementType::Label, ".//li[%d]"))
    }

    mod index_tests {
        use super::*;

        #[test]
        fn test_last_item_locator() {
            let (mock, session) = session();
            let list = items(&mock, 4);
            assert_eq!(list.index(&session, -1).unwrap().locator(), ".//li[4]");
        }

        #[test]
        fn test_negative_normalization() {
            let (mock, session) = session();
            let list = items(&mock, 5);
            let last = list.index(&session, -1).unwrap();
            let first = list.index(&session, -5).unwrap();
            assert!(last.ptr_eq(&list.index(&session, 5).unwrap()));
            assert!(first.ptr_eq(&list.index(&session, 1).unwrap()));
            assert!(matches!(
                list.index(&session, -6),
                Err(PagebindError::InvalidIndex { index: -6, .. })
            ));
        }

        #[test]
        fn test_zero_always_rejected() {
            let (mock, session) = session();
            let list = items(&mock, 5);
            assert!(matches!(
                list.index(&session, 0),
                Err(PagebindError::InvalidIndex { index: 0, .. })
            ));
            assert!(!mock.was_called("get_elements_count"));
        }

        #[test]
        fn test_memoized_identity() {
            let (mock, session) = session();
            let list = items(&mock, 5);
            let first = list.index(&session, 3).unwrap();
            let second = list.index(&session, 3).unwrap();
            assert!(first.ptr_eq(&second));
            list.clear_cache();
            assert!(!list.index(&session, 3).unwrap().ptr_eq(&first));
        }

        #[test]
        fn test_clone_keeps_context_and_renames() {
            let (mock, session) = session();
            let parent = Node::new(ElementType::Container, "css=ul");
            let base = Node::new(ElementType::Label, ".//li[%d]");
            base.set_context(&parent);
            base.set_name("Item");
            mock.set_count("css=ul > .//li", 2);
            let list = IndexedResolver::new(base);

            let second = list.index(&session, 2).unwrap();
            assert_eq!(second.display_name(), "Item [2]");
            assert_eq!(second.path_display(), "css=ul > .//li[2]");
            assert_eq!(list.count(&session).unwrap(), 2);
        }

        #[test]
        fn test_missing_placeholder_prefixes_index() {
            let (_mock, session) = session();
            let list = IndexedResolver::new(Node::new(ElementType::Label, "css=li"));
            assert_eq!(list.index(&session, 3).unwrap().locator(), "#3#css=li");
        }

        #[test]
        fn test_get_all_recounts() {
            let (mock, session) = session();
            let list = items(&mock, 2);
            assert_eq!(list.get_all(&session).unwrap().len(), 2);
            mock.set_count(".//li", 3);
            assert_eq!(list.get_all(&session).unwrap().len(), 3);
            assert_eq!(list.cached_len(), 3);
        }
    }

    mod bulk_tests {
        use super::*;

        fn inputs(mock: &MockDriver, count: usize) -> IndexedResolver {
            mock.set_count(".//input", count);
            IndexedResolver::new(Node::new(ElementType::TextInput, ".//input[%d]"))
        }

        #[test]
        fn test_change_values_positional() {
            let (mock, session) = session();
            let list = inputs(&mock, 3);
            list.change_values(&session, &["a", "b"]).unwrap();
            assert_eq!(mock.attribute(".//input[1]", "value").as_deref(), Some("a"));
            assert_eq!(mock.attribute(".//input[2]", "value").as_deref(), Some("b"));
            assert_eq!(mock.attribute(".//input[3]", "value"), None);
        }

        #[test]
        fn test_change_all_and_read() {
            let (mock, session) = session();
            let list = inputs(&mock, 2);
            list.change_values_all(&session, "z").unwrap();
            assert_eq!(list.read_values(&session).unwrap(), vec!["z", "z"]);
        }

        #[test]
        fn test_perform_actions() {
            let (mock, session) = session();
            let list = IndexedResolver::new(Node::new(
                ElementType::Button,
                "css=button:nth-of-type(%d)",
            ));
            // bare placeholder counts with a wildcard
            mock.set_count("css=button:nth-of-type(*)", 3);
            list.perform_actions(&session).unwrap();
            assert_eq!(mock.call_count("click_on_element"), 3);
        }
    }

    mod search_tests {
        use super::*;

        fn fruits(mock: &MockDriver) -> IndexedResolver {
            let list = items(mock, 4);
            for (i, fruit) in ["apple", "pear", "apple", "plum"].iter().enumerate() {
                mock.set_attribute(&format!(".//li[{}]", i + 1), "textContent", fruit);
            }
            list
        }

        #[test]
        fn test_find_index_and_element() {
            let (mock, session) = session();
            let list = fruits(&mock);
            assert_eq!(list.find_index(&session, |v| v == "pear").unwrap(), Some(2));
            assert_eq!(list.find_index(&session, |v| v == "kiwi").unwrap(), None);
            let plum = list.find_element(&session, |v| v.starts_with("pl")).unwrap().unwrap();
            assert_eq!(plum.locator(), ".//li[4]");
        }

        #[test]
        fn test_find_all_values_consumes_multiset() {
            let (mock, session) = session();
            let list = fruits(&mock);
            let found = list
                .find_indexes_of_all_values(&session, &["plum", "apple", "apple"], |e, a| e == a)
                .unwrap();
            assert_eq!(found, vec![1, 3, 4]);
        }

        #[test]
        fn test_find_all_values_reports_unmatched() {
            let (mock, session) = session();
            let list = fruits(&mock);
            let err = list
                .find_indexes_of_all_values(&session, &["pear", "pear", "kiwi"], |e, a| e == a)
                .unwrap_err();
            match err {
                PagebindError::NotFound { unmatched, .. } => {
                    assert_eq!(unmatched, vec!["pear", "kiwi"]);
                }
                other => panic!("unexpected error: {other}"),
            }
        }
    }

    mod index_property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_negative_index_mirrors_positive(count in 1usize..20, back in 1usize..20) {
                prop_assume!(back <= count);
                let (mock, session) = session();
                let list = items(&mock, count);
                let from_end = list.index(&session, -(back as i64)).unwrap();
                let from_start = list.index(&session, (count + 1 - back) as i64).unwrap();
                prop_assert!(from_end.ptr_eq(&from_start));
            }
        }
    }
}
