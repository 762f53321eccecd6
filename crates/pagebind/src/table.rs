//! Tables: indexed row containers with named cell columns.
//!
//! ```ignore
//! let users = Table::builder("Users")
//!     .css("table#users")
//!     .rows(".//tbody/tr[%d]")
//!     .column("name", "./td[1]")
//!     .column("email", "./td[2]")
//!     .build()?;
//!
//! let row = users.find_row_index(&session, "email", |v| v.ends_with("@example.org"))?;
//! ```

use indexmap::IndexMap;

use crate::container::Container;
use crate::indexed::IndexedResolver;
use crate::locator::is_blank;
use crate::node::{ElementType, Node};
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;

/// Builder for [`Table`]
#[derive(Debug, Clone)]
pub struct TableBuilder {
    name: String,
    locator: String,
    rows: Option<String>,
    columns: Vec<(String, ElementType, String)>,
}

impl TableBuilder {
    /// Set the table locator
    #[must_use]
    pub fn locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    /// Set a CSS table locator
    #[must_use]
    pub fn css(self, selector: &str) -> Self {
        self.locator(format!("css={selector}"))
    }

    /// Row locator template, relative to the table
    #[must_use]
    pub fn rows(mut self, template: impl Into<String>) -> Self {
        self.rows = Some(template.into());
        self
    }

    /// Text column with a cell locator relative to the row
    #[must_use]
    pub fn column(self, name: impl Into<String>, cell: impl Into<String>) -> Self {
        self.typed_column(name, ElementType::Label, cell)
    }

    /// Column of a specific element type
    #[must_use]
    pub fn typed_column(
        mut self,
        name: impl Into<String>,
        element_type: ElementType,
        cell: impl Into<String>,
    ) -> Self {
        self.columns.push((name.into(), element_type, cell.into()));
        self
    }

    /// Build the table
    pub fn build(self) -> PagebindResult<Table> {
        let rows = self
            .rows
            .filter(|r| !is_blank(r))
            .ok_or_else(|| PagebindError::configuration(&self.name, "no row locator declared"))?;
        if self.columns.is_empty() {
            return Err(PagebindError::configuration(&self.name, "no columns declared"));
        }

        let root = Container::new(self.name.clone());
        root.node().set_name(self.name.clone());
        root.node().set_locator(self.locator);

        let row = Container::new(format!("{} row", self.name));
        row.node().set_name(format!("{} row", self.name));
        row.node().set_locator(rows);
        for (column, element_type, cell) in self.columns {
            let node = Node::new(element_type, cell);
            node.set_name(column.clone());
            row.add_element(&column, node);
        }
        row.node().set_context(root.node());

        Ok(Table {
            rows: IndexedResolver::new(row.node().clone()),
            root,
        })
    }
}

/// Table of indexed rows
#[derive(Debug, Clone)]
pub struct Table {
    root: Container,
    rows: IndexedResolver,
}

impl Table {
    /// Start describing a table
    #[must_use]
    pub fn builder(name: impl Into<String>) -> TableBuilder {
        TableBuilder {
            name: name.into(),
            locator: String::new(),
            rows: None,
            columns: Vec::new(),
        }
    }

    /// The table's own container
    #[must_use]
    pub const fn container(&self) -> &Container {
        &self.root
    }

    /// Scope the table within another node
    pub fn set_context(&self, context: &Node) {
        self.root.node().set_context(context);
    }

    /// Row resolver
    #[must_use]
    pub const fn rows(&self) -> &IndexedResolver {
        &self.rows
    }

    /// Number of rows on the page
    pub fn row_count(&self, session: &Session) -> PagebindResult<usize> {
        self.rows.count(session)
    }

    /// Row at a 1-based index; negative indexes count from the end
    pub fn row(&self, session: &Session, index: i64) -> PagebindResult<Container> {
        let node = self.rows.index(session, index)?;
        node.as_container()
            .ok_or_else(|| PagebindError::configuration(self.root.key(), "row is not a container"))
    }

    /// Every row read into a column map
    pub fn read_rows(&self, session: &Session) -> PagebindResult<Vec<IndexMap<String, String>>> {
        self.rows
            .get_all(session)?
            .iter()
            .filter_map(Node::as_container)
            .map(|row| row.read_values(session))
            .collect()
    }

    /// Values of one column, top to bottom
    pub fn column_values(&self, session: &Session, column: &str) -> PagebindResult<Vec<String>> {
        let mut values = Vec::new();
        for row in self.rows.get_all(session)?.iter().filter_map(Node::as_container) {
            values.push(row.get_element(column)?.read_value(session)?);
        }
        Ok(values)
    }

    /// 1-based index of the first row whose `column` satisfies `predicate`
    pub fn find_row_index(
        &self,
        session: &Session,
        column: &str,
        predicate: impl Fn(&str) -> bool,
    ) -> PagebindResult<Option<usize>> {
        let rows = self.rows.get_all(session)?;
        for (offset, row) in rows.iter().filter_map(Node::as_container).enumerate() {
            if predicate(&row.get_element(column)?.read_value(session)?) {
                return Ok(Some(offset + 1));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use std::rc::Rc;

    fn session() -> (Rc<MockDriver>, Session) {
        let mock = Rc::new(MockDriver::new());
        let session = Session::builder()
            .collaborators(Rc::clone(&mock))
            .build()
            .unwrap();
        (mock, session)
    }

    fn users(mock: &MockDriver) -> Table {
        mock.set_count("css=table > .//tr", 2);
        let rows = [("ann", "ann@example.org"), ("bob", "bob@example.com")];
        for (i, (name, email)) in rows.iter().enumerate() {
            let row = format!("css=table > .//tr[{}]", i + 1);
            mock.set_attribute(&format!("{row} > ./td[1]"), "textContent", name);
            mock.set_attribute(&format!("{row} > ./td[2]"), "textContent", email);
        }
        Table::builder("Users")
            .css("table")
            .rows(".//tr[%d]")
            .column("name", "./td[1]")
            .column("email", "./td[2]")
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_rows_and_columns() {
        assert!(Table::builder("T").column("a", "td").build().is_err());
        assert!(Table::builder("T").rows("tr[%d]").build().is_err());
    }

    #[test]
    fn test_row_count_and_row() {
        let (mock, session) = session();
        let table = users(&mock);
        assert_eq!(table.row_count(&session).unwrap(), 2);
        let last = table.row(&session, -1).unwrap();
        assert_eq!(last.node().path_display(), "css=table > .//tr[2]");
        assert_eq!(
            last.get_element("email").unwrap().read_value(&session).unwrap(),
            "bob@example.com"
        );
    }

    #[test]
    fn test_read_rows_and_columns() {
        let (mock, session) = session();
        let table = users(&mock);
        let rows = table.read_rows(&session).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get("name").map(String::as_str), Some("ann"));
        assert_eq!(
            table.column_values(&session, "name").unwrap(),
            vec!["ann", "bob"]
        );
    }

    #[test]
    fn test_find_row_index() {
        let (mock, session) = session();
        let table = users(&mock);
        let found = table
            .find_row_index(&session, "email", |v| v.ends_with(".com"))
            .unwrap();
        assert_eq!(found, Some(2));
        assert!(table.find_row_index(&session, "phone", |_| true).is_err());
    }
}
