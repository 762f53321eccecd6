//! Page Object type tokens
//!
//! A page object type implements [`ContainerSpec`] to hand the factory its
//! declarative definition. [`ContainerRef`] is the erased token stored in
//! metadata (alternate contexts, navigation targets) and used as the session
//! cache key.
//!
//! # Example
//!
//! ```ignore
//! struct LoginPage;
//!
//! impl ContainerSpec for LoginPage {
//!     fn definition() -> ContainerDef {
//!         ContainerDef::builder("Login Page")
//!             .css("form#login")
//!             .field(FieldDef::text_input("username").id("user"))
//!             .field(FieldDef::button("submit").css("button[type=submit]").next::<HomePage>())
//!             .build()
//!     }
//! }
//!
//! let login = session.container::<LoginPage>()?;
//! login.change_values(&session, [("username", "bob")])?;
//! ```

use std::fmt;

use crate::metadata::ContainerDef;

/// Static definition of a container type
pub trait ContainerSpec: 'static {
    /// Declarative metadata for this container
    fn definition() -> ContainerDef;
}

/// Erased reference to a container type
#[derive(Clone, Copy)]
pub struct ContainerRef {
    key: &'static str,
    build: fn() -> ContainerDef,
}

impl ContainerRef {
    /// Reference a [`ContainerSpec`] type
    #[must_use]
    pub fn of<T: ContainerSpec>() -> Self {
        Self {
            key: std::any::type_name::<T>(),
            build: T::definition,
        }
    }

    /// Reference a definition function under an explicit key
    #[must_use]
    pub const fn new(key: &'static str, build: fn() -> ContainerDef) -> Self {
        Self { key, build }
    }

    /// Session cache key
    #[must_use]
    pub const fn key(&self) -> &'static str {
        self.key
    }

    /// Produce the definition
    #[must_use]
    pub fn definition(&self) -> ContainerDef {
        (self.build)()
    }
}

impl PartialEq for ContainerRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for ContainerRef {}

impl fmt::Debug for ContainerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContainerRef").field(&self.key).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SearchPage;

    impl ContainerSpec for SearchPage {
        fn definition() -> ContainerDef {
            ContainerDef::builder("Search Page").css("form.search").build()
        }
    }

    #[test]
    fn test_ref_key_is_type_name() {
        let r = ContainerRef::of::<SearchPage>();
        assert!(r.key().ends_with("SearchPage"));
        assert_eq!(r, ContainerRef::of::<SearchPage>());
    }

    #[test]
    fn test_ref_builds_definition() {
        let r = ContainerRef::of::<SearchPage>();
        assert_eq!(r.definition().key(), "Search Page");
    }

    #[test]
    fn test_explicit_key() {
        fn def() -> ContainerDef {
            ContainerDef::builder("Footer").build()
        }
        let r = ContainerRef::new("footer", def);
        assert_eq!(r.key(), "footer");
        assert_eq!(format!("{r:?}"), "ContainerRef(\"footer\")");
    }
}
