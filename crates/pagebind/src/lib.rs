//! Pagebind: Declarative Page Objects for Browser UI Testing
//!
//! Pagebind turns declarative page-object definitions into a live graph of
//! addressable UI nodes. Each node knows its locator and its parent context,
//! so the full locator path is computed by walking the chain. Every user-level
//! interaction goes through a listener pipeline that adds logging,
//! highlighting, scrolling and page-update waits, and turns collaborator
//! failures into uniform, enriched errors.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    PAGEBIND Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────┐            │
//! │   │ Container  │    │ Metadata   │    │ Container  │            │
//! │   │ Def        │───►│ Factory    │───►│ Graph      │            │
//! │   │ (builder)  │    │ (Session)  │    │ (Nodes)    │            │
//! │   └────────────┘    └────────────┘    └─────┬──────┘            │
//! │                                             │                   │
//! │   ┌────────────┐    ┌────────────┐    ┌─────▼──────┐            │
//! │   │ Driver /   │◄───│ Dispatcher │◄───│ Element    │            │
//! │   │ Waiter     │    │ (listeners)│    │ operation  │            │
//! │   └────────────┘    └────────────┘    └────────────┘            │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use pagebind::prelude::*;
//!
//! let session = Session::builder().collaborators(driver).build()?;
//! let login = session.container::<LoginPage>()?;
//! login.change_values(&session, [("username", "bob"), ("password", "secret")])?;
//! let home = login.get_element("submit")?.perform_action_and_next(&session)?;
//! ```

#![warn(missing_docs)]
#![cfg_attr(test, allow(clippy::large_stack_arrays, clippy::large_stack_frames))]

/// Framework configuration (YAML file plus environment overrides)
pub mod config;

/// Container registry of named elements
pub mod container;

/// Listener pipeline and error normalization
pub mod dispatcher;

/// Collaborator traits and the in-memory test double
pub mod driver;

/// Capability operations on nodes
pub mod element;

/// Builds container graphs from definitions
pub mod factory;

/// Index-addressed element multiplication
pub mod indexed;

/// Default listeners
pub mod listeners;

/// Locator grammar and placeholder substitution
pub mod locator;

/// Tracing subscriber setup
pub mod logging;

/// Declarative container and field metadata
pub mod metadata;

/// Locatable node handle
pub mod node;

/// Page object type tokens
pub mod page_object;

/// Error types
pub mod result;

/// Explicit execution context
pub mod session;

/// Tables of indexed rows
pub mod table;

/// Argument-addressed element multiplication
pub mod templated;

pub use config::FrameworkConfig;
pub use container::Container;
pub use dispatcher::{Dispatcher, Event, EventContext, Listener, ListenerSet};
pub use driver::{
    Driver, ElementCounter, MockDriver, MockFailure, Reporter, TracingReporter, Waiter,
};
pub use element::Element;
pub use factory::MetadataFactory;
pub use indexed::IndexedResolver;
pub use locator::{Selector, Strategy, TypedLocators};
pub use metadata::{
    Condition, ContainerDef, ContainerMeta, FieldDef, FieldKind, FieldMeta, Variants,
};
pub use node::{Capabilities, ElementType, Node, Reader};
pub use page_object::{ContainerRef, ContainerSpec};
pub use result::{PagebindError, PagebindResult};
pub use session::{Environment, Session, SessionBuilder};
pub use table::{Table, TableBuilder};
pub use templated::TemplatedResolver;

/// Prelude for convenient imports
pub mod prelude {
    pub use super::config::*;
    pub use super::container::*;
    pub use super::dispatcher::*;
    pub use super::driver::*;
    pub use super::element::*;
    pub use super::factory::*;
    pub use super::indexed::*;
    pub use super::listeners::*;
    pub use super::locator::*;
    pub use super::metadata::*;
    pub use super::node::*;
    pub use super::page_object::*;
    pub use super::result::*;
    pub use super::session::*;
    pub use super::table::*;
    pub use super::templated::*;
}
