//! Session: the explicit execution context.
//!
//! A session owns one independent page graph: its container cache, resolver
//! caches (through the containers) and dispatcher state. Nodes are
//! reference-counted without atomics, so a session and everything it built
//! stay on the thread that created them; parallel test runs create one
//! session each.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use tracing::{debug, info_span};
use uuid::Uuid;

use crate::config::FrameworkConfig;
use crate::container::Container;
use crate::dispatcher::{Dispatcher, ListenerSet};
use crate::driver::{Driver, ElementCounter, Reporter, TracingReporter, Waiter};
use crate::factory::MetadataFactory;
use crate::listeners::default_listeners;
use crate::metadata::{Condition, ContainerDef};
use crate::page_object::{ContainerRef, ContainerSpec};
use crate::result::{PagebindError, PagebindResult};

/// Live environment properties used to pick conditional metadata variants
#[derive(Debug, Clone, Default)]
pub struct Environment {
    properties: BTreeMap<String, String>,
    use_process_env: bool,
}

impl Environment {
    /// Environment backed by explicit properties, then the process environment
    #[must_use]
    pub fn new(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            use_process_env: true,
        }
    }

    /// Environment backed by explicit properties only
    #[must_use]
    pub fn isolated(properties: BTreeMap<String, String>) -> Self {
        Self {
            properties,
            use_process_env: false,
        }
    }

    /// Value of a property
    #[must_use]
    pub fn property(&self, name: &str) -> Option<String> {
        self.properties.get(name).cloned().or_else(|| {
            self.use_process_env
                .then(|| std::env::var(name).ok())
                .flatten()
        })
    }

    /// Whether a variant condition holds
    #[must_use]
    pub fn matches(&self, condition: &Condition) -> bool {
        self.property(&condition.property)
            .is_some_and(|value| value == condition.value)
    }
}

/// Builder for [`Session`]
#[derive(Default)]
pub struct SessionBuilder {
    driver: Option<Rc<dyn Driver>>,
    counter: Option<Rc<dyn ElementCounter>>,
    waiter: Option<Rc<dyn Waiter>>,
    reporter: Option<Rc<dyn Reporter>>,
    config: FrameworkConfig,
    environment: Option<Environment>,
}

impl SessionBuilder {
    /// Set the driver
    #[must_use]
    pub fn driver(mut self, driver: Rc<dyn Driver>) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Set the element counter
    #[must_use]
    pub fn counter(mut self, counter: Rc<dyn ElementCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    /// Set the waiter
    #[must_use]
    pub fn waiter(mut self, waiter: Rc<dyn Waiter>) -> Self {
        self.waiter = Some(waiter);
        self
    }

    /// Set the reporter; defaults to [`TracingReporter`]
    #[must_use]
    pub fn reporter(mut self, reporter: Rc<dyn Reporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Use one object as driver, counter and waiter
    #[must_use]
    pub fn collaborators<C>(mut self, collaborators: Rc<C>) -> Self
    where
        C: Driver + ElementCounter + Waiter + 'static,
    {
        self.driver = Some(Rc::clone(&collaborators) as Rc<dyn Driver>);
        self.counter = Some(Rc::clone(&collaborators) as Rc<dyn ElementCounter>);
        self.waiter = Some(collaborators as Rc<dyn Waiter>);
        self
    }

    /// Set the configuration
    #[must_use]
    pub fn config(mut self, config: FrameworkConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the environment derived from the configuration
    #[must_use]
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Build the session
    pub fn build(self) -> PagebindResult<Session> {
        let missing =
            |what: &str| PagebindError::configuration("session", format!("no {what} set"));
        let driver = self.driver.ok_or_else(|| missing("driver"))?;
        let counter = self.counter.ok_or_else(|| missing("element counter"))?;
        let waiter = self.waiter.ok_or_else(|| missing("waiter"))?;
        let reporter = self
            .reporter
            .unwrap_or_else(|| Rc::new(TracingReporter) as Rc<dyn Reporter>);
        let environment = self
            .environment
            .unwrap_or_else(|| Environment::new(self.config.environment.clone()));
        let defaults = default_listeners(&self.config);

        let session = Session {
            id: Uuid::new_v4(),
            driver,
            counter,
            waiter,
            reporter,
            config: self.config,
            environment,
            dispatcher: Dispatcher::new(),
            default_listeners: defaults,
            containers: RefCell::new(HashMap::new()),
            building: RefCell::new(HashSet::new()),
        };
        debug!(session = %session.id, "session created");
        Ok(session)
    }
}

impl std::fmt::Debug for SessionBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionBuilder")
            .field("driver", &self.driver.is_some())
            .field("counter", &self.counter.is_some())
            .field("waiter", &self.waiter.is_some())
            .field("reporter", &self.reporter.is_some())
            .field("config", &self.config)
            .finish()
    }
}

/// Execution context passed to every engine entry point
pub struct Session {
    id: Uuid,
    driver: Rc<dyn Driver>,
    counter: Rc<dyn ElementCounter>,
    waiter: Rc<dyn Waiter>,
    reporter: Rc<dyn Reporter>,
    config: FrameworkConfig,
    environment: Environment,
    dispatcher: Dispatcher,
    default_listeners: ListenerSet,
    containers: RefCell<HashMap<String, Container>>,
    building: RefCell<HashSet<String>>,
}

impl Session {
    /// Start building a session
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::default()
    }

    /// Unique session id
    #[must_use]
    pub const fn id(&self) -> Uuid {
        self.id
    }

    /// Driver collaborator
    #[must_use]
    pub fn driver(&self) -> &dyn Driver {
        self.driver.as_ref()
    }

    /// Element counter collaborator
    #[must_use]
    pub fn counter(&self) -> &dyn ElementCounter {
        self.counter.as_ref()
    }

    /// Waiter collaborator
    #[must_use]
    pub fn waiter(&self) -> &dyn Waiter {
        self.waiter.as_ref()
    }

    /// Reporter collaborator
    #[must_use]
    pub fn reporter(&self) -> &dyn Reporter {
        self.reporter.as_ref()
    }

    /// Active configuration
    #[must_use]
    pub const fn config(&self) -> &FrameworkConfig {
        &self.config
    }

    /// Live environment
    #[must_use]
    pub const fn environment(&self) -> &Environment {
        &self.environment
    }

    /// Dispatch state
    #[must_use]
    pub const fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// Listeners the factory attaches to new elements
    #[must_use]
    pub const fn default_listeners(&self) -> &ListenerSet {
        &self.default_listeners
    }

    /// Container for a page object type, built once per session
    pub fn container<T: ContainerSpec>(&self) -> PagebindResult<Container> {
        self.resolve(&ContainerRef::of::<T>())
    }

    /// Container for an erased type token, built once per session
    pub fn resolve(&self, target: &ContainerRef) -> PagebindResult<Container> {
        self.cached_or_build(target.key(), || target.definition())
    }

    /// Container for a definition, built once per definition.
    ///
    /// The cache key is the definition's [`uid`](ContainerDef::uid), so clones
    /// share a container while separately built definitions never do, even
    /// when their keys match.
    pub fn container_from(&self, def: &ContainerDef) -> PagebindResult<Container> {
        self.cached_or_build(&def.uid().to_string(), || def.clone())
    }

    fn cached_or_build(
        &self,
        identity: &str,
        definition: impl FnOnce() -> ContainerDef,
    ) -> PagebindResult<Container> {
        if let Some(existing) = self.containers.borrow().get(identity) {
            return Ok(existing.clone());
        }

        let def = definition();
        if !self.building.borrow_mut().insert(identity.to_string()) {
            return Err(PagebindError::configuration(
                def.key(),
                "container is its own context (cyclic context declaration)",
            ));
        }

        let span = info_span!("build_container", session = %self.id, container = def.key());
        let _entered = span.enter();
        let built = MetadataFactory::new(self).build_as(identity, &def);
        let _ = self.building.borrow_mut().remove(identity);
        let container = built?;

        let _ = self
            .containers
            .borrow_mut()
            .insert(identity.to_string(), container.clone());
        debug!(container = def.key(), identity, "container cached");
        Ok(container)
    }

    /// Whether a container is cached under `key`
    #[must_use]
    pub fn is_cached(&self, key: &str) -> bool {
        self.containers.borrow().contains_key(key)
    }

    /// Drop every cached container.
    ///
    /// Containers already handed out keep the alternate contexts they were
    /// scoped to (see [`Container::hold_context`]); the next lookup builds
    /// fresh instances.
    pub fn reset(&self) {
        self.containers.borrow_mut().clear();
        debug!(session = %self.id, "session reset");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("containers", &self.containers.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::MockDriver;
    use crate::metadata::FieldDef;

    struct Home;

    impl ContainerSpec for Home {
        fn definition() -> ContainerDef {
            ContainerDef::builder("Home")
                .css("main")
                .field(FieldDef::label("title").css("h1"))
                .build()
        }
    }

    struct Loop;

    impl ContainerSpec for Loop {
        fn definition() -> ContainerDef {
            ContainerDef::builder("Loop").css("div").context::<Loop>().build()
        }
    }

    fn session() -> Session {
        Session::builder()
            .collaborators(Rc::new(MockDriver::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_builder_requires_driver() {
        let err = Session::builder().build().unwrap_err();
        assert!(matches!(err, PagebindError::Configuration { .. }));
    }

    #[test]
    fn test_container_is_cached_per_session() {
        let session = session();
        let first = session.container::<Home>().unwrap();
        let second = session.container::<Home>().unwrap();
        assert!(first.node().ptr_eq(second.node()));
        assert!(session.is_cached(ContainerRef::of::<Home>().key()));
    }

    #[test]
    fn test_sessions_do_not_share_graphs() {
        let a = session().container::<Home>().unwrap();
        let b = session().container::<Home>().unwrap();
        assert!(!a.node().ptr_eq(b.node()));
    }

    #[test]
    fn test_reset_rebuilds() {
        let session = session();
        let first = session.container::<Home>().unwrap();
        session.reset();
        let second = session.container::<Home>().unwrap();
        assert!(!first.node().ptr_eq(second.node()));
    }

    #[test]
    fn test_definitions_sharing_a_key_get_their_own_containers() {
        let session = session();
        let a = ContainerDef::builder("Home").css("main.a").build();
        let b = ContainerDef::builder("Home").css("main.b").build();
        let first = session.container_from(&a).unwrap();
        let second = session.container_from(&b).unwrap();
        assert_eq!(first.node().locator(), "css=main.a");
        assert_eq!(second.node().locator(), "css=main.b");
        assert!(session
            .container_from(&a.clone())
            .unwrap()
            .node()
            .ptr_eq(first.node()));
    }

    #[test]
    fn test_cyclic_context_is_rejected() {
        let err = session().container::<Loop>().unwrap_err();
        assert!(matches!(err, PagebindError::Configuration { .. }));
    }

    #[test]
    fn test_environment_lookup() {
        let mut props = BTreeMap::new();
        let _ = props.insert("profile".to_string(), "mobile".to_string());
        let env = Environment::isolated(props);
        assert!(env.matches(&Condition::new("profile", "mobile")));
        assert!(!env.matches(&Condition::new("profile", "desktop")));
        assert!(!env.matches(&Condition::new("missing", "x")));
    }
}
