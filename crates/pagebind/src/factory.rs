//! Metadata factory: builds a wired container graph from a [`ContainerDef`].
//!
//! ```text
//!   ContainerDef ──► container meta (variant precedence) ──► Container
//!        │
//!        └─ fields ──► declared ids matched first ──► per field:
//!              locator (typed precedence) ─► reuse or instantiate
//!              ─► context ─► listeners ─► name/optional/lookup/next/reader
//!              ─► wrap (indexed / templated) ─► register
//! ```
//!
//! Every failure is a configuration error naming the field and container.

use std::cell::RefCell;

use tracing::{debug, trace};

use crate::container::Container;
use crate::element::Element;
use crate::indexed::IndexedResolver;
use crate::locator::{is_blank, sanitize};
use crate::metadata::{ContainerDef, FieldDef, FieldMeta};
use crate::node::Node;
use crate::result::{PagebindError, PagebindResult};
use crate::session::Session;
use crate::templated::TemplatedResolver;

/// Builds containers for one session
#[derive(Debug)]
pub struct MetadataFactory<'s> {
    session: &'s Session,
    building: RefCell<Vec<String>>,
}

impl<'s> MetadataFactory<'s> {
    /// Create a factory bound to a session
    #[must_use]
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            building: RefCell::new(Vec::new()),
        }
    }

    /// Build a container and every declared field
    pub fn build(&self, def: &ContainerDef) -> PagebindResult<Container> {
        self.build_as(&def.uid().to_string(), def)
    }

    /// Build a container under an explicit identity.
    ///
    /// `identity` names the container type, not its display key; a container
    /// may only nest another one with a different identity.
    pub fn build_as(&self, identity: &str, def: &ContainerDef) -> PagebindResult<Container> {
        if self.building.borrow().iter().any(|open| open == identity) {
            return Err(PagebindError::configuration(def.key(), "container nests itself"));
        }
        self.building.borrow_mut().push(identity.to_string());
        let result = self.build_unguarded(def);
        let _ = self.building.borrow_mut().pop();
        result
    }

    fn build_unguarded(&self, def: &ContainerDef) -> PagebindResult<Container> {
        let container = Container::new(def.key());
        let node = container.node();

        if let Some(meta) = def.select_meta(self.session.environment()) {
            if let Some(locator) = meta.locators.resolve() {
                node.set_locator(locator);
            }
            if let Some(lookup) = meta.context_lookup {
                node.set_use_context_lookup(lookup);
            }
            node.set_name(meta.name.clone().unwrap_or_else(|| def.key().to_string()));
            container.set_url(meta.url.clone());
            if let Some(target) = &meta.context {
                let context = self.session.resolve(target)?;
                node.set_context(context.node());
                container.hold_context(&context);
            }
        } else {
            node.set_name(def.key());
        }
        self.attach_default_listeners(node);

        self.initialize(&container, def)?;
        debug!(container = def.key(), elements = container.len(), "container built");
        Ok(container)
    }

    /// Wire every field of `def` into `container`
    pub fn initialize(&self, container: &Container, def: &ContainerDef) -> PagebindResult<()> {
        for (field, id) in Self::assign_ids(def)? {
            self.wire(container, def, field, &id)?;
        }
        Ok(())
    }

    /// Declared ids claim their fields first; the rest use derived ids.
    /// Fields keep their declaration order.
    fn assign_ids(def: &ContainerDef) -> PagebindResult<Vec<(&FieldDef, String)>> {
        let fields = def.fields();
        let mut ids: Vec<Option<String>> = vec![None; fields.len()];

        for declared in def.ids() {
            let wanted = sanitize(declared);
            let slot = fields
                .iter()
                .enumerate()
                .position(|(i, field)| {
                    ids[i].is_none()
                        && (sanitize(&field.derived_id()) == wanted
                            || sanitize(field.field_name()) == wanted)
                })
                .ok_or_else(|| {
                    PagebindError::configuration(
                        def.key(),
                        format!("declared id '{declared}' matches no field"),
                    )
                })?;
            ids[slot] = Some(declared.clone());
        }

        Ok(fields
            .iter()
            .zip(ids)
            .map(|(field, id)| (field, id.unwrap_or_else(|| field.derived_id())))
            .collect())
    }

    fn wire(
        &self,
        container: &Container,
        def: &ContainerDef,
        field: &FieldDef,
        id: &str,
    ) -> PagebindResult<()> {
        let meta = field
            .select_meta(self.session.environment())
            .cloned()
            .unwrap_or_default();
        let locator = meta.locators.resolve();
        let fail = |message: String| {
            PagebindError::configuration(
                def.key(),
                format!("field '{}': {message}", field.field_name()),
            )
        };

        let element = match field.existing() {
            Some(existing) => {
                let node = existing.node();
                if is_blank(&node.locator()) {
                    match &locator {
                        Some(locator) => node.set_locator(locator.clone()),
                        None if !node.is_container() => {
                            return Err(fail("no locator declared".to_string()))
                        }
                        None => {}
                    }
                }
                trace!(field = field.field_name(), "reusing existing instance");
                existing.clone()
            }
            None => {
                let node = self
                    .instantiate(field, locator.as_deref())
                    .map_err(|err| match err {
                        PagebindError::Configuration { container, message }
                            if container.is_empty() =>
                        {
                            fail(message)
                        }
                        other => other,
                    })?;
                Element::Single(node)
            }
        };

        let node = element.node().clone();
        // a freshly built nested container keeps its own declared context
        let keeps_context =
            field.existing().is_none() && node.is_container() && node.context().is_some();
        match &meta.context {
            Some(target) => {
                let context = self.session.resolve(target)?;
                node.set_context(context.node());
                container.hold_context(&context);
            }
            None if keeps_context => {}
            None => node.set_context(container.node()),
        }
        self.attach_default_listeners(&node);
        Self::apply_meta(&node, field, &meta);

        let element = Self::wrap(element, field);
        if let Element::Single(single) = &element {
            if let Some(nested) = single.as_container() {
                container.add_nested_container(&nested);
            }
        }
        trace!(container = def.key(), id, locator = %node.locator(), "field wired");
        container.register(id, element, false);
        Ok(())
    }

    fn instantiate(&self, field: &FieldDef, locator: Option<&str>) -> PagebindResult<Node> {
        if let Some(target) = field.kind().container() {
            let nested = self.build_as(target.key(), &target.definition())?;
            if let Some(locator) = locator {
                nested.node().set_locator(locator);
            }
            return Ok(nested.node().clone());
        }

        let element_type = field
            .element_type()
            .ok_or_else(|| PagebindError::configuration("", "no element type declared"))?;
        let locator = locator
            .filter(|l| !is_blank(l))
            .ok_or_else(|| PagebindError::configuration("", "no locator declared"))?;
        Ok(Node::new(element_type, locator))
    }

    fn apply_meta(node: &Node, field: &FieldDef, meta: &FieldMeta) {
        let default_name = if node.is_container() {
            node.name()
        } else {
            None
        };
        node.set_name(
            meta.name
                .clone()
                .or(default_name)
                .unwrap_or_else(|| field.field_name().to_string()),
        );
        node.set_optional(meta.optional.unwrap_or(false));
        match meta.context_lookup {
            Some(lookup) => node.set_use_context_lookup(lookup),
            None if node.is_container() => {}
            None => node.set_use_context_lookup(true),
        }
        if meta.next.is_some() {
            node.set_next_target(meta.next);
        }
        if let Some(reader) = &meta.reader {
            node.set_reader(reader.clone());
        }
    }

    fn wrap(element: Element, field: &FieldDef) -> Element {
        let kind = field.kind();
        match element {
            Element::Single(node) if kind.is_indexed() => {
                Element::Indexed(IndexedResolver::new(node))
            }
            Element::Single(node) if kind.is_templated() => {
                Element::Templated(TemplatedResolver::new(node))
            }
            other => other,
        }
    }

    fn attach_default_listeners(&self, node: &Node) {
        if self.session.config().listeners_enabled {
            node.attach_listeners(self.session.default_listeners());
        }
    }
}
