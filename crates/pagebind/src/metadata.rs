//! Declarative container and field metadata.
//!
//! Page objects describe themselves with a static [`ContainerDef`] built
//! through a builder; the [`MetadataFactory`](crate::factory::MetadataFactory)
//! turns that description into a wired graph.
//!
//! ```ignore
//! ContainerDef::builder("Search Page")
//!     .css("form.search")
//!     .when("profile", "mobile", |m| m.css("form.search-mobile"))
//!     .field(FieldDef::text_input("query").name("Search query").id("q"))
//!     .field(FieldDef::indexed(ElementType::Link, "results").xpath(".//li[%d]/a"))
//!     .field(FieldDef::templated(ElementType::Dropdown, "filter").xpath(".//option[@value='%s']"))
//!     .build()
//! ```
//!
//! # Variant precedence
//!
//! Both containers and fields may carry several metadata variants, each
//! optionally tagged with an environment property/value [`Condition`]. The
//! first tagged variant whose condition holds wins; otherwise the first
//! untagged variant is used; otherwise there is none.

use uuid::Uuid;

use crate::element::Element;
use crate::locator::{sanitize, Strategy, TypedLocators};
use crate::node::{ElementType, Reader};
use crate::page_object::{ContainerRef, ContainerSpec};
use crate::session::Environment;

/// Environment property/value pair tagging a metadata variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    /// Property name
    pub property: String,
    /// Required value
    pub value: String,
}

impl Condition {
    /// Create a condition
    #[must_use]
    pub fn new(property: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            value: value.into(),
        }
    }
}

/// Ordered metadata variants with contextual precedence
#[derive(Debug, Clone)]
pub struct Variants<M> {
    entries: Vec<(Option<Condition>, M)>,
}

impl<M> Default for Variants<M> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<M: Default> Variants<M> {
    /// The first untagged variant, created on demand
    pub fn default_mut(&mut self) -> &mut M {
        let position = match self.entries.iter().position(|(c, _)| c.is_none()) {
            Some(position) => position,
            None => {
                self.entries.push((None, M::default()));
                self.entries.len() - 1
            }
        };
        &mut self.entries[position].1
    }
}

impl<M> Variants<M> {
    /// Add a tagged variant
    pub fn push_conditional(&mut self, condition: Condition, meta: M) {
        self.entries.push((Some(condition), meta));
    }

    /// Add an untagged variant
    pub fn push_default(&mut self, meta: M) {
        self.entries.push((None, meta));
    }

    /// Pick the variant for the live environment
    #[must_use]
    pub fn select(&self, environment: &Environment) -> Option<&M> {
        self.entries
            .iter()
            .find(|(condition, _)| condition.as_ref().is_some_and(|c| environment.matches(c)))
            .or_else(|| self.entries.iter().find(|(condition, _)| condition.is_none()))
            .map(|(_, meta)| meta)
    }

    /// Number of variants
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no variant is declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Container-level metadata
#[derive(Debug, Clone, Default)]
pub struct ContainerMeta {
    /// Display name
    pub name: Option<String>,
    /// Container locator
    pub locators: TypedLocators,
    /// Page url
    pub url: Option<String>,
    /// Alternate context container
    pub context: Option<ContainerRef>,
    /// Whether ancestor locators are chained
    pub context_lookup: Option<bool>,
}

impl ContainerMeta {
    /// Set the display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set a typed locator
    #[must_use]
    pub fn locator(mut self, strategy: Strategy, value: impl Into<String>) -> Self {
        self.locators.set(strategy, value);
        self
    }

    /// Set the CSS locator
    #[must_use]
    pub fn css(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Css, value)
    }

    /// Set the XPath locator
    #[must_use]
    pub fn xpath(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::XPath, value)
    }

    /// Set the url
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Scope the container within another container type
    #[must_use]
    pub fn context<T: ContainerSpec>(mut self) -> Self {
        self.context = Some(ContainerRef::of::<T>());
        self
    }

    /// Set whether ancestor locators are chained
    #[must_use]
    pub const fn context_lookup(mut self, value: bool) -> Self {
        self.context_lookup = Some(value);
        self
    }
}

/// Static description of a container type
#[derive(Debug, Clone)]
pub struct ContainerDef {
    key: String,
    uid: Uuid,
    meta: Variants<ContainerMeta>,
    fields: Vec<FieldDef>,
    ids: Vec<String>,
}

impl ContainerDef {
    /// Start describing a container
    #[must_use]
    pub fn builder(key: impl Into<String>) -> ContainerDefBuilder {
        ContainerDefBuilder {
            def: Self {
                key: key.into(),
                uid: Uuid::new_v4(),
                meta: Variants::default(),
                fields: Vec::new(),
                ids: Vec::new(),
            },
        }
    }

    /// Container key, also the default display name
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Identity of this definition, shared by its clones.
    ///
    /// Two definitions built separately never share a uid, even with the
    /// same key.
    #[must_use]
    pub const fn uid(&self) -> Uuid {
        self.uid
    }

    /// Declared fields in order
    #[must_use]
    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    /// Explicitly declared identifiers
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Container metadata variants
    #[must_use]
    pub const fn variants(&self) -> &Variants<ContainerMeta> {
        &self.meta
    }

    /// Container metadata for the live environment
    #[must_use]
    pub fn select_meta(&self, environment: &Environment) -> Option<&ContainerMeta> {
        self.meta.select(environment)
    }
}

/// Builder for [`ContainerDef`]
#[derive(Debug, Clone)]
pub struct ContainerDefBuilder {
    def: ContainerDef,
}

impl ContainerDefBuilder {
    fn with_default(mut self, f: impl FnOnce(ContainerMeta) -> ContainerMeta) -> Self {
        let slot = self.def.meta.default_mut();
        *slot = f(std::mem::take(slot));
        self
    }

    /// Set the display name
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.with_default(|m| m.name(name))
    }

    /// Set a typed locator
    #[must_use]
    pub fn locator(self, strategy: Strategy, value: impl Into<String>) -> Self {
        self.with_default(|m| m.locator(strategy, value))
    }

    /// Set the CSS locator
    #[must_use]
    pub fn css(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Css, value)
    }

    /// Set the XPath locator
    #[must_use]
    pub fn xpath(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::XPath, value)
    }

    /// Set the `id=` locator
    #[must_use]
    pub fn id(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Id, value)
    }

    /// Set the url
    #[must_use]
    pub fn url(self, url: impl Into<String>) -> Self {
        self.with_default(|m| m.url(url))
    }

    /// Scope the container within another container type
    #[must_use]
    pub fn context<T: ContainerSpec>(self) -> Self {
        self.with_default(ContainerMeta::context::<T>)
    }

    /// Set whether ancestor locators are chained
    #[must_use]
    pub fn context_lookup(self, value: bool) -> Self {
        self.with_default(|m| m.context_lookup(value))
    }

    /// Add a variant used when `property` equals `value`
    #[must_use]
    pub fn when(
        mut self,
        property: impl Into<String>,
        value: impl Into<String>,
        f: impl FnOnce(ContainerMeta) -> ContainerMeta,
    ) -> Self {
        self.def
            .meta
            .push_conditional(Condition::new(property, value), f(ContainerMeta::default()));
        self
    }

    /// Declare a field
    #[must_use]
    pub fn field(mut self, field: FieldDef) -> Self {
        self.def.fields.push(field);
        self
    }

    /// Declare identifier constants matched against fields before the rest
    #[must_use]
    pub fn ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.def.ids.extend(ids.into_iter().map(Into::into));
        self
    }

    /// Finish the definition
    #[must_use]
    pub fn build(self) -> ContainerDef {
        self.def
    }
}

/// What a field instantiates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Single element
    Element(ElementType),
    /// One declaration, many numbered instances
    Indexed(ElementType),
    /// One declaration, many argument-keyed instances
    Templated(ElementType),
    /// Nested container
    Container(ContainerRef),
    /// Numbered nested containers
    IndexedContainer(ContainerRef),
    /// Type supplied with [`FieldDef::typed`]
    Untyped,
}

impl FieldKind {
    /// Element type carried by the kind
    #[must_use]
    pub const fn element_type(&self) -> Option<ElementType> {
        match self {
            Self::Element(t) | Self::Indexed(t) | Self::Templated(t) => Some(*t),
            Self::Container(_) | Self::IndexedContainer(_) => Some(ElementType::Container),
            Self::Untyped => None,
        }
    }

    /// Whether instances are wrapped in an indexed resolver
    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        matches!(self, Self::Indexed(_) | Self::IndexedContainer(_))
    }

    /// Whether instances are wrapped in a templated resolver
    #[must_use]
    pub const fn is_templated(&self) -> bool {
        matches!(self, Self::Templated(_))
    }

    /// Container type built for this field
    #[must_use]
    pub const fn container(&self) -> Option<ContainerRef> {
        match self {
            Self::Container(r) | Self::IndexedContainer(r) => Some(*r),
            _ => None,
        }
    }
}

/// Per-field metadata; unset options take their defaults at wiring time
#[derive(Debug, Clone, Default)]
pub struct FieldMeta {
    /// Element locator
    pub locators: TypedLocators,
    /// Display name, defaults to the field name
    pub name: Option<String>,
    /// May be absent, defaults to `false`
    pub optional: Option<bool>,
    /// Whether ancestor locators are chained, defaults to `true`
    pub context_lookup: Option<bool>,
    /// Alternate context container, defaults to the declaring container
    pub context: Option<ContainerRef>,
    /// Container reached after acting on the element
    pub next: Option<ContainerRef>,
    /// Read-value reader, defaults to the element type's reader
    pub reader: Option<Reader>,
}

impl FieldMeta {
    /// Set a typed locator
    #[must_use]
    pub fn locator(mut self, strategy: Strategy, value: impl Into<String>) -> Self {
        self.locators.set(strategy, value);
        self
    }

    /// Set the CSS locator
    #[must_use]
    pub fn css(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Css, value)
    }

    /// Set the XPath locator
    #[must_use]
    pub fn xpath(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::XPath, value)
    }

    /// Set the untyped locator
    #[must_use]
    pub fn raw(mut self, value: impl Into<String>) -> Self {
        self.locators.raw = Some(value.into());
        self
    }

    /// Set the display name
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Mark the element as possibly absent
    #[must_use]
    pub const fn optional(mut self, value: bool) -> Self {
        self.optional = Some(value);
        self
    }

    /// Set whether ancestor locators are chained
    #[must_use]
    pub const fn context_lookup(mut self, value: bool) -> Self {
        self.context_lookup = Some(value);
        self
    }

    /// Set the reader
    #[must_use]
    pub fn reader(mut self, reader: Reader) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Container reached after acting on the element
    #[must_use]
    pub fn next<T: ContainerSpec>(mut self) -> Self {
        self.next = Some(ContainerRef::of::<T>());
        self
    }

    /// Scope the element within another container type
    #[must_use]
    pub fn context<T: ContainerSpec>(mut self) -> Self {
        self.context = Some(ContainerRef::of::<T>());
        self
    }
}

/// Declared field of a container
#[derive(Debug, Clone)]
pub struct FieldDef {
    field: String,
    kind: FieldKind,
    id: Option<String>,
    element_type: Option<ElementType>,
    meta: Variants<FieldMeta>,
    instance: Option<Element>,
}

macro_rules! element_ctor {
    ($(#[$doc:meta] $fn:ident => $ty:ident),* $(,)?) => {
        $(
            #[$doc]
            #[must_use]
            pub fn $fn(field: impl Into<String>) -> Self {
                Self::new(field, FieldKind::Element(ElementType::$ty))
            }
        )*
    };
}

impl FieldDef {
    /// Declare a field of any kind
    #[must_use]
    pub fn new(field: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            field: field.into(),
            kind,
            id: None,
            element_type: None,
            meta: Variants::default(),
            instance: None,
        }
    }

    element_ctor! {
        /// Declare a button
        button => Button,
        /// Declare a link
        link => Link,
        /// Declare a label
        label => Label,
        /// Declare a text input
        text_input => TextInput,
        /// Declare a checkbox
        checkbox => Checkbox,
        /// Declare a dropdown
        dropdown => Dropdown,
        /// Declare an image
        image => Image,
    }

    /// Declare an indexed element
    #[must_use]
    pub fn indexed(element_type: ElementType, field: impl Into<String>) -> Self {
        Self::new(field, FieldKind::Indexed(element_type))
    }

    /// Declare a templated element
    #[must_use]
    pub fn templated(element_type: ElementType, field: impl Into<String>) -> Self {
        Self::new(field, FieldKind::Templated(element_type))
    }

    /// Declare a nested container
    #[must_use]
    pub fn container<T: ContainerSpec>(field: impl Into<String>) -> Self {
        Self::new(field, FieldKind::Container(ContainerRef::of::<T>()))
    }

    /// Declare numbered nested containers
    #[must_use]
    pub fn indexed_container<T: ContainerSpec>(field: impl Into<String>) -> Self {
        Self::new(field, FieldKind::IndexedContainer(ContainerRef::of::<T>()))
    }

    fn with_default(mut self, f: impl FnOnce(FieldMeta) -> FieldMeta) -> Self {
        let slot = self.meta.default_mut();
        *slot = f(std::mem::take(slot));
        self
    }

    /// Register under an explicit identifier instead of the field name
    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Override the element type
    #[must_use]
    pub const fn typed(mut self, element_type: ElementType) -> Self {
        self.element_type = Some(element_type);
        self
    }

    /// Reuse an existing instance; only a blank locator is backfilled
    #[must_use]
    pub fn instance(mut self, element: impl Into<Element>) -> Self {
        self.instance = Some(element.into());
        self
    }

    /// Set a typed locator
    #[must_use]
    pub fn locator(self, strategy: Strategy, value: impl Into<String>) -> Self {
        self.with_default(|m| m.locator(strategy, value))
    }

    /// Set the CSS locator
    #[must_use]
    pub fn css(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Css, value)
    }

    /// Set the XPath locator
    #[must_use]
    pub fn xpath(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::XPath, value)
    }

    /// Set the `id=` locator
    #[must_use]
    pub fn dom_id(self, value: impl Into<String>) -> Self {
        self.locator(Strategy::Id, value)
    }

    /// Set the untyped locator
    #[must_use]
    pub fn raw(self, value: impl Into<String>) -> Self {
        self.with_default(|m| m.raw(value))
    }

    /// Set the display name
    #[must_use]
    pub fn name(self, name: impl Into<String>) -> Self {
        self.with_default(|m| m.name(name))
    }

    /// Mark the element as possibly absent
    #[must_use]
    pub fn optional(self) -> Self {
        self.with_default(|m| m.optional(true))
    }

    /// Set whether ancestor locators are chained
    #[must_use]
    pub fn context_lookup(self, value: bool) -> Self {
        self.with_default(|m| m.context_lookup(value))
    }

    /// Set the reader
    #[must_use]
    pub fn reader(self, reader: Reader) -> Self {
        self.with_default(|m| m.reader(reader))
    }

    /// Container reached after acting on the element
    #[must_use]
    pub fn next<T: ContainerSpec>(self) -> Self {
        self.with_default(FieldMeta::next::<T>)
    }

    /// Scope the element within another container type
    #[must_use]
    pub fn context<T: ContainerSpec>(self) -> Self {
        self.with_default(FieldMeta::context::<T>)
    }

    /// Add a variant used when `property` equals `value`
    #[must_use]
    pub fn when(
        mut self,
        property: impl Into<String>,
        value: impl Into<String>,
        f: impl FnOnce(FieldMeta) -> FieldMeta,
    ) -> Self {
        self.meta
            .push_conditional(Condition::new(property, value), f(FieldMeta::default()));
        self
    }

    /// Field name
    #[must_use]
    pub fn field_name(&self) -> &str {
        &self.field
    }

    /// Field kind
    #[must_use]
    pub const fn kind(&self) -> FieldKind {
        self.kind
    }

    /// Explicit element type, else the kind's
    #[must_use]
    pub fn element_type(&self) -> Option<ElementType> {
        self.element_type.or_else(|| self.kind.element_type())
    }

    /// Existing instance to reuse
    #[must_use]
    pub const fn existing(&self) -> Option<&Element> {
        self.instance.as_ref()
    }

    /// Registry identifier: the explicit id, else the sanitized field name
    #[must_use]
    pub fn derived_id(&self) -> String {
        match &self.id {
            Some(id) => id.clone(),
            None => sanitize(&self.field),
        }
    }

    /// Field metadata for the live environment
    #[must_use]
    pub fn select_meta(&self, environment: &Environment) -> Option<&FieldMeta> {
        self.meta.select(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn env(pairs: &[(&str, &str)]) -> Environment {
        let props: BTreeMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Environment::isolated(props)
    }

    mod variant_tests {
        use super::*;

        #[test]
        fn test_matching_variant_wins_over_default() {
            let def = ContainerDef::builder("Search")
                .css("form.search")
                .when("profile", "mobile", |m| m.css("form.m-search"))
                .build();

            let mobile = def.select_meta(&env(&[("profile", "mobile")])).unwrap();
            assert_eq!(mobile.locators.resolve().as_deref(), Some("css=form.m-search"));

            let desktop = def.select_meta(&env(&[("profile", "desktop")])).unwrap();
            assert_eq!(desktop.locators.resolve().as_deref(), Some("css=form.search"));
        }

        #[test]
        fn test_first_matching_variant_wins() {
            let def = ContainerDef::builder("Search")
                .when("profile", "mobile", |m| m.css("a"))
                .when("profile", "mobile", |m| m.css("b"))
                .build();
            let meta = def.select_meta(&env(&[("profile", "mobile")])).unwrap();
            assert_eq!(meta.locators.resolve().as_deref(), Some("css=a"));
        }

        #[test]
        fn test_no_match_and_no_default_is_none() {
            let def = ContainerDef::builder("Search")
                .when("profile", "mobile", |m| m.css("a"))
                .build();
            assert!(def.select_meta(&env(&[])).is_none());
        }

        #[test]
        fn test_builder_setters_share_the_default_variant() {
            let def = ContainerDef::builder("Login")
                .name("Login Page")
                .css("form")
                .url("/login")
                .build();
            assert_eq!(def.variants().len(), 1);
            let meta = def.select_meta(&env(&[])).unwrap();
            assert_eq!(meta.name.as_deref(), Some("Login Page"));
            assert_eq!(meta.url.as_deref(), Some("/login"));
        }

        #[test]
        fn test_uid_follows_clones_not_keys() {
            let def = ContainerDef::builder("Home").css("main.a").build();
            let other = ContainerDef::builder("Home").css("main.b").build();
            assert_eq!(def.uid(), def.clone().uid());
            assert_ne!(def.uid(), other.uid());
        }
    }

    mod field_tests {
        use super::*;

        #[test]
        fn test_derived_id() {
            assert_eq!(FieldDef::text_input("First Name").derived_id(), "firstname");
            assert_eq!(FieldDef::text_input("first_name").id("fn").derived_id(), "fn");
        }

        #[test]
        fn test_typed_overrides_kind() {
            let field = FieldDef::new("custom", FieldKind::Untyped);
            assert_eq!(field.element_type(), None);
            let field = field.typed(ElementType::Checkbox);
            assert_eq!(field.element_type(), Some(ElementType::Checkbox));
        }

        #[test]
        fn test_field_variants() {
            let field = FieldDef::button("submit")
                .css("button.submit")
                .when("locale", "de", |m| m.xpath("//button[text()='Senden']"));
            let meta = field.select_meta(&env(&[("locale", "de")])).unwrap();
            assert_eq!(
                meta.locators.resolve().as_deref(),
                Some("xpath=//button[text()='Senden']")
            );
        }

        #[test]
        fn test_kind_helpers() {
            assert!(FieldKind::Indexed(ElementType::Label).is_indexed());
            assert!(FieldKind::Templated(ElementType::Label).is_templated());
            assert_eq!(FieldKind::Untyped.element_type(), None);
        }
    }
}
