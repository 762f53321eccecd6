//! Locator grammar shared with external tooling.
//!
//! Locator strings are the only persisted schema of a page graph. They carry an
//! optional strategy prefix (`id=`, `css=`, `xpath=`, ...), may contain `%d`
//! placeholders for indexed elements and `%s` placeholders for templated ones,
//! and may be prefixed with `#N#` when an indexed clone has no placeholder to
//! substitute into.
//!
//! # Design Philosophy
//!
//! - **Plain strings at rest**: nodes store the raw locator; [`Selector`] is a
//!   parsed view used by drivers and diagnostics
//! - **Fixed precedence**: typed locator fields resolve in one documented order
//! - **Stable keys**: element identifiers are sanitized before they are used

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::result::{PagebindError, PagebindResult};

/// Placeholder substituted with the 1-based index of an indexed clone
pub const INDEX_PLACEHOLDER: &str = "%d";

/// Separator used when a locator path is rendered for diagnostics
pub const PATH_SEPARATOR: &str = " > ";

/// Locator strategy, in typed-locator precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Strategy {
    /// Element id attribute
    Id,
    /// Element name attribute
    Name,
    /// XPath expression
    XPath,
    /// CSS selector
    Css,
    /// Class name
    ClassName,
    /// Tag name
    TagName,
    /// Exact link text
    LinkText,
    /// Partial link text
    PartialLinkText,
    /// Visible text content
    Text,
    /// Attribute expression, e.g. `data-test=login`
    Attribute,
}

impl Strategy {
    /// All strategies in the order typed locators are tried
    pub const PRECEDENCE: [Self; 10] = [
        Self::Id,
        Self::Name,
        Self::XPath,
        Self::Css,
        Self::ClassName,
        Self::TagName,
        Self::LinkText,
        Self::PartialLinkText,
        Self::Text,
        Self::Attribute,
    ];

    /// Prefix used in locator strings, without the `=`
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Name => "name",
            Self::XPath => "xpath",
            Self::Css => "css",
            Self::ClassName => "class",
            Self::TagName => "tag",
            Self::LinkText => "link",
            Self::PartialLinkText => "partialLink",
            Self::Text => "text",
            Self::Attribute => "attr",
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        Self::PRECEDENCE
            .into_iter()
            .find(|s| s.prefix().eq_ignore_ascii_case(prefix))
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Parsed view of a locator string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    /// Resolved strategy
    pub strategy: Strategy,
    /// Expression without prefix
    pub expression: String,
    /// Position among matches, from a `#N#` prefix
    pub nth: Option<usize>,
}

impl Selector {
    /// Create a selector
    #[must_use]
    pub fn new(strategy: Strategy, expression: impl Into<String>) -> Self {
        Self {
            strategy,
            expression: expression.into(),
            nth: None,
        }
    }

    /// Create a CSS selector
    #[must_use]
    pub fn css(selector: impl Into<String>) -> Self {
        Self::new(Strategy::Css, selector)
    }

    /// Create an XPath selector
    #[must_use]
    pub fn xpath(expression: impl Into<String>) -> Self {
        Self::new(Strategy::XPath, expression)
    }

    /// Parse a locator string.
    ///
    /// Unprefixed locators starting with `/`, `./` or `(` are XPath, anything
    /// else is CSS. An unknown prefix is treated as part of a CSS expression.
    #[must_use]
    pub fn parse(locator: &str) -> Self {
        let (nth, rest) = split_nth(locator.trim());
        let mut selector = match rest.split_once('=') {
            Some((prefix, expression)) if !prefix.contains(['[', ' ', '(', '/']) => {
                match Strategy::from_prefix(prefix) {
                    Some(strategy) => Self::new(strategy, expression),
                    None => Self::unprefixed(rest),
                }
            }
            _ => Self::unprefixed(rest),
        };
        selector.nth = nth;
        selector
    }

    fn unprefixed(expression: &str) -> Self {
        if expression.starts_with('/')
            || expression.starts_with("./")
            || expression.starts_with('(')
        {
            Self::xpath(expression)
        } else {
            Self::css(expression)
        }
    }

    /// Render back to a prefixed locator string
    #[must_use]
    pub fn to_locator(&self) -> String {
        let base = format!("{}={}", self.strategy.prefix(), self.expression);
        match self.nth {
            Some(n) => format!("#{n}#{base}"),
            None => base,
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_locator())
    }
}

/// Split a leading `#N#` marker off a locator
#[must_use]
pub fn split_nth(locator: &str) -> (Option<usize>, &str) {
    if let Some(rest) = locator.strip_prefix('#') {
        if let Some((digits, tail)) = rest.split_once('#') {
            if let Ok(n) = digits.parse::<usize>() {
                return (Some(n), tail);
            }
        }
    }
    (None, locator)
}

/// Strategy-specific locator fields attached to a field declaration.
///
/// The first non-blank field in [`Strategy::PRECEDENCE`] order wins; `raw` is
/// only consulted when every typed field is blank.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TypedLocators {
    /// `id=` locator
    pub id: Option<String>,
    /// `name=` locator
    pub name: Option<String>,
    /// `xpath=` locator
    pub xpath: Option<String>,
    /// `css=` locator
    pub css: Option<String>,
    /// `class=` locator
    pub class_name: Option<String>,
    /// `tag=` locator
    pub tag_name: Option<String>,
    /// `link=` locator
    pub link_text: Option<String>,
    /// `partialLink=` locator
    pub partial_link_text: Option<String>,
    /// `text=` locator
    pub text: Option<String>,
    /// `attr=` locator
    pub attribute: Option<String>,
    /// Untyped locator string, used as-is
    pub raw: Option<String>,
}

impl TypedLocators {
    /// Set the locator for a strategy
    pub fn set(&mut self, strategy: Strategy, value: impl Into<String>) {
        let slot = match strategy {
            Strategy::Id => &mut self.id,
            Strategy::Name => &mut self.name,
            Strategy::XPath => &mut self.xpath,
            Strategy::Css => &mut self.css,
            Strategy::ClassName => &mut self.class_name,
            Strategy::TagName => &mut self.tag_name,
            Strategy::LinkText => &mut self.link_text,
            Strategy::PartialLinkText => &mut self.partial_link_text,
            Strategy::Text => &mut self.text,
            Strategy::Attribute => &mut self.attribute,
        };
        *slot = Some(value.into());
    }

    /// Get the locator for a strategy
    #[must_use]
    pub fn get(&self, strategy: Strategy) -> Option<&str> {
        let slot = match strategy {
            Strategy::Id => &self.id,
            Strategy::Name => &self.name,
            Strategy::XPath => &self.xpath,
            Strategy::Css => &self.css,
            Strategy::ClassName => &self.class_name,
            Strategy::TagName => &self.tag_name,
            Strategy::LinkText => &self.link_text,
            Strategy::PartialLinkText => &self.partial_link_text,
            Strategy::Text => &self.text,
            Strategy::Attribute => &self.attribute,
        };
        slot.as_deref()
    }

    /// Resolve the effective locator string, if any field is non-blank
    #[must_use]
    pub fn resolve(&self) -> Option<String> {
        Strategy::PRECEDENCE
            .into_iter()
            .find_map(|strategy| {
                self.get(strategy)
                    .filter(|v| !is_blank(v))
                    .map(|v| Selector::new(strategy, v).to_locator())
            })
            .or_else(|| self.raw.clone().filter(|v| !is_blank(v)))
    }

    /// Whether no field carries a locator
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resolve().is_none()
    }
}

/// Whether a locator or name contributes nothing
#[must_use]
pub fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

/// Normalize an element identifier for use as a registry key.
///
/// Lowercases and drops everything that is not alphanumeric, so
/// `"First Name"`, `"first_name"` and `"firstname"` are the same key.
#[must_use]
pub fn sanitize(id: &str) -> String {
    id.chars()
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Locator of the `index`-th clone of an indexed template
#[must_use]
pub fn index_locator(template: &str, index: usize) -> String {
    if template.contains(INDEX_PLACEHOLDER) {
        template.replace(INDEX_PLACEHOLDER, &index.to_string())
    } else {
        format!("#{index}#{template}")
    }
}

/// Locator matching every instance of an indexed template.
///
/// A bracketed `[%d]` predicate is dropped, a bare `%d` becomes `*`.
#[must_use]
pub fn counting_locator(template: &str) -> String {
    let bracketed = format!("[{INDEX_PLACEHOLDER}]");
    if template.contains(&bracketed) {
        template.replace(&bracketed, "")
    } else {
        template.replace(INDEX_PLACEHOLDER, "*")
    }
}

/// Format a template with printf-style placeholders.
///
/// Supports sequential `%s`/`%d`, positional `%2$s` and literal `%%`.
/// Surplus arguments are ignored; missing ones are an error.
pub fn format_template(template: &str, args: &[String]) -> PagebindResult<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_arg = 0usize;

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut digits = String::new();
        while let Some(d) = chars.peek().copied().filter(char::is_ascii_digit) {
            digits.push(d);
            let _ = chars.next();
        }

        let position = if digits.is_empty() {
            None
        } else if chars.peek() == Some(&'$') {
            let _ = chars.next();
            let position = digits.parse::<usize>().map_err(|_| PagebindError::Template {
                template: template.to_string(),
                message: format!("position {digits} out of range"),
            })?;
            Some(position)
        } else {
            // digits without `$` are not a placeholder
            out.push('%');
            out.push_str(&digits);
            continue;
        };

        match chars.next() {
            Some('%') if position.is_none() => out.push('%'),
            Some('s' | 'd') => {
                let slot = match position {
                    Some(0) => {
                        return Err(PagebindError::Template {
                            template: template.to_string(),
                            message: "positions start at 1".to_string(),
                        })
                    }
                    Some(p) => p - 1,
                    None => {
                        next_arg += 1;
                        next_arg - 1
                    }
                };
                let value = args.get(slot).ok_or_else(|| PagebindError::Template {
                    template: template.to_string(),
                    message: format!("missing argument {} of {}", slot + 1, args.len()),
                })?;
                out.push_str(value);
            }
            other => {
                out.push('%');
                out.push_str(&digits);
                if position.is_some() {
                    out.push('$');
                }
                if let Some(other) = other {
                    out.push(other);
                }
            }
        }
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    mod selector_tests {
        use super::*;

        #[test]
        fn test_parse_prefixed() {
            let selector = Selector::parse("id=username");
            assert_eq!(selector.strategy, Strategy::Id);
            assert_eq!(selector.expression, "username");
            assert_eq!(selector.nth, None);
        }

        #[test]
        fn test_parse_unprefixed_xpath_and_css() {
            assert_eq!(Selector::parse(".//li[2]").strategy, Strategy::XPath);
            assert_eq!(Selector::parse("//form").strategy, Strategy::XPath);
            assert_eq!(Selector::parse("(//a)[1]").strategy, Strategy::XPath);
            assert_eq!(Selector::parse("button.primary").strategy, Strategy::Css);
        }

        #[test]
        fn test_parse_attribute_selector_is_not_a_prefix() {
            let selector = Selector::parse("input[name=q]");
            assert_eq!(selector.strategy, Strategy::Css);
            assert_eq!(selector.expression, "input[name=q]");
        }

        #[test]
        fn test_parse_nth_marker() {
            let selector = Selector::parse("#3#css=li");
            assert_eq!(selector.nth, Some(3));
            assert_eq!(selector.strategy, Strategy::Css);
            assert_eq!(selector.to_locator(), "#3#css=li");
        }

        #[test]
        fn test_css_id_hash_is_not_nth_marker() {
            let selector = Selector::parse("#submit");
            assert_eq!(selector.nth, None);
            assert_eq!(selector.expression, "#submit");
        }
    }

    mod typed_locator_tests {
        use super::*;

        #[test]
        fn test_precedence_prefers_id_over_css() {
            let mut locators = TypedLocators::default();
            locators.set(Strategy::Css, "#user");
            locators.set(Strategy::Id, "user");
            assert_eq!(locators.resolve().as_deref(), Some("id=user"));
        }

        #[test]
        fn test_blank_typed_fields_are_skipped() {
            let mut locators = TypedLocators::default();
            locators.set(Strategy::Id, "  ");
            locators.set(Strategy::XPath, "//input");
            assert_eq!(locators.resolve().as_deref(), Some("xpath=//input"));
        }

        #[test]
        fn test_raw_is_last_resort() {
            let locators = TypedLocators {
                raw: Some(".//li[%d]".to_string()),
                ..TypedLocators::default()
            };
            assert_eq!(locators.resolve().as_deref(), Some(".//li[%d]"));
            assert!(TypedLocators::default().is_empty());
        }
    }

    mod placeholder_tests {
        use super::*;

        #[test]
        fn test_index_locator_substitutes() {
            assert_eq!(index_locator(".//li[%d]", 4), ".//li[4]");
        }

        #[test]
        fn test_index_locator_prefixes_without_placeholder() {
            assert_eq!(index_locator("css=li", 2), "#2#css=li");
        }

        #[test]
        fn test_counting_locator() {
            assert_eq!(counting_locator(".//li[%d]"), ".//li");
            assert_eq!(counting_locator("tr:nth-child(%d)"), "tr:nth-child(*)");
            assert_eq!(counting_locator("css=li"), "css=li");
        }

        #[test]
        fn test_format_sequential() {
            let out = format_template(".//option[@value='%s']", &["x".to_string()]).unwrap();
            assert_eq!(out, ".//option[@value='x']");
        }

        #[test]
        fn test_format_positional_and_escape() {
            let args = vec!["a".to_string(), "b".to_string()];
            let out = format_template("%2$s/%1$s 100%%", &args).unwrap();
            assert_eq!(out, "b/a 100%");
        }

        #[test]
        fn test_format_missing_argument() {
            let err = format_template("%s-%s", &["a".to_string()]).unwrap_err();
            assert!(matches!(err, PagebindError::Template { .. }));
        }

        #[test]
        fn test_format_rejects_overflowing_position() {
            let args = vec!["a".to_string()];
            match format_template("%99999999999999999999$s", &args).unwrap_err() {
                PagebindError::Template { message, .. } => {
                    assert!(message.contains("out of range"));
                }
                other => panic!("unexpected error: {other}"),
            }
        }

        #[test]
        fn test_format_leaves_unknown_conversions() {
            let out = format_template("width:50%;x", &[]).unwrap();
            assert_eq!(out, "width:50%;x");
        }
    }

    mod sanitize_tests {
        use super::*;
        use proptest::prelude::*;

        #[test]
        fn test_sanitize_collapses_forms() {
            assert_eq!(sanitize("First Name"), sanitize("first_name"));
            assert_eq!(sanitize("first_name"), "firstname");
            assert_eq!(sanitize("First-Name"), "firstname");
        }

        proptest! {
            #[test]
            fn prop_sanitize_idempotent(id in "[A-Za-z0-9 _-]{0,24}") {
                let once = sanitize(&id);
                prop_assert_eq!(sanitize(&once), once);
            }
        }
    }
}
