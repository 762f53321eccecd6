//! Framework configuration.
//!
//! Loaded from YAML, then overridden by `PAGEBIND_*` environment variables.
//!
//! ```yaml
//! listeners_enabled: true
//! highlight: false
//! optional_wait: true
//! environment:
//!   profile: mobile
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::result::PagebindResult;

/// Environment variable toggling default listeners
pub const ENV_LISTENERS: &str = "PAGEBIND_LISTENERS";
/// Environment variable toggling highlighting
pub const ENV_HIGHLIGHT: &str = "PAGEBIND_HIGHLIGHT";
/// Environment variable for the optional-element wait flag
pub const ENV_OPTIONAL_WAIT: &str = "PAGEBIND_OPTIONAL_WAIT";
/// Environment variable toggling failure screenshots
pub const ENV_SCREENSHOTS: &str = "PAGEBIND_SCREENSHOTS";

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkConfig {
    /// Attach default listeners to elements built by the factory
    pub listeners_enabled: bool,
    /// Highlight elements while they are interacted with
    pub highlight: bool,
    /// Scroll elements into view before acting or typing
    pub scroll_into_view: bool,
    /// Wait for the page to settle after writes and actions
    pub wait_for_page_update: bool,
    /// Whether display checks of optional elements wait during bulk reads
    pub optional_wait: bool,
    /// Capture a screenshot when an interaction fails
    pub capture_screenshots: bool,
    /// Attach filtered call frames to interaction failures
    pub capture_frames: bool,
    /// Extra frame prefixes kept next to the crate's own frames
    pub frame_allow_prefixes: Vec<String>,
    /// Live environment properties for conditional metadata variants
    pub environment: BTreeMap<String, String>,
}

impl Default for FrameworkConfig {
    fn default() -> Self {
        Self {
            listeners_enabled: true,
            highlight: false,
            scroll_into_view: false,
            wait_for_page_update: true,
            optional_wait: false,
            capture_screenshots: true,
            capture_frames: true,
            frame_allow_prefixes: Vec::new(),
            environment: BTreeMap::new(),
        }
    }
}

impl FrameworkConfig {
    /// Create a config with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a YAML document
    pub fn from_yaml(yaml: &str) -> PagebindResult<Self> {
        Ok(serde_yaml_ng::from_str(yaml)?)
    }

    /// Load a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> PagebindResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }

    /// Apply `PAGEBIND_*` overrides from the process environment
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from a variable lookup
    #[must_use]
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let flag = |name: &str, current: bool| match lookup(name) {
            Some(raw) => parse_flag(&raw).unwrap_or_else(|| {
                warn!(variable = name, value = %raw, "ignoring unparseable flag");
                current
            }),
            None => current,
        };
        self.listeners_enabled = flag(ENV_LISTENERS, self.listeners_enabled);
        self.highlight = flag(ENV_HIGHLIGHT, self.highlight);
        self.optional_wait = flag(ENV_OPTIONAL_WAIT, self.optional_wait);
        self.capture_screenshots = flag(ENV_SCREENSHOTS, self.capture_screenshots);
        self
    }

    /// Enable or disable default listeners
    #[must_use]
    pub const fn with_listeners(mut self, enabled: bool) -> Self {
        self.listeners_enabled = enabled;
        self
    }

    /// Enable or disable highlighting
    #[must_use]
    pub const fn with_highlight(mut self, enabled: bool) -> Self {
        self.highlight = enabled;
        self
    }

    /// Enable or disable scrolling into view
    #[must_use]
    pub const fn with_scroll_into_view(mut self, enabled: bool) -> Self {
        self.scroll_into_view = enabled;
        self
    }

    /// Enable or disable waiting for page updates
    #[must_use]
    pub const fn with_page_update_wait(mut self, enabled: bool) -> Self {
        self.wait_for_page_update = enabled;
        self
    }

    /// Set the optional-element wait flag
    #[must_use]
    pub const fn with_optional_wait(mut self, wait: bool) -> Self {
        self.optional_wait = wait;
        self
    }

    /// Enable or disable failure screenshots
    #[must_use]
    pub const fn with_screenshots(mut self, enabled: bool) -> Self {
        self.capture_screenshots = enabled;
        self
    }

    /// Enable or disable frame capture
    #[must_use]
    pub const fn with_frames(mut self, enabled: bool) -> Self {
        self.capture_frames = enabled;
        self
    }

    /// Keep frames starting with `prefix` in failure traces
    #[must_use]
    pub fn with_frame_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.frame_allow_prefixes.push(prefix.into());
        self
    }

    /// Set an environment property
    #[must_use]
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let _ = self.environment.insert(name.into(), value.into());
        self
    }
}

/// Parse a boolean flag the way metadata and environment variables spell it
#[must_use]
pub fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" | "checked" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
