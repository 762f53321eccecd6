//! Result and error types for pagebind.

use base64::Engine as _;
use thiserror::Error;

/// Result type for pagebind operations
pub type PagebindResult<T> = Result<T, PagebindError>;

/// Errors that can occur while building or driving a page graph
#[derive(Debug, Error)]
pub enum PagebindError {
    /// Bad or missing metadata, surfaced when a container is initialized
    #[error("Configuration error in {container}: {message}")]
    Configuration {
        /// Container being built
        container: String,
        /// Error message
        message: String,
    },

    /// Requested element id is not registered in the container
    #[error("Element '{id}' not found in {container}. Known elements: [{}]", known.join(", "))]
    UnknownIdentifier {
        /// Container that was searched
        container: String,
        /// Requested id
        id: String,
        /// Every id the container knows about
        known: Vec<String>,
    },

    /// Operation requires a capability the element lacks
    #[error("Element {element} does not support {capability}")]
    CapabilityMismatch {
        /// Element display name
        element: String,
        /// Missing capability
        capability: String,
    },

    /// Index 0, or a negative index reaching before the first element
    #[error("Invalid index {index} for {element}: indexes are 1-based, negative values count from the end")]
    InvalidIndex {
        /// Element display name
        element: String,
        /// Rejected index
        index: i64,
    },

    /// A value could not be converted for the target element
    #[error("Invalid value '{value}' for {element}: {message}")]
    InvalidValue {
        /// Element display name
        element: String,
        /// Rejected value
        value: String,
        /// Error message
        message: String,
    },

    /// Template substitution failed
    #[error("Template '{template}' cannot be formatted: {message}")]
    Template {
        /// Locator template
        template: String,
        /// Error message
        message: String,
    },

    /// Search over an indexed element left values unmatched
    #[error("Values not found in {element}: [{}]", unmatched.join(", "))]
    NotFound {
        /// Element display name
        element: String,
        /// Values that matched no element
        unmatched: Vec<String>,
    },

    /// Raw failure reported by the driver collaborator
    #[error("Driver error: {message}")]
    Driver {
        /// Error message
        message: String,
    },

    /// Driver operation failed, annotated with the element context
    #[error("Failed to {action} on {element} [{path}]: {message}")]
    Interaction {
        /// Action description with arguments substituted
        action: String,
        /// Element display name or raw locator
        element: String,
        /// Full ancestor locator path
        path: String,
        /// Underlying error message
        message: String,
        /// Best-effort page capture taken at failure time
        screenshot: Option<Vec<u8>>,
        /// Call frames kept after filtering
        frames: Vec<String>,
    },

    /// The browser session is gone; no page state can be captured
    #[error("Session lost while trying to {action} on {element} [{path}]: {message}")]
    SessionLost {
        /// Action description (empty before normalization)
        action: String,
        /// Element display name (empty before normalization)
        element: String,
        /// Full ancestor locator path (empty before normalization)
        path: String,
        /// Underlying error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl PagebindError {
    /// Create a raw driver failure
    pub fn driver(message: impl Into<String>) -> Self {
        Self::Driver {
            message: message.into(),
        }
    }

    /// Create a raw session-loss failure, before any element context is known
    pub fn session_lost(message: impl Into<String>) -> Self {
        Self::SessionLost {
            action: String::new(),
            element: String::new(),
            path: String::new(),
            message: message.into(),
        }
    }

    /// Create a configuration error for a container
    pub fn configuration(container: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            container: container.into(),
            message: message.into(),
        }
    }

    /// Whether this is the fatal session-loss kind
    #[must_use]
    pub const fn is_session_lost(&self) -> bool {
        matches!(self, Self::SessionLost { .. })
    }

    /// Whether the dispatcher already annotated this error with element context
    #[must_use]
    pub fn is_normalized(&self) -> bool {
        match self {
            Self::Interaction { .. } => true,
            Self::SessionLost { element, .. } => !element.is_empty(),
            _ => false,
        }
    }

    /// Screenshot attached to an interaction failure, base64 encoded for reports
    #[must_use]
    pub fn screenshot_base64(&self) -> Option<String> {
        match self {
            Self::Interaction {
                screenshot: Some(data),
                ..
            } => Some(base64::engine::general_purpose::STANDARD.encode(data)),
            _ => None,
        }
    }
}
