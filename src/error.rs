//! Error types for mailflow.

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Action error: {0}")]
    Action(#[from] ActionError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Configuration-related errors.
///
/// Raised while substituting templates or compiling rules. Fatal to the single
/// rule or action that triggered it, never to the run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Malformed placeholder in '{template}': {reason}")]
    MalformedPlaceholder { template: String, reason: String },

    #[error("Unknown filter '{filter}' in '{template}'")]
    UnknownFilter { filter: String, template: String },

    #[error("Unresolved reference: ${{{path}}}")]
    UnresolvedReference { path: String },

    #[error("Namespace '{namespace}' is not available in a {level} context")]
    NamespaceUnavailable { namespace: String, level: String },

    #[error("Invalid regex for {field} '{pattern}': {reason}")]
    InvalidRegex {
        field: String,
        pattern: String,
        reason: String,
    },

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid legacy pattern '{pattern}': {reason}")]
    InvalidLegacyPattern { pattern: String, reason: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),
}

/// Errors raised by an action invocation.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Action {name} not found")]
    NotFound { name: String },

    #[error("Invalid parameters for action {name}: {reason}")]
    InvalidParameters { name: String, reason: String },

    #[error("Action {name} requires a {required} context, got {actual}")]
    WrongContext {
        name: String,
        required: String,
        actual: String,
    },

    #[error("Store failure: {0}")]
    Store(#[from] StoreError),

    #[error("Configuration failure: {0}")]
    Config(#[from] ConfigError),
}

/// Errors reported by the mail and file store adapters.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("{operation} failed: {reason}")]
    RequestFailed { operation: String, reason: String },

    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    #[error("Conflict with existing file at '{location}'")]
    Conflict { location: String },
}

/// Result type alias for mailflow.
pub type Result<T> = std::result::Result<T, Error>;
