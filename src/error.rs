//! Error types for mail-triage.

use std::time::Duration;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Rule error: {0}")]
    Rule(#[from] RuleError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Rules file not found: {0}")]
    RulesFileMissing(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Errors from the remote mail provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// Rate limiting or server-side unavailability. Safe to retry.
    #[error("Provider {operation} transient failure (status {status:?}): {reason}")]
    Transient {
        operation: String,
        status: Option<u16>,
        reason: String,
    },

    /// Anything the provider will keep rejecting (not found, bad request, auth).
    #[error("Provider {operation} failed (status {status:?}): {reason}")]
    Permanent {
        operation: String,
        status: Option<u16>,
        reason: String,
    },

    #[error("Provider {operation} gave up after {attempts} attempts ({waited:?} backoff): {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        waited: Duration,
        last: Box<ProviderError>,
    },

    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse { operation: String, reason: String },
}

impl ProviderError {
    /// Whether the retry wrapper may try this call again.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transient { status, .. } | Self::Permanent { status, .. } => *status,
            Self::RetriesExhausted { last, .. } => last.status(),
            Self::InvalidResponse { .. } => None,
        }
    }
}

/// Rule document errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    /// The document is malformed or violates the rule schema. Fatal to loading.
    #[error("Rule validation failed: {0}")]
    Validation(String),

    /// A single rule or condition could not be built. The rule is skipped.
    #[error("Invalid rule: {0}")]
    Invalid(String),

    #[error("Failed to read rules file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Action execution errors. Never escape the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),

    #[error("Action {action} requires parameter '{param}'")]
    MissingParameter { action: String, param: String },

    #[error("Label '{0}' could not be resolved")]
    LabelUnresolved(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type alias for mail-triage.
pub type Result<T> = std::result::Result<T, Error>;
