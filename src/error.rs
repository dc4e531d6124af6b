//! Error types for inbox triage.

use std::time::Duration;

/// Top-level error type for the triage run.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Mail error: {0}")]
    Mail(#[from] MailError),

    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Mail retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum MailError {
    #[error("Search failed for account {account}: {reason}")]
    SearchFailed { account: String, reason: String },

    #[error("Fetch failed for conversation {id}: {reason}")]
    FetchFailed { id: String, reason: String },

    #[error("Authentication failed for account {account}")]
    AuthFailed { account: String },

    #[error("HTTP error: {0}")]
    Http(String),
}

/// Oracle (text-classification service) errors.
///
/// The retry wrapper classifies transience by inspecting the display text of
/// these errors for rate-limit signatures, so variants carry the upstream
/// message verbatim.
#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("Oracle request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Oracle rate limited (429), retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Invalid oracle response: {reason}")]
    InvalidResponse { reason: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Pipeline-stage errors.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Categorize stage '{stage}' failed: {source}")]
    Categorize {
        stage: &'static str,
        #[source]
        source: OracleError,
    },

    #[error("Enrich stage '{stage}' failed: {source}")]
    Enrich {
        stage: &'static str,
        #[source]
        source: OracleError,
    },

    #[error("Action extraction failed: {0}")]
    Actions(#[source] OracleError),
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
