//! Error types for reply-pilot.

use std::time::Duration;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Configuration-related errors. Fatal at startup, never recovered at runtime.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid rule pattern '{pattern}': {reason}")]
    InvalidRule { pattern: String, reason: String },

    #[error("Failed to read rules file {path}: {source}")]
    RulesFileRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse rules file {path}: {source}")]
    RulesFileParse {
        path: String,
        source: serde_json::Error,
    },

    #[error("No generation providers configured — set at least one API key")]
    NoProviders,
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Transaction failed: {0}")]
    Transaction(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Platform (social API) errors — fetch or submit failures.
///
/// A submit failure must never commit the cooldown ledger or mark the
/// post processed; the post stays retryable next cycle.
#[derive(Debug, thiserror::Error)]
pub enum PlatformError {
    #[error("Authentication failed: {reason}")]
    AuthFailed { reason: String },

    #[error("Request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Unexpected response ({status}): {body}")]
    UnexpectedResponse { status: u16, body: String },

    #[error("Submit rejected for post {post_id}: {reason}")]
    SubmitRejected { post_id: String, reason: String },
}

/// Per-attempt generation provider errors. Recovered locally by
/// advancing the fallback chain — never fatal to the post.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Provider {provider} request failed: {reason}")]
    RequestFailed { provider: String, reason: String },

    #[error("Provider {provider} returned an empty response")]
    EmptyResponse { provider: String },

    #[error("Provider {provider} timed out after {timeout:?}")]
    Timeout { provider: String, timeout: Duration },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },
}

/// Cooldown ledger errors.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// The commit transaction found the hourly window already full.
    /// Happens only when a concurrent worker committed between our
    /// reserve and commit; the reply was already sent, so the caller
    /// logs the race rather than retrying.
    #[error("Reply quota consumed by a concurrent commit")]
    LostRace,
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;
