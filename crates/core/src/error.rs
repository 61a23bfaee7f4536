//! Error types for the Standings core crate.

use thiserror::Error;

/// Top-level error type for all Standings operations.
#[derive(Debug, Error)]
pub enum StandingsError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The portal explicitly refused the login. Permanent until the student
    /// corrects their portal credentials; recorded in the sync state, never
    /// retried automatically.
    #[error("portal rejected the login credentials")]
    CredentialRejected,

    /// Network, timeout, or protocol failure talking to the portal.
    /// Transient; surfaced to the caller as retryable.
    #[error("portal transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The portal page no longer matches the expected shape.
    #[error("failed to parse portal page: {0}")]
    Parse(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Privacy toggle attempted before the 24-hour cooldown elapsed.
    #[error("privacy setting changed too recently, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: i64 },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// A convenience Result alias that defaults to [`StandingsError`].
pub type Result<T> = std::result::Result<T, StandingsError>;
