use thiserror::Error;

/// Result type for volley operations.
pub type Result<T> = std::result::Result<T, VolleyError>;

/// Errors that can occur while building, authenticating or dispatching pushes.
#[derive(Debug, Error)]
pub enum VolleyError {
    /// The notification cannot be turned into a request
    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    /// Credentials could not be attached to a request
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Provider token could not be signed
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    /// HTTP client construction or request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The multiplexer reported a non-recoverable state for the whole batch
    #[error("Multiplexer execution failed: {0}")]
    MultiplexerFailure(String),

    /// The multiplexer context was already closed
    #[error("Multiplexer is closed")]
    MultiplexerClosed,

    /// Configuration is inconsistent or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Reading keys, certificates or input failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
