//! Error types for Quill

use thiserror::Error;

/// Result type alias for Quill operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in Quill
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LLM error: {0}")]
    Llm(String),

    /// The provider rejected the credential (expired or invalid token).
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// The token endpoint rejected the refresh token or returned malformed data.
    #[error("{0}")]
    Refresh(String),

    #[error("OAuth error: {0}")]
    OAuth(String),

    /// The provider reported a failure inside an otherwise healthy stream.
    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether this error should trigger a single refresh-and-retry.
    pub fn is_authentication_failure(&self) -> bool {
        matches!(self, Error::AuthenticationFailure(_))
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
