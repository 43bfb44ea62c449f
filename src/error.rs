//! Error types for proxtop

use thiserror::Error;

/// Main error type for proxtop operations
#[derive(Error, Debug)]
pub enum ProxtopError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Terminal error: {0}")]
    Terminal(String),

    #[error("{0}")]
    Other(String),
}

/// Result type alias for proxtop operations
pub type Result<T> = std::result::Result<T, ProxtopError>;

impl ProxtopError {
    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new API error from a status code and message
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status,
            message: msg.into(),
        }
    }

    /// Create a catch-all error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether a request failing with this error may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}
