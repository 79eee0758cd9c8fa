//! Error types for the lost-pets API client.
//!
//! # Design
//! `ApiError` follows the transport taxonomy: no response at all
//! (`Network`), authentication problems (401/403), a missing resource (404),
//! other client errors, and server errors. Each HTTP variant carries the
//! status and the message the server put in the body, so a form can show
//! that message verbatim.
//!
//! `ApiError` is `Clone` because a single failed fetch is handed to every
//! caller waiting on the same cache key.

use thiserror::Error;

/// Errors returned by the API layer and propagated unchanged by the layers
/// above it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// The request never produced a response (DNS, refused connection,
    /// timeout at the transport).
    #[error("network error: {0}")]
    Network(String),

    /// 401: missing or expired credentials.
    #[error("unauthenticated: {message}")]
    Unauthorized { message: String },

    /// 403: authenticated but not allowed.
    #[error("forbidden: {message}")]
    Forbidden { message: String },

    /// 404: the requested resource does not exist.
    #[error("not found: {message}")]
    NotFound { message: String },

    /// Any other 4xx, e.g. validation failures or a duplicate email.
    #[error("HTTP {status}: {message}")]
    Client { status: u16, message: String },

    /// 5xx and anything outside the 2xx/4xx ranges.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// The response body could not be deserialized into the expected type.
    #[error("deserialization failed: {0}")]
    Deserialization(String),

    /// The request payload could not be serialized.
    #[error("serialization failed: {0}")]
    Serialization(String),
}

/// Coarse classification of an [`ApiError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Network,
    Unauthorized,
    Forbidden,
    NotFound,
    Client,
    Server,
    Decode,
}

impl ApiError {
    /// Build the error for a non-2xx status. `message` is whatever the
    /// server supplied, possibly empty.
    pub fn from_status(status: u16, message: String) -> Self {
        match status {
            401 => ApiError::Unauthorized { message },
            403 => ApiError::Forbidden { message },
            404 => ApiError::NotFound { message },
            400..=499 => ApiError::Client { status, message },
            _ => ApiError::Server { status, message },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Network(_) => ErrorKind::Network,
            ApiError::Unauthorized { .. } => ErrorKind::Unauthorized,
            ApiError::Forbidden { .. } => ErrorKind::Forbidden,
            ApiError::NotFound { .. } => ErrorKind::NotFound,
            ApiError::Client { .. } => ErrorKind::Client,
            ApiError::Server { .. } => ErrorKind::Server,
            ApiError::Deserialization(_) | ApiError::Serialization(_) => ErrorKind::Decode,
        }
    }

    /// HTTP status, when the server answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Client { status, .. } | ApiError::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// The message the server sent, if any.
    pub fn server_message(&self) -> Option<&str> {
        let message = match self {
            ApiError::Unauthorized { message }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::Client { message, .. }
            | ApiError::Server { message, .. } => message.as_str(),
            _ => return None,
        };
        (!message.trim().is_empty()).then_some(message)
    }

    /// Text to show the user: the server's message when it sent one,
    /// otherwise `fallback`.
    pub fn user_message<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.server_message().unwrap_or(fallback)
    }
}

/// Errors from the persisted client storage.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("stored value is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Errors while loading [`ClientConfig`](crate::config::ClientConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {reason}")]
    InvalidValue { name: &'static str, reason: String },

    #[error("cannot read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("cannot parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}
