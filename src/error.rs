//! Error types for the daycare API client

use reqwest::StatusCode;
use thiserror::Error;

/// Client error types
#[derive(Error, Debug)]
pub enum ClientError {
    /// No usable refresh path existed: the refresh token was missing or the
    /// refresh call itself failed. Callers should force a fresh login.
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// The backend answered 401 even after one refresh-and-retry cycle.
    #[error("Unauthorized: request rejected after token refresh")]
    Unauthorized,

    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// Non-success backend response, passed through unmodified.
    #[error("Request failed with status {status}: {body}")]
    Status { status: StatusCode, body: String },

    #[error("HTTP request failed: {0}")]
    HttpRequest(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session storage error: {0}")]
    Storage(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Coarse classification of a failed call, as seen by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Unauthenticated,
    Unauthorized,
    /// Any other error, returned as-is by the interceptor.
    Passthrough,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Unauthenticated(_)
            | ClientError::NoRefreshToken
            | ClientError::RefreshFailed(_) => ErrorKind::Unauthenticated,
            ClientError::Unauthorized => ErrorKind::Unauthorized,
            _ => ErrorKind::Passthrough,
        }
    }

    /// HTTP status of a passthrough backend error, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ClientError::Status { status, .. } => Some(*status),
            ClientError::HttpRequest(e) => e.status(),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ClientError {
    fn from(error: std::io::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
