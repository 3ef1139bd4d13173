//! Daycare API Client
//!
//! A Rust client library for the daycare console's REST backend, with JWT
//! session management, automatic access-token refresh and a single
//! refresh-and-retry on authorization failures.

/// Return a [`ClientError::Status`](crate::error::ClientError::Status) from the
/// enclosing function if the response is not successful
macro_rules! check_response {
    ($response:ident) => {
        if !$response.status().is_success() {
            let status = $response.status();
            let body = $response.text().await.unwrap_or_default();
            return Err($crate::error::ClientError::Status { status, body });
        }
    };
}

pub mod auth;
pub mod config;
pub mod error;
pub mod interceptor;
pub mod refresh;
pub mod resources;
pub mod session_store;
pub mod types;

pub use config::{ClientConfig, RefreshMode, DEFAULT_SESSION_TTL};
pub use error::{ClientError, ErrorKind, Result};
pub use interceptor::{AuthenticatedClient, PendingRequest};
pub use refresh::TokenRefresher;
pub use resources::Api;
pub use session_store::{FileSessionStore, MemorySessionStore, SessionStore};
pub use types::{AccessToken, Attempt, RefreshToken, Role, User};
