//! Client configuration

use crate::error::{ClientError, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Storage horizon for persisted session entries.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

pub const DEFAULT_REFRESH_PATH: &str = "/api/token/refresh/";
pub const DEFAULT_LOGIN_PATH: &str = "/api/users/login";

/// How concurrent token refreshes are issued
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMode {
    /// Every caller that needs a refresh issues its own refresh call.
    /// The store keeps whichever access token was written last.
    #[default]
    Independent,
    /// Concurrent callers await a single in-flight refresh and share its result.
    Coalesced,
}

impl FromStr for RefreshMode {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "independent" => Ok(RefreshMode::Independent),
            "coalesced" | "singleflight" => Ok(RefreshMode::Coalesced),
            other => Err(ClientError::Configuration(format!(
                "unknown refresh mode: {other} (expected independent or coalesced)"
            ))),
        }
    }
}

/// Configuration for the daycare API client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL, without trailing slash (e.g. `https://backend.example.com`)
    pub base_url: String,

    /// Path of the token refresh endpoint
    pub refresh_path: String,

    /// Path of the login endpoint
    pub login_path: String,

    /// Storage TTL applied to tokens written to the session store.
    /// Default: 7 days
    pub session_ttl: Duration,

    pub refresh_mode: RefreshMode,

    /// Clear the session when the backend rejects the refresh token.
    /// Default: false (store left unchanged)
    pub clear_session_on_refresh_failure: bool,

    /// Per-call timeout applied to the underlying HTTP client
    pub request_timeout: Option<Duration>,

    /// Location of the persisted session file, if any
    pub session_file: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            refresh_path: DEFAULT_REFRESH_PATH.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            session_ttl: DEFAULT_SESSION_TTL,
            refresh_mode: RefreshMode::default(),
            clear_session_on_refresh_failure: false,
            request_timeout: None,
            session_file: None,
        }
    }

    /// Build a config from the environment.
    ///
    /// * `DAYCARE_API_URL` - backend base URL (required)
    /// * `DAYCARE_SESSION_FILE` - path of the persisted session file
    /// * `DAYCARE_REFRESH_MODE` - `independent` or `coalesced`
    /// * `DAYCARE_REQUEST_TIMEOUT_SECS` - per-call timeout
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("DAYCARE_API_URL")
            .map_err(|_| ClientError::Configuration("DAYCARE_API_URL is not set".to_string()))?;
        let mut config = Self::new(base_url);

        if let Ok(path) = std::env::var("DAYCARE_SESSION_FILE") {
            config.session_file = Some(PathBuf::from(path));
        }
        if let Ok(mode) = std::env::var("DAYCARE_REFRESH_MODE") {
            config.refresh_mode = mode.parse()?;
        }
        if let Ok(secs) = std::env::var("DAYCARE_REQUEST_TIMEOUT_SECS") {
            let secs: u64 = secs.parse().map_err(|e| {
                ClientError::Configuration(format!("invalid DAYCARE_REQUEST_TIMEOUT_SECS: {e}"))
            })?;
            config.request_timeout = Some(Duration::from_secs(secs));
        }

        config.validate()?;
        Ok(config)
    }

    pub fn with_refresh_mode(mut self, mode: RefreshMode) -> Self {
        self.refresh_mode = mode;
        self
    }

    pub fn with_refresh_path(mut self, path: impl Into<String>) -> Self {
        self.refresh_path = path.into();
        self
    }

    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    pub fn with_clear_session_on_refresh_failure(mut self, clear: bool) -> Self {
        self.clear_session_on_refresh_failure = clear;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ClientError::Configuration(format!(
                "base URL must start with http:// or https://, got {:?}",
                self.base_url
            )));
        }
        if self.session_ttl.is_zero() {
            return Err(ClientError::Configuration("session TTL must be non-zero".to_string()));
        }
        Ok(())
    }

    /// Resolve a path against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}
