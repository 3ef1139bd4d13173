//! Authenticated request interceptor
//!
//! Every backend call goes through [`AuthenticatedClient::send`], which:
//! - reads the access token from the session store and refreshes it first if it
//!   is absent or its `exp` claim has passed (no refresh token: the request is
//!   never sent and fails as unauthenticated),
//! - attaches it as a bearer token and dispatches the request,
//! - on a 401, refreshes once and replays the request exactly once more.
//!
//! Any other response or transport error is handed back to the caller as-is.

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::refresh::TokenRefresher;
use crate::session_store::{FileSessionStore, MemorySessionStore, SessionStore};
use crate::types::{now_secs, AccessToken, Attempt};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::{Client, Method, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};

/// An outbound call that may have to be replayed after a token refresh.
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub method: Method,
    /// Path relative to the base URL, or an absolute URL
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<serde_json::Value>,
}

impl PendingRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn json(mut self, body: serde_json::Value) -> Self {
        self.body = Some(body);
        self
    }

    /// Serialize `body` as the JSON payload
    pub fn json_body<B: Serialize + ?Sized>(self, body: &B) -> Result<Self> {
        Ok(self.json(serde_json::to_value(body)?))
    }

    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// HTTP client that enforces the session's authentication contract
///
/// Cloning is cheap; clones share the session store and refresher.
#[derive(Clone)]
pub struct AuthenticatedClient {
    pub(crate) config: Arc<ClientConfig>,
    pub(crate) store: Arc<dyn SessionStore>,
    pub(crate) refresher: Arc<TokenRefresher>,
    pub(crate) http_client: Client,
}

impl AuthenticatedClient {
    /// Create a client over an explicit session store
    pub fn new(config: ClientConfig, store: Arc<dyn SessionStore>) -> Result<Self> {
        config.validate()?;

        let mut builder = Client::builder();
        if let Some(timeout) = config.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http_client = builder.build()?;

        let config = Arc::new(config);
        let refresher = Arc::new(TokenRefresher::new(
            Arc::clone(&config),
            Arc::clone(&store),
            http_client.clone(),
        ));

        Ok(Self {
            config,
            store,
            refresher,
            http_client,
        })
    }

    /// Create a client whose store follows the config: a [`FileSessionStore`]
    /// when `session_file` is set, otherwise an in-memory store.
    pub fn from_config(config: ClientConfig) -> Result<Self> {
        let store: Arc<dyn SessionStore> = match &config.session_file {
            Some(path) => Arc::new(FileSessionStore::new(path.clone())),
            None => Arc::new(MemorySessionStore::new()),
        };
        Self::new(config, store)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// The session store shared by every request made through this client
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn refresher(&self) -> &TokenRefresher {
        &self.refresher
    }

    /// Send a request with bearer authentication.
    ///
    /// Returns the backend response for any status other than 401. A 401 on
    /// the first dispatch triggers one refresh and one replay; a 401 on the
    /// replay fails with [`ClientError::Unauthorized`].
    pub async fn send(&self, request: &PendingRequest) -> Result<Response> {
        let mut token = self.valid_access_token(request).await?;
        let mut attempt = Attempt::First;

        loop {
            let response = self.dispatch(request, &token, attempt).await?;

            if response.status() != StatusCode::UNAUTHORIZED {
                debug!(
                    method = %request.method,
                    path = %request.path,
                    status = %response.status(),
                    ?attempt,
                    "Request completed"
                );
                return Ok(response);
            }

            match attempt.next() {
                Some(next) => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        "Backend rejected access token, refreshing and retrying once"
                    );
                    token = self.refresh_or_unauthenticated(request).await?;
                    attempt = next;
                }
                None => {
                    warn!(
                        method = %request.method,
                        path = %request.path,
                        "Backend rejected refreshed access token"
                    );
                    return Err(ClientError::Unauthorized);
                }
            }
        }
    }

    /// Send and decode a JSON response; non-2xx statuses become
    /// [`ClientError::Status`]. An empty body decodes as JSON `null`.
    pub async fn send_json<T: DeserializeOwned>(&self, request: &PendingRequest) -> Result<T> {
        let response = self.send(request).await?;
        check_response!(response);

        let bytes = response.bytes().await?;
        if bytes.is_empty() {
            return Ok(serde_json::from_slice(b"null")?);
        }
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.send_json(&PendingRequest::get(path)).await
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&PendingRequest::post(path).json_body(body)?).await
    }

    pub async fn put_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send_json(&PendingRequest::put(path).json_body(body)?).await
    }

    /// Send a DELETE, discarding any response body
    pub async fn delete(&self, path: &str) -> Result<()> {
        let response = self.send(&PendingRequest::delete(path)).await?;
        check_response!(response);
        Ok(())
    }

    async fn valid_access_token(&self, request: &PendingRequest) -> Result<AccessToken> {
        match self.store.get_access_token()? {
            Some(token) if !token.is_expired_at(now_secs()) => return Ok(token),
            Some(token) => debug!(
                path = %request.path,
                expires_at = ?token.expires_at(),
                "Access token expired, attempting refresh"
            ),
            None => debug!(path = %request.path, "No access token stored, attempting refresh"),
        }

        self.refresh_or_unauthenticated(request).await
    }

    async fn refresh_or_unauthenticated(&self, request: &PendingRequest) -> Result<AccessToken> {
        self.refresher.refresh().await.map_err(|e| {
            warn!(path = %request.path, error = %e, "Could not refresh access token");
            ClientError::Unauthenticated(e.to_string())
        })
    }

    async fn dispatch(
        &self,
        request: &PendingRequest,
        token: &AccessToken,
        attempt: Attempt,
    ) -> Result<Response> {
        let mut bearer = HeaderValue::from_str(&token.bearer()).map_err(|_| {
            ClientError::InvalidResponse("access token is not a valid header value".to_string())
        })?;
        bearer.set_sensitive(true);

        let mut headers = request.headers.clone();
        headers.insert(AUTHORIZATION, bearer);

        let url = self.config.url(&request.path);
        debug!(method = %request.method, url = %url, ?attempt, "Dispatching request");

        let mut builder = self
            .http_client
            .request(request.method.clone(), &url)
            .headers(headers);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        Ok(builder.send().await?)
    }
}
