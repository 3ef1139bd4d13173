//! Exchange of a refresh token for a new access token

use crate::config::{ClientConfig, RefreshMode};
use crate::error::{ClientError, Result};
use crate::session_store::SessionStore;
use crate::types::{AccessToken, RefreshRequest, RefreshResponse};
use async_singleflight::Group;
use reqwest::{Client, StatusCode};
use std::sync::Arc;
use tracing::{debug, info, warn};

const REFRESH_FLIGHT_KEY: &str = "refresh";

/// Obtains new access tokens from the backend.
///
/// Each refresh is a single backend call with no retries of its own. A
/// successful refresh overwrites the access token in the session store, so
/// every later request observes it.
pub struct TokenRefresher {
    config: Arc<ClientConfig>,
    store: Arc<dyn SessionStore>,
    http_client: Client,
    /// Shared in-flight refresh when running in [`RefreshMode::Coalesced`].
    /// Error type is String because singleflight requires a cloneable error
    refresh_singleflight: Group<AccessToken, String>,
}

impl TokenRefresher {
    pub fn new(config: Arc<ClientConfig>, store: Arc<dyn SessionStore>, http_client: Client) -> Self {
        Self {
            config,
            store,
            http_client,
            refresh_singleflight: Group::new(),
        }
    }

    /// Refresh the access token.
    ///
    /// Fails with [`ClientError::NoRefreshToken`] without touching the network
    /// when no refresh token is stored, and with [`ClientError::RefreshFailed`]
    /// on network errors, non-2xx answers, malformed bodies or session store
    /// failures.
    pub async fn refresh(&self) -> Result<AccessToken> {
        match self.config.refresh_mode {
            RefreshMode::Independent => self.do_refresh().await,
            RefreshMode::Coalesced => self.do_refresh_singleflight().await,
        }
    }

    async fn do_refresh_singleflight(&self) -> Result<AccessToken> {
        if self.store.get_refresh_token().map_err(store_failure)?.is_none() {
            return Err(ClientError::NoRefreshToken);
        }

        let (success_opt, error_opt, shared) = self
            .refresh_singleflight
            .work(REFRESH_FLIGHT_KEY, async {
                self.do_refresh().await.map_err(|e| e.to_string())
            })
            .await;

        if shared {
            debug!("Joined an in-flight token refresh");
        }

        match (success_opt, error_opt) {
            (Some(token), None) => Ok(token),
            (None, Some(err_str)) => Err(ClientError::RefreshFailed(err_str)),
            _ => Err(ClientError::RefreshFailed("Unknown error during token refresh".to_string())),
        }
    }

    async fn do_refresh(&self) -> Result<AccessToken> {
        let refresh_token = self
            .store
            .get_refresh_token()
            .map_err(store_failure)?
            .ok_or(ClientError::NoRefreshToken)?;

        let url = self.config.url(&self.config.refresh_path);
        let request = RefreshRequest {
            refresh: refresh_token.as_str(),
        };

        let response = match self.http_client.post(&url).json(&request).send().await {
            Ok(response) => response,
            Err(e) => {
                warn!(url = %url, error = %e, "Token refresh request failed");
                return Err(ClientError::RefreshFailed(e.to_string()));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            warn!(
                url = %url,
                status = %status,
                error = %error_text,
                "Token refresh rejected"
            );

            if self.config.clear_session_on_refresh_failure && is_rejection(status) {
                self.store.clear().map_err(store_failure)?;
                info!("Session cleared after refresh token rejection");
            }

            return Err(ClientError::RefreshFailed(format!(
                "refresh endpoint returned {status}: {error_text}"
            )));
        }

        let refresh_response: RefreshResponse = response.json().await.map_err(|e| {
            warn!(url = %url, error = %e, "Malformed token refresh response");
            ClientError::RefreshFailed(format!("malformed refresh response: {e}"))
        })?;

        let token = AccessToken::new(refresh_response.access);
        self.store
            .set_access_token(&token, self.config.session_ttl)
            .map_err(store_failure)?;
        info!(expires_at = ?token.expires_at(), "Access token refreshed successfully");

        Ok(token)
    }
}

fn store_failure(e: ClientError) -> ClientError {
    warn!(error = %e, "Session store failed during token refresh");
    ClientError::RefreshFailed(format!("session store: {e}"))
}

/// Statuses meaning the backend refused the refresh token itself.
fn is_rejection(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::BAD_REQUEST | StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::session_store::MemorySessionStore;
    use crate::types::test_support::jwt_with_exp;
    use crate::types::RefreshToken;
    use std::time::Duration;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const TTL: Duration = Duration::from_secs(3600);

    fn refresher(config: ClientConfig) -> (Arc<MemorySessionStore>, TokenRefresher) {
        let store = Arc::new(MemorySessionStore::new());
        let refresher = TokenRefresher::new(Arc::new(config), store.clone(), Client::new());
        (store, refresher)
    }

    /// Store whose every operation fails
    struct UnavailableStore;

    impl SessionStore for UnavailableStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Err(ClientError::Storage("disk unavailable".to_string()))
        }

        fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
            Err(ClientError::Storage("disk unavailable".to_string()))
        }

        fn remove(&self, _key: &str) -> Result<()> {
            Err(ClientError::Storage("disk unavailable".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_failure_is_a_refresh_failure() {
        for mode in [RefreshMode::Independent, RefreshMode::Coalesced] {
            let config = ClientConfig::new("http://127.0.0.1:9").with_refresh_mode(mode);
            let refresher =
                TokenRefresher::new(Arc::new(config), Arc::new(UnavailableStore), Client::new());

            let err = refresher.refresh().await.unwrap_err();
            assert!(matches!(err, ClientError::RefreshFailed(_)), "{mode:?}: {err:?}");
            assert_eq!(err.kind(), ErrorKind::Unauthenticated);
        }
    }

    #[tokio::test]
    async fn test_store_write_failure_after_refresh_is_a_refresh_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": jwt_with_exp(4_000_000_000) })),
            )
            .expect(1)
            .mount(&server)
            .await;

        /// Holds a refresh token but refuses writes
        struct ReadOnlyStore;

        impl SessionStore for ReadOnlyStore {
            fn get(&self, key: &str) -> Result<Option<String>> {
                Ok((key == crate::session_store::REFRESH_TOKEN_KEY).then(|| "refresh-1".to_string()))
            }

            fn set(&self, _key: &str, _value: &str, _ttl: Duration) -> Result<()> {
                Err(ClientError::Storage("read-only".to_string()))
            }

            fn remove(&self, _key: &str) -> Result<()> {
                Err(ClientError::Storage("read-only".to_string()))
            }
        }

        let refresher = TokenRefresher::new(
            Arc::new(ClientConfig::new(server.uri())),
            Arc::new(ReadOnlyStore),
            Client::new(),
        );
        let err = refresher.refresh().await.unwrap_err();
        assert!(matches!(err, ClientError::RefreshFailed(_)));
    }

    #[tokio::test]
    async fn test_refresh_without_refresh_token_skips_network() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let (_store, refresher) = refresher(ClientConfig::new(server.uri()));
        let result = refresher.refresh().await;
        assert!(matches!(result, Err(ClientError::NoRefreshToken)));
    }

    #[tokio::test]
    async fn test_refresh_success_overwrites_store() {
        let server = MockServer::start().await;
        let fresh = jwt_with_exp(4_000_000_000);
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .and(body_json(serde_json::json!({ "refresh": "refresh-1" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "access": fresh })))
            .expect(1)
            .mount(&server)
            .await;

        let (store, refresher) = refresher(ClientConfig::new(server.uri()));
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();
        store.set_access_token(&AccessToken::new("stale"), TTL).unwrap();

        let token = refresher.refresh().await.unwrap();
        assert_eq!(token.as_str(), fresh);
        assert_eq!(store.get_access_token().unwrap().unwrap().as_str(), fresh);
    }

    #[tokio::test]
    async fn test_refresh_malformed_body_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({ "nope": 1 })))
            .mount(&server)
            .await;

        let (store, refresher) = refresher(ClientConfig::new(server.uri()));
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();

        let result = refresher.refresh().await;
        assert!(matches!(result, Err(ClientError::RefreshFailed(_))));
        assert!(store.get_access_token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_refresh_leaves_store_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let (store, refresher) = refresher(ClientConfig::new(server.uri()));
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();
        store.set_access_token(&AccessToken::new("old"), TTL).unwrap();

        assert!(refresher.refresh().await.is_err());
        assert_eq!(store.get_access_token().unwrap().unwrap().as_str(), "old");
        assert!(store.get_refresh_token().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_rejected_refresh_clears_store_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_clear_session_on_refresh_failure(true);
        let (store, refresher) = refresher(config);
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();
        store.set_access_token(&AccessToken::new("old"), TTL).unwrap();

        assert!(refresher.refresh().await.is_err());
        assert!(store.get_access_token().unwrap().is_none());
        assert!(store.get_refresh_token().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_server_error_does_not_clear_even_when_configured() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_clear_session_on_refresh_failure(true);
        let (store, refresher) = refresher(config);
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();

        assert!(refresher.refresh().await.is_err());
        assert!(store.get_refresh_token().unwrap().is_some());
    }

    #[tokio::test]
    async fn test_independent_mode_issues_one_call_per_caller() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": jwt_with_exp(4_000_000_000) }))
                    .set_delay(Duration::from_millis(100)),
            )
            .expect(2)
            .mount(&server)
            .await;

        let (store, refresher) = refresher(ClientConfig::new(server.uri()));
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();

        let (a, b) = tokio::join!(refresher.refresh(), refresher.refresh());
        assert!(a.is_ok() && b.is_ok());
    }

    #[tokio::test]
    async fn test_coalesced_mode_shares_one_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/token/refresh/"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!({ "access": jwt_with_exp(4_000_000_000) }))
                    .set_delay(Duration::from_millis(200)),
            )
            .expect(1)
            .mount(&server)
            .await;

        let config = ClientConfig::new(server.uri()).with_refresh_mode(RefreshMode::Coalesced);
        let (store, refresher) = refresher(config);
        store.set_refresh_token(&RefreshToken::new("refresh-1"), TTL).unwrap();

        let (a, b) = tokio::join!(refresher.refresh(), refresher.refresh());
        assert_eq!(a.unwrap(), b.unwrap());
    }
}
