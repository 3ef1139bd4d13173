#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use daycare_api_client::{
    AccessToken, AuthenticatedClient, ClientConfig, MemorySessionStore, RefreshToken, SessionStore,
};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const TTL: Duration = Duration::from_secs(3600);
pub const REFRESH_PATH: &str = "/api/token/refresh/";

/// Unsigned JWT carrying the given `exp` claim.
pub fn jwt_with_exp(exp: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(format!(r#"{{"exp":{exp}}}"#));
    format!("{header}.{payload}.sig-{exp}")
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn valid_token() -> String {
    jwt_with_exp(now() + 3600)
}

pub fn expired_token() -> String {
    jwt_with_exp(now() - 1)
}

pub fn client_with(
    server: &MockServer,
    config: impl FnOnce(ClientConfig) -> ClientConfig,
) -> (Arc<MemorySessionStore>, AuthenticatedClient) {
    let store = Arc::new(MemorySessionStore::new());
    let client = AuthenticatedClient::new(config(ClientConfig::new(server.uri())), store.clone())
        .expect("client");
    (store, client)
}

pub fn client(server: &MockServer) -> (Arc<MemorySessionStore>, AuthenticatedClient) {
    client_with(server, |config| config)
}

pub fn seed(store: &MemorySessionStore, access: Option<&str>, refresh: Option<&str>) {
    if let Some(access) = access {
        store.set_access_token(&AccessToken::new(access), TTL).unwrap();
    }
    if let Some(refresh) = refresh {
        store.set_refresh_token(&RefreshToken::new(refresh), TTL).unwrap();
    }
}

pub fn stored_access(store: &MemorySessionStore) -> Option<String> {
    store
        .get_access_token()
        .unwrap()
        .map(|token| token.as_str().to_string())
}

pub async fn mount_refresh(server: &MockServer, access: &str, times: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access": access })))
        .expect(times)
        .mount(server)
        .await;
}

pub async fn mount_refresh_failure(server: &MockServer, status: u16, times: u64) {
    Mock::given(method("POST"))
        .and(path(REFRESH_PATH))
        .respond_with(ResponseTemplate::new(status))
        .expect(times)
        .mount(server)
        .await;
}
