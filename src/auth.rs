//! Session lifecycle: login and logout

use crate::error::Result;
use crate::interceptor::AuthenticatedClient;
use crate::types::{now_secs, AccessToken, LoginRequest, LoginResponse, RefreshToken, User};
use tracing::{info, warn};

impl AuthenticatedClient {
    /// Log in with email and password and store the issued tokens.
    ///
    /// The login call itself is not authenticated and does not go through the
    /// refresh logic. The email is lower-cased before it is sent.
    pub async fn login(&self, email: &str, password: &str) -> Result<User> {
        let url = self.config.url(&self.config.login_path);
        let request = LoginRequest {
            email: email.trim().to_lowercase(),
            password,
        };

        let response = self.http_client.post(&url).json(&request).send().await?;
        if !response.status().is_success() {
            warn!(url = %url, status = %response.status(), "Login rejected");
        }
        check_response!(response);

        let login: LoginResponse = response.json().await?;
        let ttl = self.config.session_ttl;

        // A new login replaces whatever session was there before.
        self.store.clear()?;
        self.store.set_access_token(&AccessToken::new(login.token), ttl)?;
        if let Some(refresh) = login.refresh {
            self.store.set_refresh_token(&RefreshToken::new(refresh), ttl)?;
        }

        info!(user_id = %login.user.id, role = ?login.user.role, "Logged in");
        Ok(login.user)
    }

    /// Drop both tokens from the session store
    pub fn logout(&self) -> Result<()> {
        self.store.clear()?;
        info!("Logged out");
        Ok(())
    }

    /// Whether a request could currently be authenticated without a new login:
    /// a non-expired access token or any refresh token is stored.
    pub fn is_authenticated(&self) -> Result<bool> {
        if let Some(token) = self.store.get_access_token()? {
            if !token.is_expired_at(now_secs()) {
                return Ok(true);
            }
        }
        Ok(self.store.get_refresh_token()?.is_some())
    }
}
