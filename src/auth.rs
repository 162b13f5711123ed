use std::sync::Mutex;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::token_store::TokenStore;

/// Authenticated identity for the current user. At most one per launcher
/// process; created on login, destroyed on logout or detected expiry.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
    pub token: String,
    pub issued_at: SystemTime,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    token: String,
    #[serde(rename = "userId")]
    user_id: String,
    username: String,
}

/// Owns the token lifecycle: acquisition, request decoration and
/// invalidation. Expiry is detected reactively by callers (a 401-class
/// response on an authenticated request); there is no refresh timer.
pub struct SessionManager {
    http: reqwest::Client,
    base_url: String,
    store: TokenStore,
    session: Mutex<Option<Session>>,
}

impl SessionManager {
    pub fn new(http: reqwest::Client, base_url: String, store: TokenStore) -> Self {
        SessionManager {
            http,
            base_url,
            store,
            session: Mutex::new(None),
        }
    }

    /// `POST /login`. Rejected credentials map to `InvalidCredentials`,
    /// transport problems to `NetworkUnavailable`. The token is persisted
    /// to the secure store on success (best-effort; storage failures are
    /// logged, not escalated since the in-memory session is what matters).
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<Session, AuthError> {
        let response = self
            .http
            .post(format!("{}/login", self.base_url))
            .json(&serde_json::json!({
                "username": username,
                "password": password,
            }))
            .send()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        let status = response.status();
        if status.is_client_error() {
            log::warn!("login rejected for user {username} ({status})");
            return Err(AuthError::InvalidCredentials);
        }
        if !status.is_success() {
            return Err(AuthError::NetworkUnavailable(format!(
                "login failed with status {status}"
            )));
        }

        let body: LoginResponse = response
            .json()
            .await
            .map_err(|e| AuthError::NetworkUnavailable(e.to_string()))?;

        let session = Session {
            user_id: body.user_id,
            display_name: body.username,
            token: body.token,
            issued_at: SystemTime::now(),
        };

        if let Err(e) = self.store.set(&session.token) {
            log::warn!("failed to persist session token: {e}");
        }

        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = Some(session.clone());
        log::info!("session established for {}", session.display_name);
        Ok(session)
    }

    /// Best-effort server-side invalidation, then local cleanup. Idempotent:
    /// calling without a session is a no-op. Network failures are logged
    /// only; they must never block returning the user to a logged-out UI.
    pub async fn end_session(&self) {
        let token = {
            let mut guard = self.session.lock().unwrap_or_else(|e| e.into_inner());
            guard.take().map(|s| s.token)
        };

        let Some(token) = token else {
            return;
        };

        let result = self
            .http
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(&token)
            .send()
            .await;
        match result {
            Ok(resp) if resp.status().is_success() => log::info!("server session invalidated"),
            Ok(resp) => log::warn!("logout returned status {}", resp.status()),
            Err(e) => log::warn!("logout request failed: {e}"),
        }

        if let Err(e) = self.store.clear() {
            log::warn!("failed to clear stored token: {e}");
        }
    }

    /// Drop the local session without contacting the server. Used when the
    /// backend already rejected the token.
    pub fn invalidate_local(&self) {
        *self.session.lock().unwrap_or_else(|e| e.into_inner()) = None;
        if let Err(e) = self.store.clear() {
            log::warn!("failed to clear stored token: {e}");
        }
    }

    pub fn current_session(&self) -> Option<Session> {
        self.session.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn current_token(&self) -> Option<String> {
        self.session
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .map(|s| s.token.clone())
    }

    /// Decorate an outgoing request with the bearer credential.
    pub fn attach_auth(
        &self,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::RequestBuilder, AuthError> {
        match self.current_token() {
            Some(token) => Ok(request.bearer_auth(token)),
            None => Err(AuthError::Unauthenticated),
        }
    }
}
