//! Authentication endpoints
//!
//! Obtains credentials with the system account and keeps them fresh:
//! - `POST /api/token/` with `{email, password}` -> `{access, refresh}`
//! - `POST /api/token/refresh/` with `{refresh}` -> `{access}`
//!
//! Token expiry is never tracked locally; callers find out from a 401 and
//! ask this client to [`recover`](AuthClient::recover).

use crate::error::{ClientError, Result};
use crate::{LibraryApi, TokenStore};
use duewatch_core::domain::Credentials;
use duewatch_core::dto::auth::{AccessToken, LoginRequest, RefreshRequest, TokenPair};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, info, warn};

/// Client for the token endpoints, writing results into a shared [`TokenStore`]
pub struct AuthClient {
    api: LibraryApi,
    tokens: Arc<TokenStore>,
    /// Last login that succeeded, reused when a refresh token stops working
    login: Mutex<Option<LoginRequest>>,
    /// Serializes refreshes so concurrent 401s trigger a single exchange
    refresh_lock: tokio::sync::Mutex<()>,
}

impl AuthClient {
    pub fn new(api: LibraryApi, tokens: Arc<TokenStore>) -> Self {
        Self {
            api,
            tokens,
            login: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// The store this client writes to
    pub fn tokens(&self) -> &Arc<TokenStore> {
        &self.tokens
    }

    /// Current access token
    pub fn access_token(&self) -> Result<String> {
        self.tokens
            .get()
            .map(|c| c.access_token)
            .ok_or(ClientError::NotAuthenticated)
    }

    /// Logs in and stores both tokens
    ///
    /// # Errors
    /// `AuthenticationFailed` if the API refuses the login,
    /// `RequestFailed` if it cannot be reached.
    pub async fn authenticate(&self, email: &str, password: &str) -> Result<Credentials> {
        let request = LoginRequest::new(email, password);
        let credentials = self.login(&request).await?;
        *self.login.lock().unwrap_or_else(PoisonError::into_inner) = Some(request);
        Ok(credentials)
    }

    /// Exchanges the stored refresh token for a new access token
    ///
    /// # Errors
    /// `NotAuthenticated` if nothing is stored, `RefreshFailed` if the API
    /// refuses the refresh token.
    pub async fn refresh(&self) -> Result<Credentials> {
        let _guard = self.refresh_lock.lock().await;
        self.refresh_locked().await
    }

    /// Restores a usable access token after `stale_access` was rejected
    ///
    /// Does nothing if another caller already replaced `stale_access`.
    /// Otherwise attempts one refresh; if the refresh token itself is
    /// refused, logs in again with the last successful login.
    pub async fn recover(&self, stale_access: &str) -> Result<()> {
        let _guard = self.refresh_lock.lock().await;

        if let Some(current) = self.tokens.get() {
            if current.access_token != stale_access {
                debug!("Access token already replaced by a concurrent refresh");
                return Ok(());
            }
        }

        match self.refresh_locked().await {
            Ok(_) => Ok(()),
            Err(ClientError::RefreshFailed(reason)) => {
                warn!(%reason, "Refresh token rejected, logging in again");
                let login = self
                    .login
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .clone()
                    .ok_or_else(|| ClientError::RefreshFailed(reason.clone()))?;
                self.login(&login).await.map(|_| ()).map_err(|e| {
                    ClientError::RefreshFailed(format!("{}; re-authentication: {}", reason, e))
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn login(&self, request: &LoginRequest) -> Result<Credentials> {
        let url = self.api.url("token/");
        let response = self.api.http().post(&url).json(request).send().await?;

        let pair: TokenPair = match LibraryApi::handle_response(response).await {
            Ok(pair) => pair,
            Err(ClientError::Unauthorized) => {
                return Err(ClientError::AuthenticationFailed(format!(
                    "credentials for {} rejected",
                    request.email
                )));
            }
            Err(ClientError::ApiError { status, message }) => {
                return Err(ClientError::AuthenticationFailed(format!(
                    "status {}: {}",
                    status, message
                )));
            }
            Err(e) => return Err(e),
        };

        let credentials = Credentials::new(pair.access, pair.refresh);
        self.tokens.set(credentials.clone());
        info!(email = %request.email, "Authentication successful");

        Ok(credentials)
    }

    async fn refresh_locked(&self) -> Result<Credentials> {
        let current = self.tokens.get().ok_or(ClientError::NotAuthenticated)?;

        let url = self.api.url("token/refresh/");
        let response = self
            .api
            .http()
            .post(&url)
            .json(&RefreshRequest {
                refresh: current.refresh_token.clone(),
            })
            .send()
            .await?;

        let token: AccessToken = match LibraryApi::handle_response(response).await {
            Ok(token) => token,
            Err(ClientError::Unauthorized) => {
                return Err(ClientError::RefreshFailed(
                    "refresh token rejected".to_string(),
                ));
            }
            Err(ClientError::ApiError { status, message }) => {
                return Err(ClientError::RefreshFailed(format!(
                    "status {}: {}",
                    status, message
                )));
            }
            Err(e) => return Err(e),
        };

        self.tokens.set_access_token(token.access.clone());
        info!("Access token refreshed");

        Ok(current.with_access_token(token.access))
    }
}
