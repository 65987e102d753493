//! Duewatch HTTP Client
//!
//! Talks to the library API on behalf of the due-date poller:
//! - [`TokenStore`]: shared access/refresh credentials
//! - [`AuthClient`]: login and token refresh
//! - [`DueItemClient`]: fetching due items and submitting processed ones,
//!   retrying once after a token refresh when the API answers 401
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use duewatch_client::{AuthClient, DueItemApi, DueItemClient, LibraryApi, TokenStore};
//! use duewatch_core::domain::{DueKind, TimeWindow};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let api = LibraryApi::new("http://localhost:8000");
//!     let tokens = Arc::new(TokenStore::new());
//!     let auth = Arc::new(AuthClient::new(api.clone(), tokens));
//!     auth.authenticate("system@mail.com", "secret").await?;
//!
//!     let client = DueItemClient::new(api, auth, DueKind::Borrow);
//!     let window = TimeWindow::starting_at(chrono::Utc::now().fixed_offset(), chrono::Duration::minutes(10));
//!     let items = client.fetch_due(&window).await?;
//!     println!("{} item(s) due", items.len());
//!     Ok(())
//! }
//! ```

mod auth;
mod due;
pub mod error;
mod tokens;

pub use auth::AuthClient;
pub use due::{DueItemApi, DueItemClient};
pub use error::{ClientError, Result};
pub use tokens::TokenStore;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Base address and HTTP connection pool of the library API
///
/// Cheap to clone; clones share the same connection pool.
#[derive(Debug, Clone)]
pub struct LibraryApi {
    /// Base URL of the API (e.g., "http://localhost:8000")
    base_url: String,
    /// HTTP client instance
    client: Client,
}

impl LibraryApi {
    /// Create a new API handle with a default HTTP client
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(base_url, Client::new())
    }

    /// Create a new API handle whose requests time out after `timeout`
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(base_url, client))
    }

    /// Create a new API handle with a custom HTTP client
    pub fn with_client(base_url: impl Into<String>, client: Client) -> Self {
        let base_url = base_url.into();
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }

    /// Get the base URL of the API
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!("{}/api/{}", self.base_url, path)
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    // =============================================================================
    // Response Handlers
    // =============================================================================

    /// Map non-success status codes to errors, passing successful responses through
    pub(crate) async fn check_status(response: Response) -> Result<Response> {
        let status = response.status();

        if status == StatusCode::UNAUTHORIZED {
            return Err(ClientError::Unauthorized);
        }

        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ClientError::api_error(status.as_u16(), error_text));
        }

        Ok(response)
    }

    /// Check the status and deserialize the JSON body
    pub(crate) async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T> {
        let response = Self::check_status(response).await?;
        let body = response.bytes().await?;

        serde_json::from_slice(&body).map_err(|e| {
            ClientError::MalformedResponse(format!("Failed to parse JSON response: {}", e))
        })
    }
}
