//! Error types for the library API client

use thiserror::Error;

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to the library API
#[derive(Debug, Error)]
pub enum ClientError {
    /// HTTP request failed before a response was received
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    /// API returned an error status code
    #[error("API error (status {status}): {message}")]
    ApiError {
        /// HTTP status code
        status: u16,
        /// Error body returned by the API
        message: String,
    },

    /// The access token was rejected (HTTP 401)
    #[error("Access token rejected by the API")]
    Unauthorized,

    /// Login with the system account was refused
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The refresh token could not be exchanged for a new access token
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    /// No credentials are stored yet
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Response body did not have the expected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),
}

impl ClientError {
    /// Create an API error from status code and message
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            status,
            message: message.into(),
        }
    }

    /// Check if this error is a rejected access token
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }

    /// Check if this error is a client error (4xx status)
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Unauthorized)
            || matches!(self, Self::ApiError { status, .. } if *status >= 400 && *status < 500)
    }

    /// Check if this error is a server error (5xx status)
    pub fn is_server_error(&self) -> bool {
        matches!(self, Self::ApiError { status, .. } if *status >= 500)
    }

    /// Check if the same call may succeed on a later cycle without operator action
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::MalformedResponse(_) | Self::RefreshFailed(_)
        ) || self.is_server_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(ClientError::Unauthorized.is_client_error());
        assert!(ClientError::api_error(400, "bad").is_client_error());
        assert!(!ClientError::api_error(400, "bad").is_transient());
        assert!(ClientError::api_error(503, "down").is_server_error());
        assert!(ClientError::api_error(503, "down").is_transient());
        assert!(ClientError::MalformedResponse("x".into()).is_transient());
        assert!(!ClientError::AuthenticationFailed("x".into()).is_transient());
    }
}
