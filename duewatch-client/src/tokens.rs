//! Token store
//!
//! Process-wide holder of the current access/refresh credentials.
//! Readers always get a coherent snapshot of the pair; nothing is persisted,
//! so a restarted process has to log in again.

use duewatch_core::domain::Credentials;
use std::sync::{PoisonError, RwLock};

/// Thread-safe credentials holder shared by the auth and due-item clients
#[derive(Debug, Default)]
pub struct TokenStore {
    current: RwLock<Option<Credentials>>,
}

impl TokenStore {
    /// Creates an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the current credentials, if any
    pub fn get(&self) -> Option<Credentials> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Replaces both tokens
    pub fn set(&self, credentials: Credentials) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(credentials);
    }

    /// Replaces the access token, keeping the refresh token
    ///
    /// Returns `false` if there were no credentials to update.
    pub fn set_access_token(&self, access_token: impl Into<String>) -> bool {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(credentials) => {
                credentials.access_token = access_token.into();
                true
            }
            None => false,
        }
    }
}
