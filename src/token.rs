/// In-memory access token mirrored to durable storage
use crate::error::{ApiError, Result};
use crate::storage::TokenStorage;
use parking_lot::RwLock;
use serde::Deserialize;

/// Body returned by the token issuance and refresh endpoints
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenGrant {
    /// The access token, rejecting grants that do not carry one
    pub fn into_access_token(self) -> Result<String> {
        self.access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ApiError::InvalidResponse("response does not contain access_token".into()))
    }
}

/// Holds the current access token.
///
/// Reads never touch durable storage. Writes update memory first and then
/// mirror to storage on a best-effort basis: a storage failure is logged and
/// does not affect the in-memory value.
pub struct TokenStore<S: TokenStorage> {
    token: RwLock<Option<String>>,
    storage: S,
    key: String,
}

impl<S: TokenStorage> TokenStore<S> {
    /// Create a token store, restoring any token already persisted under `key`
    pub fn new(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();
        let restored = match storage.get(&key) {
            Ok(token) => token.filter(|t| !t.is_empty()),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to restore token from storage");
                None
            }
        };

        if restored.is_some() {
            tracing::debug!(key = %key, "Restored token from storage");
        }

        Self {
            token: RwLock::new(restored),
            storage,
            key,
        }
    }

    /// Current token, if any
    pub fn get(&self) -> Option<String> {
        self.token.read().clone()
    }

    pub fn is_present(&self) -> bool {
        self.token.read().is_some()
    }

    /// Replace the token. `None` (or an empty string) deletes it from storage.
    pub fn set(&self, token: Option<String>) {
        let token = token.filter(|t| !t.is_empty());
        *self.token.write() = token.clone();

        let mirrored = match &token {
            Some(value) => self.storage.set(&self.key, value),
            None => self.storage.remove(&self.key),
        };
        if let Err(e) = mirrored {
            tracing::warn!(key = %self.key, error = %e, "Failed to mirror token to storage");
        }
    }

    pub fn clear(&self) {
        self.set(None);
    }

    pub fn storage(&self) -> &S {
        &self.storage
    }
}
