//! Session credential storage
//!
//! The session tokens live in a small string key-value store, the same
//! three keys the dashboard keeps in browser storage:
//! - `accessToken`
//! - `refreshToken`
//! - `user` (serialized user record)
//!
//! `TokenStore` is the injectable backend; `TokenStorage` is the typed view
//! the API guard, the realtime manager and the services share.

mod file_store;

pub use file_store::FileTokenStore;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use crate::types::auth::{Tokens, User};
use crate::types::error::{OneMailError, Result};

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";
pub const USER_KEY: &str = "user";
/// User id remembered across the Gmail OAuth redirect
pub const GMAIL_OAUTH_USER_KEY: &str = "gmailOAuthUserId";

/// String key-value backend for session state
pub trait TokenStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Remove every key
    fn clear(&self) -> Result<()>;

    /// Write several keys as one operation
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Remove several keys as one operation
    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key)?;
        }
        Ok(())
    }
}

/// In-process store, used by tests and short-lived sessions
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|e| OneMailError::Credential(format!("Token store lock poisoned: {}", e)))
    }
}

impl TokenStore for MemoryTokenStore {
    fn get(&self, key: &str) -> Option<String> {
        self.lock().ok()?.get(key).cloned()
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.lock()?.remove(key);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        self.lock()?.clear();
        Ok(())
    }
}

/// Typed access to the session keys
#[derive(Clone)]
pub struct TokenStorage {
    store: Arc<dyn TokenStore>,
}

impl TokenStorage {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self { store }
    }

    /// Storage backed by a fresh in-memory store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryTokenStore::new()))
    }

    pub fn store(&self) -> &Arc<dyn TokenStore> {
        &self.store
    }

    // ========================================================================
    // Tokens
    // ========================================================================

    /// Store both tokens together
    pub fn set_tokens(&self, tokens: &Tokens) -> Result<()> {
        self.store.set_all(&[
            (ACCESS_TOKEN_KEY, tokens.access_token.as_str()),
            (REFRESH_TOKEN_KEY, tokens.refresh_token.as_str()),
        ])?;
        debug!("Stored session tokens");
        Ok(())
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get(ACCESS_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.store.get(REFRESH_TOKEN_KEY).filter(|t| !t.is_empty())
    }

    /// Clear both tokens and the stored user record
    pub fn clear_tokens(&self) -> Result<()> {
        self.store
            .remove_all(&[ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY, USER_KEY])?;
        debug!("Cleared session tokens");
        Ok(())
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token().is_some()
    }

    // ========================================================================
    // User record
    // ========================================================================

    pub fn set_user(&self, user: &User) -> Result<()> {
        let json = serde_json::to_string(user)?;
        self.store.set(USER_KEY, &json)
    }

    /// Stored user, if present and readable
    pub fn user(&self) -> Option<User> {
        let raw = self.store.get(USER_KEY)?;
        match serde_json::from_str(&raw) {
            Ok(user) => Some(user),
            Err(e) => {
                warn!("Ignoring unreadable stored user record: {}", e);
                None
            }
        }
    }

    pub fn clear_user(&self) -> Result<()> {
        self.store.remove(USER_KEY)
    }

    /// Clear tokens and user in one go, as done on logout or refresh failure
    pub fn clear_session(&self) -> Result<()> {
        self.clear_tokens()?;
        self.clear_user()
    }

    // ========================================================================
    // Pending Gmail link
    // ========================================================================

    pub fn set_pending_gmail_user(&self, user_id: &str) -> Result<()> {
        self.store.set(GMAIL_OAUTH_USER_KEY, user_id)
    }

    pub fn pending_gmail_user(&self) -> Option<String> {
        self.store.get(GMAIL_OAUTH_USER_KEY).filter(|id| !id.is_empty())
    }

    pub fn clear_pending_gmail_user(&self) -> Result<()> {
        self.store.remove(GMAIL_OAUTH_USER_KEY)
    }
}

impl std::fmt::Debug for TokenStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStorage")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}
