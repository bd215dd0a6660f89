//! In-memory credential holder backed by a durable storage backend.

use std::sync::{Arc, RwLock};

use serde_json::Value;
use tracing::{debug, info};

use super::credential::{Credential, TokenPair};
use super::store::CredentialStorage;
use crate::error::{Error, Result};

/// Holds the current session credential.
///
/// Reads are served from memory. Every mutation goes to the backend first
/// and only then replaces the in-memory copy, so `write`, `update_tokens`
/// and `clear` return after the change is durable.
pub struct CredentialStore {
    current: RwLock<Option<Credential>>,
    storage: Arc<dyn CredentialStorage>,
}

impl CredentialStore {
    /// Load the persisted credential (if any) from `storage`.
    pub fn load(storage: Arc<dyn CredentialStorage>) -> Result<Self> {
        let current = storage.load()?;
        debug!(
            backend = storage.name(),
            present = current.is_some(),
            "Loaded credential"
        );
        Ok(Self {
            current: RwLock::new(current),
            storage,
        })
    }

    pub fn read(&self) -> Option<Credential> {
        self.current.read().ok().and_then(|guard| guard.clone())
    }

    pub fn access_token(&self) -> Option<String> {
        self.with_current(|c| c.access_token.clone())
            .filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.with_current(|c| c.refresh_token.clone())
            .filter(|t| !t.is_empty())
    }

    /// Replace the whole credential.
    pub fn write(&self, credential: Credential) -> Result<()> {
        let mut guard = self.lock_for_write()?;
        self.storage.save(&credential)?;
        info!(user_id = credential.user_id, "Credential stored");
        *guard = Some(credential);
        Ok(())
    }

    /// Swap in a refreshed token pair, keeping the user identity.
    pub fn update_tokens(&self, tokens: &TokenPair) -> Result<()> {
        let mut guard = self.lock_for_write()?;
        let Some(current) = guard.as_ref() else {
            return Err(Error::AuthExpired("no session to refresh".into()));
        };

        let mut updated = current.clone();
        updated.access_token = tokens.access_token.clone();
        if !tokens.refresh_token.is_empty() {
            updated.refresh_token = tokens.refresh_token.clone();
        }

        self.storage.save(&updated)?;
        debug!(user_id = updated.user_id, "Token pair replaced");
        *guard = Some(updated);
        Ok(())
    }

    /// Replace the stored user profile.
    pub fn update_user_info(&self, info: Value) -> Result<()> {
        let mut guard = self.lock_for_write()?;
        let Some(current) = guard.as_ref() else {
            return Err(Error::AuthExpired("not logged in".into()));
        };

        let mut updated = current.clone();
        if let Some(id) = info.get("id").and_then(Value::as_i64) {
            updated.user_id = id;
        }
        updated.user_info = Some(info);

        self.storage.save(&updated)?;
        *guard = Some(updated);
        Ok(())
    }

    /// Drop the credential from memory and from the backend.
    pub fn clear(&self) -> Result<()> {
        let mut guard = self.lock_for_write()?;
        // Memory is cleared even if the backend fails, so the session ends either way.
        *guard = None;
        self.storage.remove()?;
        info!("Credential cleared");
        Ok(())
    }

    pub fn storage_name(&self) -> &str {
        self.storage.name()
    }

    fn with_current<T>(&self, f: impl FnOnce(&Credential) -> T) -> Option<T> {
        self.current.read().ok()?.as_ref().map(f)
    }

    fn lock_for_write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Option<Credential>>> {
        self.current
            .write()
            .map_err(|_| Error::Storage("credential lock poisoned".into()))
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("storage", &self.storage.name())
            .field("logged_in", &self.read().is_some())
            .finish()
    }
}
