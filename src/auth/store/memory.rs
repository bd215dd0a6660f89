//! In-memory credential storage.

use super::CredentialStorage;
use crate::auth::credential::Credential;
use crate::error::{Error, Result};
use std::sync::{Arc, RwLock};
use tracing::instrument;

/// In-memory credential storage.
///
/// Nothing survives the process. Useful for tests and for embedding the
/// client where the host application owns persistence. The storage is Clone
/// and clones share the same slot.
#[derive(Debug, Clone, Default)]
pub struct MemoryCredentialStorage {
    inner: Arc<RwLock<Option<Credential>>>,
}

impl MemoryCredentialStorage {
    /// Create a new empty MemoryCredentialStorage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a MemoryCredentialStorage holding an initial credential.
    pub fn with_credential(credential: Credential) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Some(credential))),
        }
    }

    /// Peek at the stored credential without going through the trait.
    pub fn snapshot(&self) -> Option<Credential> {
        self.inner.read().ok().and_then(|guard| guard.clone())
    }
}

fn poisoned() -> Error {
    Error::Storage("memory storage lock poisoned".to_string())
}

impl CredentialStorage for MemoryCredentialStorage {
    #[instrument(skip(self))]
    fn load(&self) -> Result<Option<Credential>> {
        let guard = self.inner.read().map_err(|_| poisoned())?;
        Ok(guard.clone())
    }

    #[instrument(skip(self, credential))]
    fn save(&self, credential: &Credential) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        *guard = Some(credential.clone());
        Ok(())
    }

    #[instrument(skip(self))]
    fn remove(&self) -> Result<()> {
        let mut guard = self.inner.write().map_err(|_| poisoned())?;
        *guard = None;
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
