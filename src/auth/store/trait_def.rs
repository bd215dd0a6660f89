//! Credential storage trait.

use crate::auth::credential::Credential;
use crate::error::Result;
use std::sync::Arc;

/// Trait for credential storage backends.
///
/// All storage implementations must be thread-safe (`Send + Sync`) and
/// synchronous: once `save` or `remove` returns, the change must survive a
/// process restart.
pub trait CredentialStorage: Send + Sync {
    /// Load the stored credential, if any.
    fn load(&self) -> Result<Option<Credential>>;

    /// Persist a credential, replacing any previous one.
    fn save(&self, credential: &Credential) -> Result<()>;

    /// Remove the stored credential.
    fn remove(&self) -> Result<()>;

    /// Check if a credential is stored.
    fn exists(&self) -> Result<bool> {
        Ok(self.load()?.is_some())
    }

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}

// Blanket implementation for Arc<T>
impl<T: CredentialStorage + ?Sized> CredentialStorage for Arc<T> {
    fn load(&self) -> Result<Option<Credential>> {
        (**self).load()
    }
    fn save(&self, credential: &Credential) -> Result<()> {
        (**self).save(credential)
    }
    fn remove(&self) -> Result<()> {
        (**self).remove()
    }
    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}

// Blanket implementation for Box<T>
impl<T: CredentialStorage + ?Sized> CredentialStorage for Box<T> {
    fn load(&self) -> Result<Option<Credential>> {
        (**self).load()
    }
    fn save(&self, credential: &Credential) -> Result<()> {
        (**self).save(credential)
    }
    fn remove(&self) -> Result<()> {
        (**self).remove()
    }
    fn exists(&self) -> Result<bool> {
        (**self).exists()
    }
    fn name(&self) -> &str {
        (**self).name()
    }
}
