//! System keyring credential storage.

use super::CredentialStorage;
use crate::auth::credential::Credential;
use crate::error::{Error, Result};
use tracing::{instrument, warn};

/// Credential storage in the operating system keyring.
///
/// The credential is stored as one JSON secret under `(service, account)`.
#[derive(Debug, Clone)]
pub struct KeyringCredentialStorage {
    service: String,
    account: String,
}

impl Default for KeyringCredentialStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyringCredentialStorage {
    const SERVICE_NAME: &str = "kin-client";
    const ACCOUNT_NAME: &str = "session";

    pub fn new() -> Self {
        Self::with_service(Self::SERVICE_NAME)
    }

    /// Use a custom keyring service name.
    pub fn with_service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: Self::ACCOUNT_NAME.to_string(),
        }
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| Error::Storage(format!("Failed to open keyring entry: {}", e)))
    }
}

impl CredentialStorage for KeyringCredentialStorage {
    #[instrument(skip(self), fields(service = %self.service))]
    fn load(&self) -> Result<Option<Credential>> {
        match self.entry()?.get_password() {
            Ok(secret) => match serde_json::from_str(&secret) {
                Ok(credential) => Ok(Some(credential)),
                Err(e) => {
                    warn!(error = %e, "Discarding unreadable keyring credential");
                    Ok(None)
                }
            },
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(Error::Storage(format!("Keyring error: {}", e))),
        }
    }

    #[instrument(skip(self, credential), fields(service = %self.service))]
    fn save(&self, credential: &Credential) -> Result<()> {
        let secret = serde_json::to_string(credential)
            .map_err(|e| Error::Storage(format!("Failed to serialize credential: {}", e)))?;
        self.entry()?
            .set_password(&secret)
            .map_err(|e| Error::Storage(format!("Keyring error: {}", e)))
    }

    #[instrument(skip(self), fields(service = %self.service))]
    fn remove(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(Error::Storage(format!("Keyring error: {}", e))),
        }
    }

    fn name(&self) -> &str {
        "keyring"
    }
}
