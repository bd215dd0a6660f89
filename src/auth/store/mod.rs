//! Credential storage backends.

pub mod file;
pub mod memory;
pub mod trait_def;

#[cfg(feature = "system-keyring")]
pub mod keyring;

pub use file::FileCredentialStorage;
pub use memory::MemoryCredentialStorage;
pub use trait_def::CredentialStorage;

#[cfg(feature = "system-keyring")]
pub use keyring::KeyringCredentialStorage;

use crate::config::{StorageBackend, StorageConfig};
use crate::error::Result;
use std::sync::Arc;

/// Open the storage backend selected in the configuration.
pub fn open_storage(config: &StorageConfig) -> Result<Arc<dyn CredentialStorage>> {
    match config.backend {
        StorageBackend::File => {
            let storage = match &config.path {
                Some(path) => FileCredentialStorage::new(path),
                None => FileCredentialStorage::default_path()?,
            };
            Ok(Arc::new(storage))
        }
        StorageBackend::Memory => Ok(Arc::new(MemoryCredentialStorage::new())),
        #[cfg(feature = "system-keyring")]
        StorageBackend::Keyring => Ok(Arc::new(KeyringCredentialStorage::new())),
        #[cfg(not(feature = "system-keyring"))]
        StorageBackend::Keyring => Err(crate::error::Error::Config(
            "keyring storage requires the `system-keyring` feature".into(),
        )),
    }
}
