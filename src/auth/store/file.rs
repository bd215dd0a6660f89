//! File-based credential storage.

use super::CredentialStorage;
use crate::auth::credential::Credential;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{instrument, warn};

/// File permissions for the credential file (Unix only): owner read/write.
#[cfg(unix)]
const FILE_MODE: u32 = 0o600;

/// Directory permissions (Unix only): owner read/write/execute.
#[cfg(unix)]
const DIR_MODE: u32 = 0o700;

/// File-based credential storage.
///
/// Stores the credential as a single JSON object with the keys
/// `accessToken`, `refreshToken`, `userId` and `userInfo`.
///
/// # Security
/// - File permissions are set to 0600 (owner read/write only) on Unix
/// - Parent directories are created with 0700 permissions
#[derive(Debug, Clone)]
pub struct FileCredentialStorage {
    path: PathBuf,
}

impl FileCredentialStorage {
    /// Create a new FileCredentialStorage backed by the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default location: `<data_local_dir>/kin/credentials.json`.
    pub fn default_path() -> Result<Self> {
        let dir = dirs::data_local_dir()
            .ok_or_else(|| Error::Config("Cannot determine local data directory".into()))?;
        Ok(Self::new(dir.join("kin").join("credentials.json")))
    }

    /// Get the path of the credential file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the parent directory exists with correct permissions.
    fn ensure_dir(&self) -> Result<()> {
        let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) else {
            return Ok(());
        };
        if dir.exists() {
            return Ok(());
        }

        std::fs::create_dir_all(dir).map_err(|e| {
            Error::Storage(format!(
                "Failed to create credential directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(DIR_MODE);
            std::fs::set_permissions(dir, perms).map_err(|e| {
                Error::Storage(format!(
                    "Failed to set directory permissions on '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    fn write_temp(&self, temp_path: &Path, content: &str) -> Result<()> {
        let write_err = |e: std::io::Error| {
            Error::Storage(format!(
                "Failed to write temp file '{}': {}",
                temp_path.display(),
                e
            ))
        };

        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(FILE_MODE)
                .open(temp_path)
                .map_err(write_err)?;
            file.write_all(content.as_bytes()).map_err(write_err)?;
            file.sync_all().map_err(write_err)?;
        }

        #[cfg(not(unix))]
        {
            std::fs::write(temp_path, content).map_err(write_err)?;
        }

        Ok(())
    }
}

impl CredentialStorage for FileCredentialStorage {
    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn load(&self) -> Result<Option<Credential>> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(Error::Storage(format!(
                    "Failed to read credential file '{}': {}",
                    self.path.display(),
                    e
                )));
            }
        };

        if content.trim().is_empty() {
            return Ok(None);
        }

        match serde_json::from_str::<Credential>(&content) {
            Ok(credential) => Ok(Some(credential)),
            Err(e) => {
                // Unreadable content counts as logged out.
                warn!(error = %e, "Discarding unreadable credential file");
                if let Err(e) = std::fs::remove_file(&self.path) {
                    warn!(error = %e, "Failed to remove unreadable credential file");
                }
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, credential), fields(path = %self.path.display()))]
    fn save(&self, credential: &Credential) -> Result<()> {
        self.ensure_dir()?;

        let content = serde_json::to_string_pretty(credential)
            .map_err(|e| Error::Storage(format!("Failed to serialize credential: {}", e)))?;

        // Write to a temp file first, then rename for atomicity.
        let temp_path = self.path.with_extension("tmp");
        self.write_temp(&temp_path, &content)?;

        if let Err(e) = std::fs::rename(&temp_path, &self.path) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(Error::Storage(format!(
                "Failed to rename '{}' to '{}': {}",
                temp_path.display(),
                self.path.display(),
                e
            )));
        }

        Ok(())
    }

    #[instrument(skip(self), fields(path = %self.path.display()))]
    fn remove(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::Storage(format!(
                "Failed to remove credential file '{}': {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn exists(&self) -> Result<bool> {
        Ok(self.path.exists())
    }

    fn name(&self) -> &str {
        "file"
    }
}
