use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Environment override tracking
// ---------------------------------------------------------------------------

/// Tracks which configuration settings are overridden by environment variables.
#[derive(Debug, Clone, Default)]
pub struct EnvOverrides {
    overrides: HashMap<String, String>,
}

impl EnvOverrides {
    /// Check whether a setting key (e.g. "api.base_url") is overridden by an env var.
    pub fn is_overridden(&self, key: &str) -> bool {
        self.overrides.contains_key(key)
    }

    /// Get the env var name that overrides the given setting key.
    pub fn env_var_for(&self, key: &str) -> Option<&str> {
        self.overrides.get(key).map(String::as_str)
    }

    pub fn all(&self) -> &HashMap<String, String> {
        &self.overrides
    }

    fn record(&mut self, key: &str, env_var: &str) {
        self.overrides.insert(key.to_string(), env_var.to_string());
    }
}

/// One effective setting, as printed by `kin config`.
#[derive(Debug, Clone, Serialize)]
pub struct SettingEntry {
    /// Dotted key path (e.g. "api.base_url").
    pub key: String,
    pub value: serde_json::Value,
    /// The env var that can override this setting.
    pub env_var: String,
    pub overridden: bool,
}

// ---------------------------------------------------------------------------
// Main configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Env var overrides are not serialized to TOML.
    #[serde(skip)]
    pub env_overrides: EnvOverrides,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            refresh_path: default_refresh_path(),
        }
    }
}

impl ApiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    /// Credential file for the `file` backend. Defaults to
    /// `<data_local_dir>/kin/credentials.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

impl std::fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Keyring => write!(f, "keyring"),
            Self::Memory => write!(f, "memory"),
        }
    }
}

impl FromStr for StorageBackend {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "file" => Ok(Self::File),
            "keyring" => Ok(Self::Keyring),
            "memory" => Ok(Self::Memory),
            _ => Err(format!("Unknown storage backend: {s}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8080/api".to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    10
}

fn default_refresh_path() -> String {
    crate::auth::DEFAULT_REFRESH_PATH.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

// ---------------------------------------------------------------------------
// Config loading, env overrides, and settings report
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a TOML file, then apply `KIN_*` environment
    /// variable overrides. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::parse(&content)?
        } else {
            tracing::warn!("Config file not found at {}, using defaults", path.display());
            Self::default()
        };
        config.apply_env_overrides(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Invalid config: {e}")))
    }

    /// Default config file location: `<config_dir>/kin/config.toml`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("kin")
            .join("config.toml")
    }

    /// Reject settings the client cannot run with.
    pub fn validate(&self) -> Result<()> {
        crate::net::transport::normalize_base_url(&self.api.base_url)?;
        if self.api.request_timeout_secs == 0 {
            return Err(Error::Config("api.request_timeout_secs must be positive".into()));
        }
        if !self.api.refresh_path.starts_with('/') {
            return Err(Error::Config(format!(
                "api.refresh_path must start with '/', got '{}'",
                self.api.refresh_path
            )));
        }
        Ok(())
    }

    /// Apply environment variable overrides, reading variables through `lookup`.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let mut ov = EnvOverrides::default();

        macro_rules! env_str {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = val;
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_bool {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    $field = matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
                    ov.record($key, $env);
                }
            };
        }
        macro_rules! env_parse {
            ($key:expr, $env:expr, $field:expr) => {
                if let Some(val) = lookup($env) {
                    if let Ok(parsed) = val.parse() {
                        $field = parsed;
                        ov.record($key, $env);
                    } else {
                        tracing::warn!("Ignoring unparsable {}={}", $env, val);
                    }
                }
            };
        }

        // -- API --
        env_str!("api.base_url", "KIN_API_BASE_URL", self.api.base_url);
        env_parse!(
            "api.connect_timeout_secs",
            "KIN_API_CONNECT_TIMEOUT",
            self.api.connect_timeout_secs
        );
        env_parse!(
            "api.request_timeout_secs",
            "KIN_API_REQUEST_TIMEOUT",
            self.api.request_timeout_secs
        );
        env_str!("api.refresh_path", "KIN_API_REFRESH_PATH", self.api.refresh_path);

        // -- Storage --
        env_parse!("storage.backend", "KIN_STORAGE_BACKEND", self.storage.backend);
        if let Some(val) = lookup("KIN_STORAGE_PATH") {
            self.storage.path = if val.is_empty() { None } else { Some(PathBuf::from(val)) };
            ov.record("storage.path", "KIN_STORAGE_PATH");
        }

        // -- Logging --
        env_str!("logging.level", "KIN_LOG_LEVEL", self.logging.level);
        env_bool!("logging.json", "KIN_LOG_JSON", self.logging.json);

        self.env_overrides = ov;
    }

    /// Effective settings with their env var names.
    pub fn settings(&self) -> Vec<SettingEntry> {
        let ov = &self.env_overrides;
        let entry = |key: &str, value: serde_json::Value, env_var: &str| SettingEntry {
            key: key.to_string(),
            value,
            env_var: env_var.to_string(),
            overridden: ov.is_overridden(key),
        };

        let storage_path = match &self.storage.path {
            Some(path) => serde_json::json!(path.display().to_string()),
            None => serde_json::Value::Null,
        };

        vec![
            entry("api.base_url", serde_json::json!(self.api.base_url), "KIN_API_BASE_URL"),
            entry("api.connect_timeout_secs", serde_json::json!(self.api.connect_timeout_secs), "KIN_API_CONNECT_TIMEOUT"),
            entry("api.request_timeout_secs", serde_json::json!(self.api.request_timeout_secs), "KIN_API_REQUEST_TIMEOUT"),
            entry("api.refresh_path", serde_json::json!(self.api.refresh_path), "KIN_API_REFRESH_PATH"),
            entry("storage.backend", serde_json::json!(self.storage.backend.to_string()), "KIN_STORAGE_BACKEND"),
            entry("storage.path", storage_path, "KIN_STORAGE_PATH"),
            entry("logging.level", serde_json::json!(self.logging.level), "KIN_LOG_LEVEL"),
            entry("logging.json", serde_json::json!(self.logging.json), "KIN_LOG_JSON"),
        ]
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.api.base_url, "http://localhost:8080/api");
        assert_eq!(config.api.request_timeout(), Duration::from_secs(10));
        assert_eq!(config.api.refresh_path, "/auth/refresh");
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert!(config.storage.path.is_none());
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::parse(
            r#"
            [api]
            base_url = "https://kin.example.com/api"

            [storage]
            backend = "memory"
            "#,
        )
        .unwrap();
        assert_eq!(config.api.base_url, "https://kin.example.com/api");
        assert_eq!(config.api.connect_timeout_secs, 10);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_parse_rejects_unknown_backend() {
        let err = Config::parse("[storage]\nbackend = \"floppy\"\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        config.api.base_url = "localhost:8080".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.refresh_path = "auth/refresh".into();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.api.request_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[api]\nrefresh_path = \"/v2/auth/refresh\"\n\n[logging]\nlevel = \"trace\"\n",
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.api.refresh_path, "/v2/auth/refresh");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.api.connect_timeout_secs, 10);
    }

    #[test]
    fn test_storage_backend_from_str() {
        assert_eq!("file".parse::<StorageBackend>().unwrap(), StorageBackend::File);
        assert_eq!("KEYRING".parse::<StorageBackend>().unwrap(), StorageBackend::Keyring);
        assert_eq!("memory".parse::<StorageBackend>().unwrap(), StorageBackend::Memory);
        assert!("unknown".parse::<StorageBackend>().is_err());
    }

    #[test]
    fn test_env_overrides_tracking() {
        let mut ov = EnvOverrides::default();
        assert!(!ov.is_overridden("api.base_url"));

        ov.record("api.base_url", "KIN_API_BASE_URL");
        assert!(ov.is_overridden("api.base_url"));
        assert_eq!(ov.env_var_for("api.base_url"), Some("KIN_API_BASE_URL"));
        assert_eq!(ov.all().len(), 1);
    }

    fn env_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_env_override_applies() {
        let mut config = Config::default();
        config.apply_env_overrides(env_from(&[
            ("KIN_API_BASE_URL", "https://staging.example.com/api"),
            ("KIN_API_REQUEST_TIMEOUT", "30"),
            ("KIN_STORAGE_BACKEND", "memory"),
        ]));

        assert_eq!(config.api.base_url, "https://staging.example.com/api");
        assert_eq!(config.api.request_timeout_secs, 30);
        assert_eq!(config.storage.backend, StorageBackend::Memory);
        assert!(config.env_overrides.is_overridden("api.base_url"));
        assert!(config.env_overrides.is_overridden("storage.backend"));
        assert!(!config.env_overrides.is_overridden("api.connect_timeout_secs"));

        let settings = config.settings();
        let base = settings.iter().find(|s| s.key == "api.base_url").unwrap();
        assert!(base.overridden);
        assert_eq!(base.env_var, "KIN_API_BASE_URL");
    }

    #[test]
    fn test_env_unparsable_value_is_ignored() {
        let mut config = Config::default();
        config.apply_env_overrides(env_from(&[
            ("KIN_API_CONNECT_TIMEOUT", "soon"),
            ("KIN_STORAGE_PATH", ""),
        ]));

        assert_eq!(config.api.connect_timeout_secs, ApiConfig::default().connect_timeout_secs);
        assert!(!config.env_overrides.is_overridden("api.connect_timeout_secs"));
        assert!(config.storage.path.is_none());
        assert!(config.env_overrides.is_overridden("storage.path"));
    }

    #[test]
    fn test_env_bool_variants() {
        for (val, expected) in [
            ("1", true),
            ("true", true),
            ("on", true),
            ("0", false),
            ("no", false),
        ] {
            let mut config = Config::default();
            config.apply_env_overrides(env_from(&[("KIN_LOG_JSON", val)]));
            assert_eq!(config.logging.json, expected, "KIN_LOG_JSON={val}");
        }
    }
}
