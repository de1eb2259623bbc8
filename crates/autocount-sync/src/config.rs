//! # Bridge Configuration
//!
//! Configuration for the ERP connection, sync behavior, and local store.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     AUTOCOUNT_API_URL=https://erp.example.com/api                      │
//! │     AUTOCOUNT_USERNAME=bridge                                          │
//! │     AUTOCOUNT_PASSWORD=...                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/autocount-bridge/bridge.toml (Linux)                     │
//! │     ~/Library/Application Support/com.autocount.autocount-bridge/...   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # bridge.toml
//! [erp]
//! base_url = "https://erp.example.com/api"
//! username = "bridge"
//! password = "secret"
//! request_timeout_secs = 30
//! fetch_retry_max_elapsed_secs = 10
//!
//! [sync]
//! max_concurrency = 4
//! retry_batch_limit = 50
//! retry_lease_secs = 300
//!
//! [database]
//! path = "/var/lib/autocount-bridge/bridge.db"
//! ```
//!
//! The loaded config is handed to the Remote Client at construction; the
//! client never reads the environment itself.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

const CONFIG_FILE: &str = "bridge.toml";
const DATABASE_FILE: &str = "bridge.db";

// =============================================================================
// ERP Settings
// =============================================================================

/// Connection settings for the AutoCount API.
#[derive(Clone, Serialize, Deserialize)]
pub struct ErpSettings {
    /// API root, e.g. `https://erp.example.com/api`.
    #[serde(default)]
    pub base_url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Upper bound for any single ERP call (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Total time spent retrying an idempotent list fetch (seconds).
    /// Create and update calls are never retried automatically.
    #[serde(default = "default_fetch_retry")]
    pub fetch_retry_max_elapsed_secs: u64,
}

fn default_request_timeout() -> u64 {
    30
}

fn default_fetch_retry() -> u64 {
    10
}

impl Default for ErpSettings {
    fn default() -> Self {
        ErpSettings {
            base_url: String::new(),
            username: String::new(),
            password: String::new(),
            request_timeout_secs: default_request_timeout(),
            fetch_retry_max_elapsed_secs: default_fetch_retry(),
        }
    }
}

// Keeps the password out of logs.
impl std::fmt::Debug for ErpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErpSettings")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("fetch_retry_max_elapsed_secs", &self.fetch_retry_max_elapsed_secs)
            .finish()
    }
}

impl ErpSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn fetch_retry_max_elapsed(&self) -> Duration {
        Duration::from_secs(self.fetch_retry_max_elapsed_secs)
    }

    /// Parses and checks the base URL.
    pub fn parsed_base_url(&self) -> SyncResult<Url> {
        let url = Url::parse(self.base_url.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "ERP base URL must start with http:// or https://, got: {}",
                self.base_url
            )));
        }
        Ok(url)
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Records processed concurrently within one execute run.
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Entries picked up by one `retry-failed` pass.
    #[serde(default = "default_retry_batch_limit")]
    pub retry_batch_limit: u32,

    /// How long a claimed retry may stay `pending` before another retry
    /// may take the entry over (seconds). Never shorter than two request
    /// timeouts; see `EngineSettings::from_config`.
    #[serde(default = "default_retry_lease")]
    pub retry_lease_secs: u64,
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retry_batch_limit() -> u32 {
    50
}

fn default_retry_lease() -> u64 {
    300
}

impl SyncSettings {
    pub fn retry_lease(&self) -> Duration {
        Duration::from_secs(self.retry_lease_secs)
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            max_concurrency: default_max_concurrency(),
            retry_batch_limit: default_retry_batch_limit(),
            retry_lease_secs: default_retry_lease(),
        }
    }
}

// =============================================================================
// Database Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete bridge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub erp: ErpSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub database: DatabaseSettings,
}

impl BridgeConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (explicit path, else the platform config dir)
    /// 3. Environment variables
    ///
    /// An explicit path that doesn't exist is an error; a missing default
    /// file is not.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        match config_path {
            Some(path) => {
                if !path.exists() {
                    return Err(SyncError::ConfigLoadFailed(format!(
                        "{} does not exist",
                        path.display()
                    )));
                }
                config = Self::from_file(&path)?;
            }
            None => match Self::default_config_path() {
                Some(path) if path.exists() => config = Self::from_file(&path)?,
                Some(path) => debug!(?path, "Config file not found, using defaults"),
                None => debug!("No platform config directory, using defaults"),
            },
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> SyncResult<Self> {
        info!(?path, "Loading bridge config from file");
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Bridge config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.erp.base_url.trim().is_empty() {
            self.erp.parsed_base_url()?;
        }

        if self.erp.request_timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "request_timeout_secs must be greater than 0".into(),
            ));
        }

        if self.sync.max_concurrency == 0 {
            return Err(SyncError::InvalidConfig(
                "max_concurrency must be greater than 0".into(),
            ));
        }

        if self.sync.retry_batch_limit == 0 {
            return Err(SyncError::InvalidConfig(
                "retry_batch_limit must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Checks what a command that talks to the ERP needs.
    pub fn require_erp(&self) -> SyncResult<Url> {
        if self.erp.base_url.trim().is_empty() {
            return Err(SyncError::InvalidConfig(
                "erp.base_url is not set (AUTOCOUNT_API_URL)".into(),
            ));
        }
        if self.erp.username.trim().is_empty() || self.erp.password.is_empty() {
            return Err(SyncError::InvalidConfig(
                "ERP credentials are not set (AUTOCOUNT_USERNAME / AUTOCOUNT_PASSWORD)".into(),
            ));
        }
        self.erp.parsed_base_url()
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("AUTOCOUNT_API_URL") {
            debug!(url = %url, "Overriding ERP URL from environment");
            self.erp.base_url = url;
        }

        if let Some(username) = lookup("AUTOCOUNT_USERNAME") {
            self.erp.username = username;
        }

        if let Some(password) = lookup("AUTOCOUNT_PASSWORD") {
            self.erp.password = password;
        }

        if let Some(timeout) = lookup("AUTOCOUNT_TIMEOUT_SECS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.erp.request_timeout_secs = secs,
                Err(_) => warn!(value = %timeout, "Ignoring invalid AUTOCOUNT_TIMEOUT_SECS"),
            }
        }

        if let Some(path) = lookup("AUTOCOUNT_DB_PATH") {
            self.database.path = Some(PathBuf::from(path));
        }

        if let Some(concurrency) = lookup("AUTOCOUNT_MAX_CONCURRENCY") {
            match concurrency.parse::<usize>() {
                Ok(n) => self.sync.max_concurrency = n,
                Err(_) => warn!(value = %concurrency, "Ignoring invalid AUTOCOUNT_MAX_CONCURRENCY"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "autocount", "autocount-bridge")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
    }

    /// Database file: configured path, else the platform data directory,
    /// else the working directory.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .path
            .clone()
            .or_else(|| Self::project_dirs().map(|dirs| dirs.data_dir().join(DATABASE_FILE)))
            .unwrap_or_else(|| PathBuf::from(DATABASE_FILE))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.erp.request_timeout_secs, 30);
        assert_eq!(config.erp.fetch_retry_max_elapsed_secs, 10);
        assert_eq!(config.sync.max_concurrency, 4);
        assert_eq!(config.sync.retry_batch_limit, 50);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = BridgeConfig::default();

        config.erp.base_url = "ftp://erp.example.com".into();
        assert!(matches!(config.validate(), Err(SyncError::InvalidUrl(_))));

        config.erp.base_url = "not a url".into();
        assert!(config.validate().is_err());

        config.erp.base_url = "https://erp.example.com/api".into();
        assert!(config.validate().is_ok());

        config.sync.max_concurrency = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_require_erp_needs_credentials() {
        let mut config = BridgeConfig::default();
        assert!(config.require_erp().is_err());

        config.erp.base_url = "https://erp.example.com/api".into();
        assert!(config.require_erp().is_err());

        config.erp.username = "bridge".into();
        config.erp.password = "secret".into();
        assert_eq!(config.require_erp().unwrap().host_str(), Some("erp.example.com"));
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("AUTOCOUNT_API_URL", "https://erp.local/api"),
            ("AUTOCOUNT_USERNAME", "ops"),
            ("AUTOCOUNT_PASSWORD", "pw"),
            ("AUTOCOUNT_TIMEOUT_SECS", "5"),
            ("AUTOCOUNT_DB_PATH", "/tmp/b.db"),
            ("AUTOCOUNT_MAX_CONCURRENCY", "many"),
        ]
        .into_iter()
        .collect();

        let mut config = BridgeConfig::default();
        config.apply_overrides(|name| vars.get(name).map(|v| v.to_string()));

        assert_eq!(config.erp.base_url, "https://erp.local/api");
        assert_eq!(config.erp.username, "ops");
        assert_eq!(config.erp.request_timeout_secs, 5);
        assert_eq!(config.database_path(), PathBuf::from("/tmp/b.db"));
        assert_eq!(config.sync.max_concurrency, 4);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
            [erp]
            base_url = "https://erp.example.com/api"
            username = "bridge"
            password = "secret"
            request_timeout_secs = 12

            [sync]
            max_concurrency = 2
            "#
        )
        .unwrap();

        let config = BridgeConfig::load(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.erp.request_timeout_secs, 12);
        assert_eq!(config.sync.max_concurrency, 2);
        assert_eq!(config.sync.retry_batch_limit, 50);
        assert_eq!(config.sync.retry_lease(), Duration::from_secs(300));
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = BridgeConfig::load(Some(dir.path().join("absent.toml")));
        assert!(matches!(result, Err(SyncError::ConfigLoadFailed(_))));
    }

    #[test]
    fn test_save_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(CONFIG_FILE);

        let mut config = BridgeConfig::default();
        config.erp.base_url = "https://erp.example.com/api".into();
        config.sync.retry_batch_limit = 7;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[erp]"));
        let loaded: BridgeConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.sync.retry_batch_limit, 7);
    }

    #[test]
    fn test_debug_redacts_password() {
        let mut config = BridgeConfig::default();
        config.erp.password = "hunter2".into();
        assert!(!format!("{:?}", config).contains("hunter2"));
    }
}
