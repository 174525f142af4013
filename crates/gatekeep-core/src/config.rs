//! Application configuration management.
//!
//! Two layers feed the session machinery:
//! - `Config`: persisted settings (service URL, last username, storage
//!   backend), stored at `~/.config/gatekeep/config.json`
//! - `Environment`: deployment settings read from environment variables
//!   (refresh interval override, auto-login permission)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
const APP_NAME: &str = "gatekeep";

/// Config file name
const CONFIG_FILE: &str = "config.json";

/// Service URL used when neither the config file nor the environment names one
pub const DEFAULT_API_BASE_URL: &str = "http://localhost:7860";

/// Lifetime of access tokens issued by the Auth service (30 minutes)
pub const ACCESS_TOKEN_LIFETIME_SECS: u64 = 30 * 60;

/// Refresh once 90% of the access token lifetime has passed.
pub const DEFAULT_REFRESH_SECS: u64 = ACCESS_TOKEN_LIFETIME_SECS * 9 / 10;

/// Largest refresh interval override accepted, in seconds
const MAX_REFRESH_SECS: f64 = u32::MAX as f64;

/// Overrides the service base URL
pub const API_URL_VAR: &str = "GATEKEEP_API_URL";

/// Overrides the refresh interval, in seconds
pub const REFRESH_SECONDS_VAR: &str = "GATEKEEP_ACCESS_TOKEN_EXPIRE_SECONDS";

/// Whether this deployment permits auto-login
pub const AUTO_LOGIN_VAR: &str = "GATEKEEP_AUTO_LOGIN";

/// Where durable credentials are kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON file in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api_base_url: Option<String>,
    pub last_username: Option<String>,
    pub storage: StorageBackend,
    /// Auto-login mode reported for this deployment; unknown when absent
    pub auto_login: Option<bool>,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory for durable credentials and logs
    pub fn data_dir(&self) -> Result<PathBuf> {
        let data_dir = dirs::data_local_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }

    /// Service base URL; the environment wins over the config file
    pub fn api_base_url(&self, env: &Environment) -> String {
        env.api_url
            .clone()
            .or_else(|| self.api_base_url.clone())
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
    }
}

/// Settings that come from the deployment environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub api_url: Option<String>,
    /// Raw refresh interval override, validated by `refresh_interval`
    pub refresh_seconds: Option<String>,
    pub auto_login_enabled: bool,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable lookup
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_url: lookup(API_URL_VAR).filter(|url| !url.trim().is_empty()),
            refresh_seconds: lookup(REFRESH_SECONDS_VAR),
            auto_login_enabled: lookup(AUTO_LOGIN_VAR)
                .map(|raw| parse_flag(&raw))
                .unwrap_or(false),
        }
    }

    pub fn refresh_interval(&self) -> Duration {
        resolve_refresh_interval(self.refresh_seconds.as_deref())
    }
}

/// Resolve the refresh timer period.
///
/// A positive number of seconds (fractions allowed) is used as given;
/// anything else falls back to `DEFAULT_REFRESH_SECS`.
pub fn resolve_refresh_interval(raw: Option<&str>) -> Duration {
    raw.map(str::trim)
        .and_then(|value| value.parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0 && *secs <= MAX_REFRESH_SECS)
        .map(Duration::from_secs_f64)
        .unwrap_or(Duration::from_secs(DEFAULT_REFRESH_SECS))
}

fn parse_flag(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
