//! CLI configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/chunkup/config.toml`
//! - Windows: `%APPDATA%/chunkup/config.toml`
//!
//! Credentials live next to it in `credentials.json`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use chunkup_protocol::constants::{DEFAULT_API_PREFIX, DEFAULT_SERVICE_PREFIX};
use chunkup_upload::UploadSettings;

const CONFIG_FILE: &str = "config.toml";
const CREDENTIALS_FILE: &str = "credentials.json";

/// CLI configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server origin, e.g. `https://files.example.com`.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Route prefix of the multipart API.
    #[serde(default = "default_api_prefix")]
    pub api_prefix: String,

    /// Route prefix of file listing, deletion and single upload.
    #[serde(default = "default_service_prefix")]
    pub service_prefix: String,

    #[serde(default)]
    pub upload: UploadSettings,
}

fn default_base_url() -> String {
    "http://localhost:8080".into()
}

fn default_api_prefix() -> String {
    DEFAULT_API_PREFIX.into()
}

fn default_service_prefix() -> String {
    DEFAULT_SERVICE_PREFIX.into()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_prefix: default_api_prefix(),
            service_prefix: default_service_prefix(),
            upload: UploadSettings::default(),
        }
    }
}

impl AppConfig {
    /// Loads configuration from `path`, or creates a default there if not found.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: AppConfig = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = AppConfig::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Saves the configuration to `path`.
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration directory.
pub fn config_dir() -> PathBuf {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".config").join("chunkup")
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        PathBuf::from(appdata).join("chunkup")
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        PathBuf::from("/tmp/chunkup")
    }
}

pub fn default_config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE)
}

/// Credentials file stored beside `config_path`.
pub fn credentials_path(config_path: &Path) -> PathBuf {
    config_path
        .parent()
        .map(|dir| dir.join(CREDENTIALS_FILE))
        .unwrap_or_else(|| config_dir().join(CREDENTIALS_FILE))
}
