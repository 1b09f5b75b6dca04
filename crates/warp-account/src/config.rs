//! Settings
//!
//! Loaded from a TOML file; every field has a default so an absent file
//! (or a partial one) is fine.
//!
//! ```toml
//! conf_dir = "/home/me/.config/warpctl"
//!
//! [api]
//! timeout_secs = 15
//!
//! [profile]
//! mtu = 1280
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Top-level settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarpConfig {
    /// Directory holding the account, warp-config and profile files
    pub conf_dir: PathBuf,
    /// Account credential file name
    pub account_file: String,
    /// Warp-config record file name
    pub warp_config_file: String,
    /// WireGuard profile file name
    pub profile_file: String,
    /// Registration API settings
    pub api: ApiSettings,
    /// Rendered profile settings
    pub profile: ProfileSettings,
}

impl Default for WarpConfig {
    fn default() -> Self {
        Self {
            conf_dir: PathBuf::from("warp"),
            account_file: "wgcf-account.toml".to_string(),
            warp_config_file: "wgcf-config.json".to_string(),
            profile_file: "wgcf-profile.conf".to_string(),
            api: ApiSettings::default(),
            profile: ProfileSettings::default(),
        }
    }
}

impl WarpConfig {
    /// Load from a TOML file. A missing file gives the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Self::from_toml(&content),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(ConfigError::Io(e.to_string())),
        }
    }

    /// Parse from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Export as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))
    }

    /// Replace the configuration directory
    pub fn with_conf_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.conf_dir = dir.into();
        self
    }

    pub fn account_path(&self) -> PathBuf {
        self.conf_dir.join(&self.account_file)
    }

    pub fn warp_config_path(&self) -> PathBuf {
        self.conf_dir.join(&self.warp_config_file)
    }

    pub fn profile_path(&self) -> PathBuf {
        self.conf_dir.join(&self.profile_file)
    }
}

/// Registration API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// Service root, without the version segment
    pub base_url: String,
    /// API version path segment
    pub version: String,
    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
    /// Platform label sent on registration
    pub platform: String,
    /// User-Agent header
    pub user_agent: String,
    /// CF-Client-Version header
    pub client_version: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "https://api.cloudflareclient.com".to_string(),
            version: "v0a1922".to_string(),
            timeout_secs: 30,
            platform: "PC".to_string(),
            user_agent: "okhttp/3.12.1".to_string(),
            client_version: "a-6.3-1922".to_string(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Settings applied when rendering the WireGuard profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSettings {
    /// DNS server written to the `[Interface]` section
    pub dns: String,
    /// Interface MTU
    pub mtu: u16,
}

impl Default for ProfileSettings {
    fn default() -> Self {
        Self {
            dns: "1.1.1.1".to_string(),
            mtu: 1280,
        }
    }
}

/// Configuration errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Serialize error: {0}")]
    Serialize(String),
}
