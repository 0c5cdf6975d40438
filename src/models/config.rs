use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_derive::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("error serializing configuration: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("failed to find default configuration path")]
    InvalidDefaultPath,
}

fn default_device_type() -> String {
    "huectl#web".to_owned()
}

/// Address of the bridge and the credential registered on it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct BridgeConfig {
    pub ip: Option<String>,
    pub username: Option<String>,
    /// Timeout for every request to the bridge, in milliseconds
    #[validate(range(min = 100, max = 60000))]
    pub timeout_ms: u64,
    /// Application name sent when registering a user, `app#device`
    #[validate(length(min = 1, max = 40))]
    pub device_type: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            ip: None,
            username: None,
            timeout_ms: 5000,
            device_type: default_device_type(),
        }
    }
}

impl BridgeConfig {
    pub fn is_configured(&self) -> bool {
        self.ip.is_some() && self.username.is_some()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Forget the bridge address and credential
    pub fn clear(&mut self) {
        self.ip = None;
        self.username = None;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default, rename_all = "camelCase")]
pub struct WebConfig {
    #[validate(range(min = 80))]
    pub port: u16,
    pub document_root: String,
    /// Serialize concurrent updates of the same group instead of letting them race
    pub serialize_group_updates: bool,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            port: 3001,
            document_root: "public".to_owned(),
            serialize_group_updates: false,
        }
    }
}

impl WebConfig {
    /// Copy of this configuration listening on `port` instead, if given
    pub fn with_port(&self, port: Option<u16>) -> Self {
        Self {
            port: port.unwrap_or(self.port),
            ..self.clone()
        }
    }
}

#[derive(Default, Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct Config {
    #[validate(nested)]
    pub bridge: BridgeConfig,
    #[validate(nested)]
    pub web: WebConfig,
}

impl Config {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|mut path| {
                path.push("huectl");
                path.push("config.toml");
                path
            })
            .ok_or(ConfigError::InvalidDefaultPath)
    }

    pub fn parse_toml(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load the configuration at `path`, or the default one if it doesn't exist yet
    pub async fn load_file(path: &Path) -> Result<Self, ConfigError> {
        match tokio::fs::read_to_string(path).await {
            Ok(full) => Self::parse_toml(&full),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no configuration file, using defaults");
                Ok(Self::default())
            }
            Err(error) => Err(error.into()),
        }
    }

    pub async fn save_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        tokio::fs::write(path, self.to_string()?).await?;
        debug!(path = %path.display(), "saved configuration");
        Ok(())
    }

    pub fn to_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}
