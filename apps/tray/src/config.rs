use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const CONFIG_DIR_NAME: &str = "tailnet-tray";
pub const CONFIG_FILE_NAME: &str = "tray.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config file '{}': {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("{key} is not a valid url ('{value}'): {source}")]
    InvalidUrl {
        key: &'static str,
        value: String,
        source: url::ParseError,
    },
    #[error("invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the daemon's local API.
    pub daemon_url: String,
    pub api_password: Option<String>,
    pub reconnect_delay_secs: u64,
    /// Page opened by "More settings".
    pub settings_url: String,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daemon_url: "http://127.0.0.1:41112".into(),
            api_password: None,
            reconnect_delay_secs: 3,
            settings_url: "http://100.100.100.100/".into(),
            log_filter: "info".into(),
        }
    }
}

impl Settings {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    /// Applies `TRAY_*` overrides. `lookup` stands in for the process environment.
    pub fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<(), ConfigError> {
        if let Some(v) = lookup("TRAY_DAEMON_URL") {
            self.daemon_url = v;
        }
        if let Some(v) = lookup("TRAY_API_PASSWORD") {
            self.api_password = Some(v).filter(|v| !v.is_empty());
        }
        if let Some(v) = lookup("TRAY_RECONNECT_DELAY_SECS") {
            self.reconnect_delay_secs = v.trim().parse().map_err(|_| ConfigError::InvalidValue {
                key: "TRAY_RECONNECT_DELAY_SECS",
                value: v.clone(),
            })?;
        }
        if let Some(v) = lookup("TRAY_SETTINGS_URL") {
            self.settings_url = v;
        }
        if let Some(v) = lookup("TRAY_LOG") {
            self.log_filter = v;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("daemon_url", &self.daemon_url),
            ("settings_url", &self.settings_url),
        ] {
            Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
                key,
                value: value.clone(),
                source,
            })?;
        }
        if self.reconnect_delay_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "reconnect_delay_secs",
                value: "0".into(),
            });
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
}

/// Defaults, then the config file, then the process environment.
///
/// An explicit `path` must exist; the default location is optional.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    load_settings_with(path, default_config_path(), |key| std::env::var(key).ok())
}

fn load_settings_with(
    path: Option<&Path>,
    default_path: Option<PathBuf>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Settings, ConfigError> {
    let mut settings = match path {
        Some(path) => read_file(path)?,
        None => match default_path {
            Some(path) if path.exists() => read_file(&path)?,
            _ => Settings::default(),
        },
    };
    settings.apply_env(lookup)?;
    Ok(settings)
}

fn read_file(path: &Path) -> Result<Settings, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
