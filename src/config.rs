use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::record::MAX_PHOTO_BYTES;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "idcard.toml";

// -----------------------------------------------------------------------------
// Config (root)
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub card: CardConfig,
    #[serde(default)]
    pub export: ExportConfig,
}

impl Config {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source: e,
                });
            }
        };
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(contents)?;
        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(1..=4).contains(&self.export.pixel_ratio) {
            return Err(ConfigError::Invalid(format!(
                "export.pixel_ratio must be between 1 and 4, got {}",
                self.export.pixel_ratio
            )));
        }
        if self.server.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid(
                "server.max_upload_bytes must be positive".to_string(),
            ));
        }
        if self.card.school.trim().is_empty() {
            return Err(ConfigError::Invalid("card.school must not be empty".to_string()));
        }
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// StoreConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    /// Directory holding the local key-value entries.
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
    #[serde(default = "default_remote_url")]
    pub remote_url: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            remote_url: default_remote_url(),
        }
    }
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".idcard/storage")
}

fn default_remote_url() -> String {
    "http://127.0.0.1:5000".to_string()
}

// -----------------------------------------------------------------------------
// ServerConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_uploads_dir")]
    pub uploads_dir: PathBuf,
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            database: default_database(),
            uploads_dir: default_uploads_dir(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_database() -> PathBuf {
    PathBuf::from(".idcard/cards.db")
}

fn default_uploads_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_upload_bytes() -> u64 {
    MAX_PHOTO_BYTES
}

// -----------------------------------------------------------------------------
// CardConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct CardConfig {
    #[serde(default = "default_school")]
    pub school: String,
    /// Template name or alias used when none is given on the command line.
    #[serde(default = "default_template")]
    pub template: String,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            school: default_school(),
            template: default_template(),
        }
    }
}

fn default_school() -> String {
    "Unity School".to_string()
}

fn default_template() -> String {
    "blue".to_string()
}

// -----------------------------------------------------------------------------
// ExportConfig
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_pixel_ratio")]
    pub pixel_ratio: u32,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            pixel_ratio: default_pixel_ratio(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_pixel_ratio() -> u32 {
    2
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

// -----------------------------------------------------------------------------
// ConfigError
// -----------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.store.backend, StoreBackend::Local);
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.server.max_upload_bytes, MAX_PHOTO_BYTES);
        assert_eq!(config.card.school, "Unity School");
        assert_eq!(config.export.pixel_ratio, 2);
    }

    #[test]
    fn partial_file_overrides_only_given_keys() {
        let config = Config::from_toml(
            r#"
            [store]
            backend = "remote"
            remote_url = "http://cards.internal:8080"

            [card]
            template = "purple"
            "#,
        )
        .unwrap();
        assert_eq!(config.store.backend, StoreBackend::Remote);
        assert_eq!(config.store.remote_url, "http://cards.internal:8080");
        assert_eq!(config.card.template, "purple");
        assert_eq!(config.card.school, "Unity School");
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn out_of_range_values_rejected() {
        let err = Config::from_toml("[export]\npixel_ratio = 9\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
        let err = Config::from_toml("[store]\nbackend = \"cloud\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }
}
