//! Instance configuration
//!
//! Loaded from a TOML file, with environment variables taking precedence.
//! Every field has a default so an empty file is a valid configuration.

use crate::endpoint::AlternateDomains;
use crate::handle::PathTemplates;
use crate::signature::{SignatureError, SigningKey};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {name}: {value}")]
    InvalidEnv { name: String, value: String },

    #[error("Signing key error: {0}")]
    Signing(#[from] SignatureError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Key used to sign outbound requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// e.g. `https://example.com/actor#main-key`
    pub key_id: String,
    /// PKCS#8 PEM file
    pub private_key_path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of the on-disk layout (`wfendpoints/`, `accounts/`, `cache/actors/`)
    pub base_dir: PathBuf,
    /// Clearnet domain of this instance
    pub domain: String,
    pub port: u16,
    /// `https`, or `http` for development
    pub scheme: String,
    pub onion_domain: Option<String>,
    pub i2p_domain: Option<String>,
    /// Address the daemon listens on
    pub bind_address: String,
    /// Seconds between actor cache expiry sweeps
    pub expire_interval_secs: u64,
    pub user_paths: Vec<String>,
    pub group_paths: Vec<String>,
    pub signing: Option<SigningConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let templates = PathTemplates::default();
        Self {
            base_dir: PathBuf::from("."),
            domain: "localhost".to_string(),
            port: 443,
            scheme: "https".to_string(),
            onion_domain: None,
            i2p_domain: None,
            bind_address: "0.0.0.0:8080".to_string(),
            expire_interval_secs: 3600,
            user_paths: templates.user_paths,
            group_paths: templates.group_paths,
            signing: None,
        }
    }
}

impl Config {
    /// Load a TOML config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(contents: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Load `path` if it exists, otherwise start from defaults, then apply
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };
        config.with_env(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an environment lookup
    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        if let Some(value) = env("FINGERPOST_BASE_DIR") {
            self.base_dir = PathBuf::from(value);
        }
        if let Some(value) = env("FINGERPOST_DOMAIN") {
            self.domain = value;
        }
        if let Some(value) = env("FINGERPOST_PORT") {
            self.port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                name: "FINGERPOST_PORT".to_string(),
                value,
            })?;
        }
        if let Some(value) = env("FINGERPOST_SCHEME") {
            self.scheme = value;
        }
        if let Some(value) = env("FINGERPOST_ONION_DOMAIN") {
            self.onion_domain = Some(value);
        }
        if let Some(value) = env("FINGERPOST_I2P_DOMAIN") {
            self.i2p_domain = Some(value);
        }
        if let Some(value) = env("BIND_ADDRESS") {
            self.bind_address = value;
        }
        if let (Some(key_id), Some(path)) = (env("FINGERPOST_KEY_ID"), env("FINGERPOST_PRIVATE_KEY")) {
            self.signing = Some(SigningConfig {
                key_id,
                private_key_path: PathBuf::from(path),
            });
        }
        Ok(self)
    }

    pub fn templates(&self) -> PathTemplates {
        PathTemplates {
            user_paths: self.user_paths.clone(),
            group_paths: self.group_paths.clone(),
        }
    }

    pub fn alternate_domains(&self) -> AlternateDomains {
        AlternateDomains {
            onion: self.onion_domain.clone(),
            i2p: self.i2p_domain.clone(),
        }
    }

    /// Read the configured signing key, if any
    pub fn signing_key(&self) -> Result<Option<SigningKey>> {
        let Some(signing) = &self.signing else {
            return Ok(None);
        };
        let pem = std::fs::read_to_string(&signing.private_key_path).map_err(|source| {
            ConfigError::Read {
                path: signing.private_key_path.clone(),
                source,
            }
        })?;
        Ok(Some(SigningKey::from_pem(signing.key_id.clone(), &pem)?))
    }
}
