//! Configuration lookup for fingerctl
//!
//! Uses `--config` when given, otherwise
//! `$XDG_CONFIG_HOME/fingerpost/config.toml`. A missing file means defaults
//! plus environment overrides.

use fingerpost::Config;
use miette::{IntoDiagnostic, Result, WrapErr, miette};
use std::path::{Path, PathBuf};

/// Returns the path to the default config file
fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        miette!(
            help = "Pass --config explicitly or ensure your system has a valid home directory",
            "Could not determine XDG config directory"
        )
    })?;
    Ok(config_dir.join("fingerpost").join("config.toml"))
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_config_path()?,
    };
    Config::load(Some(&path))
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to load configuration from {}", path.display()))
}

/// Read a PEM public key for a new endpoint
pub fn read_public_key(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .into_diagnostic()
        .wrap_err_with(|| format!("Failed to read public key at {}", path.display()))
}
