//! JSON document storage on the local filesystem

use serde::{Serialize, de::DeserializeOwned};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("JSON error in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;

fn io_err(path: &Path) -> impl FnOnce(io::Error) -> StorageError + '_ {
    move |source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn json_err(path: &Path) -> impl FnOnce(serde_json::Error) -> StorageError + '_ {
    move |source| StorageError::Json {
        path: path.to_path_buf(),
        source,
    }
}

/// Read a file as text. Returns `Ok(None)` when it does not exist.
pub fn read_text(path: &Path) -> Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// Load and deserialize a JSON document. Returns `Ok(None)` when missing.
pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    match read_text(path)? {
        Some(text) => serde_json::from_str(&text).map(Some).map_err(json_err(path)),
        None => Ok(None),
    }
}

/// Serialize a document to a file, creating parent directories as needed.
pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value).map_err(json_err(path))?;
    fs::write(path, text).map_err(io_err(path))
}

/// Write a document only if no file exists at `path`.
///
/// The document is written to a temporary file beside `path` and then moved
/// into place without replacing an existing file, so readers only ever see
/// a complete document. Returns `Ok(false)` when another writer got there
/// first.
pub fn save_json_if_absent<T: Serialize>(path: &Path, value: &T) -> Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    ensure_parent(path)?;
    let text = serde_json::to_string_pretty(value).map_err(json_err(path))?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = NamedTempFile::new_in(dir).map_err(io_err(dir))?;
    file.write_all(text.as_bytes()).map_err(io_err(path))?;
    file.as_file().sync_all().map_err(io_err(path))?;

    match file.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(io_err(path)(e.error)),
    }
}

/// Remove a file, ignoring one that is already gone.
pub fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(path)(e)),
    }
}

/// True when `name` can be used as a single file name: non-empty, with no
/// path separators, parent references or NUL bytes
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\', '\0']) && !name.contains("..")
}

/// `<dir>/<name>.json`, or `None` when `name` would escape `dir`
pub fn document_path(dir: &Path, name: &str) -> Option<PathBuf> {
    if !is_safe_name(name) {
        return None;
    }
    let path = dir.join(format!("{}.json", name));
    (path.parent() == Some(dir)).then_some(path)
}

/// Return `path` if it exists, else its lowercased file name if that exists.
pub fn find_case_insensitive(path: &Path) -> Option<PathBuf> {
    if path.is_file() {
        return Some(path.to_path_buf());
    }
    let name = path.file_name()?.to_str()?.to_lowercase();
    let lowered = path.with_file_name(name);
    lowered.is_file().then_some(lowered)
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err(parent))?;
    }
    Ok(())
}
