//! Credential storage consulted for every request.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use tracing::{debug, warn};

/// Key of the authorization token.
pub const TOKEN_KEY: &str = "token";

/// Key of the preferred response language.
pub const LANGUAGE_KEY: &str = "language";

/// Language sent when the store has none.
pub const DEFAULT_LANGUAGE: &str = "zh-CN";

/// Key/value credential storage.
///
/// The client reads [`TOKEN_KEY`] and [`LANGUAGE_KEY`] before each request
/// and calls [`clear`](Self::clear) when the backend rejects the session.
pub trait CredentialStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    /// Drops every stored credential.
    fn clear(&self);
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

/// A credential store that lives for the process only.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `token`.
    pub fn with_token(token: impl Into<String>) -> Self {
        let store = Self::new();
        store.set(TOKEN_KEY, token);
        store
    }

    pub fn set(&self, key: &str, value: impl Into<String>) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.into());
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

// ---------------------------------------------------------------------------
// File-backed store
// ---------------------------------------------------------------------------

/// Errors from the file-backed store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// A credential store persisted as a JSON object on disk.
pub struct FileCredentialStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileCredentialStore {
    /// Opens the store, loading existing values if the file exists.
    pub fn open(path: PathBuf) -> Result<Self, CredentialError> {
        let values = load_values(&path)?;
        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Stores a value and writes the file.
    pub fn set(&self, key: &str, value: &str) -> Result<(), CredentialError> {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        self.persist()
    }

    fn persist(&self) -> Result<(), CredentialError> {
        let map = self.values.read().unwrap_or_else(PoisonError::into_inner);
        let json = serde_json::to_string_pretty(&*map)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, json)?;
        debug!("persisted {} credential(s) to {:?}", map.len(), self.path);
        Ok(())
    }
}

impl CredentialStore for FileCredentialStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn clear(&self) {
        self.values
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!("removed credentials file {:?}", self.path),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("failed to remove credentials file {:?}: {e}", self.path),
        }
    }
}

fn load_values(path: &Path) -> Result<HashMap<String, String>, CredentialError> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)?;
    if data.trim().is_empty() {
        return Ok(HashMap::new());
    }
    Ok(serde_json::from_str(&data)?)
}
