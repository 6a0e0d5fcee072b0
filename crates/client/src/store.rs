//! Persisted session state.
//!
//! The session consists of four keys: access token, refresh token, the
//! serialized current user, and a logged-in flag. Values are stored as
//! JSON-encoded strings in a [`KeyValueStore`] so the session survives
//! process restarts when backed by a [`FileStore`].
//!
//! # Invariant
//!
//! The access and refresh tokens are only ever written together, in a single
//! [`KeyValueStore::set_many`] call. After any write both are present or both
//! are absent.

use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use keyhaven_core::User;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::debug;

/// Storage keys for the persisted session.
pub mod keys {
    pub const ACCESS_TOKEN: &str = "access_token";
    pub const REFRESH_TOKEN: &str = "refresh_token";
    pub const CURRENT_USER: &str = "current_user";
    pub const LOGGED_IN: &str = "logged_in";

    /// Every key that belongs to the session.
    pub const ALL: [&str; 4] = [ACCESS_TOKEN, REFRESH_TOKEN, CURRENT_USER, LOGGED_IN];
}

/// Errors that can occur while reading or writing persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A thread panicked while holding the store lock.
    #[error("Store lock poisoned")]
    Poisoned,
}

/// A string key/value store with multi-key writes.
pub trait KeyValueStore: Send + Sync {
    /// Read a raw value.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write several values as one step.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError>;

    /// Remove several keys as one step. Missing keys are ignored.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError>;
}

// =============================================================================
// MemoryStore
// =============================================================================

/// Volatile store, used in tests and for one-shot sessions.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: RwLock<HashMap<String, String>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        for (key, value) in entries {
            values.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

// =============================================================================
// FileStore
// =============================================================================

/// Store persisted as a JSON object on disk.
///
/// The whole map is rewritten on every change through a temporary file and a
/// rename, so a crash mid-write leaves the previous session intact. The
/// in-memory map only changes once the write has succeeded.
#[derive(Debug)]
pub struct FileStore {
    path: PathBuf,
    values: RwLock<HashMap<String, String>>,
}

impl FileStore {
    /// Open the store at `path`, loading any existing session.
    ///
    /// A missing file is treated as an empty store.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the file exists but cannot be read or parsed.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let values = match fs::read_to_string(&path) {
            Ok(contents) if contents.trim().is_empty() => HashMap::new(),
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == ErrorKind::NotFound => HashMap::new(),
            Err(e) => return Err(e.into()),
        };
        debug!(path = %path.display(), keys = values.len(), "Opened session store");

        Ok(Self {
            path,
            values: RwLock::new(values),
        })
    }

    /// Location of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, values: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(values)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let values = self.values.read().map_err(|_| StoreError::Poisoned)?;
        Ok(values.get(key).cloned())
    }

    fn set_many(&self, entries: &[(&str, String)]) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = values.clone();
        for (key, value) in entries {
            next.insert((*key).to_string(), value.clone());
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }

    fn remove_many(&self, keys: &[&str]) -> Result<(), StoreError> {
        let mut values = self.values.write().map_err(|_| StoreError::Poisoned)?;
        let mut next = values.clone();
        for key in keys {
            next.remove(*key);
        }
        self.persist(&next)?;
        *values = next;
        Ok(())
    }
}

// =============================================================================
// TokenStore
// =============================================================================

/// Access/refresh token pair issued by the backend.
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: SecretString,
    pub refresh_token: SecretString,
}

impl TokenPair {
    #[must_use]
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: SecretString::from(access_token.into()),
            refresh_token: SecretString::from(refresh_token.into()),
        }
    }
}

/// Typed view of the persisted session.
///
/// Cheap to clone; every clone shares the same backing store.
#[derive(Clone)]
pub struct TokenStore {
    backend: Arc<dyn KeyValueStore>,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore").finish_non_exhaustive()
    }
}

impl TokenStore {
    /// Wrap an existing backend.
    #[must_use]
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Store backed by memory only.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// Store backed by a JSON file.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if an existing file cannot be read.
    pub fn open_file(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Ok(Self::new(Arc::new(FileStore::open(path)?)))
    }

    /// The persisted access token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read.
    pub fn access_token(&self) -> Result<Option<SecretString>, StoreError> {
        self.secret(keys::ACCESS_TOKEN)
    }

    /// The persisted refresh token, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read.
    pub fn refresh_token(&self) -> Result<Option<SecretString>, StoreError> {
        self.secret(keys::REFRESH_TOKEN)
    }

    /// Persist a new token pair and mark the session as logged in.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    pub fn set_tokens(&self, tokens: &TokenPair) -> Result<(), StoreError> {
        self.backend.set_many(&Self::token_entries(tokens)?)
    }

    /// Persist tokens, user and the logged-in flag together.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    pub fn start_session(&self, tokens: &TokenPair, user: &User) -> Result<(), StoreError> {
        let mut entries = Self::token_entries(tokens)?;
        entries.push((keys::CURRENT_USER, serde_json::to_string(user)?));
        self.backend.set_many(&entries)
    }

    /// The persisted user, if any.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read or the stored value
    /// is not a valid user.
    pub fn current_user(&self) -> Result<Option<User>, StoreError> {
        self.backend
            .get(keys::CURRENT_USER)?
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(StoreError::from)
    }

    /// Persist the current user for session display.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    pub fn set_user(&self, user: &User) -> Result<(), StoreError> {
        self.backend
            .set_many(&[(keys::CURRENT_USER, serde_json::to_string(user)?)])
    }

    /// Whether the logged-in flag is set.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be read.
    pub fn is_logged_in(&self) -> Result<bool, StoreError> {
        Ok(self
            .backend
            .get(keys::LOGGED_IN)?
            .is_some_and(|raw| decode_string(&raw) == "true"))
    }

    /// Remove every session key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError` if the backend cannot be written.
    pub fn clear(&self) -> Result<(), StoreError> {
        self.backend.remove_many(&keys::ALL)
    }

    fn secret(&self, key: &str) -> Result<Option<SecretString>, StoreError> {
        Ok(self
            .backend
            .get(key)?
            .map(|raw| decode_string(&raw))
            .filter(|value| !value.is_empty())
            .map(SecretString::from))
    }

    fn token_entries(tokens: &TokenPair) -> Result<Vec<(&'static str, String)>, StoreError> {
        Ok(vec![
            (
                keys::ACCESS_TOKEN,
                serde_json::to_string(tokens.access_token.expose_secret())?,
            ),
            (
                keys::REFRESH_TOKEN,
                serde_json::to_string(tokens.refresh_token.expose_secret())?,
            ),
            (keys::LOGGED_IN, "true".to_string()),
        ])
    }
}

/// Decode a stored string value, accepting both JSON-quoted and raw forms.
fn decode_string(raw: &str) -> String {
    serde_json::from_str::<String>(raw).unwrap_or_else(|_| raw.to_string())
}
