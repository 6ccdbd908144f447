//! Durable key-value backends for session tokens.
//!
//! The session store only needs string keys and string values that survive a
//! process restart. Writes and removals come in batches: the four session keys
//! are always written or removed together.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Durable key names, shared by every backend
pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const USER_ROLE_KEY: &str = "user_role";
pub const USER_EMAIL_KEY: &str = "user_email";

pub const SESSION_KEYS: [&str; 4] = [
    ACCESS_TOKEN_KEY,
    REFRESH_TOKEN_KEY,
    USER_ROLE_KEY,
    USER_EMAIL_KEY,
];

/// Keychain service name
const SERVICE_NAME: &str = "clinicdesk";

/// Session file name in the data directory
const SESSION_FILE: &str = "session.json";

/// String-keyed persistent storage.
pub trait TokenStorage: Send + Sync {
    /// Read a single key. Missing keys are `Ok(None)`.
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write every entry as one unit.
    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()>;

    /// Remove every key as one unit. Missing keys are not an error.
    fn remove_all(&self, keys: &[&str]) -> Result<()>;
}

/// Which backend holds the session tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    File,
    Keyring,
    Memory,
}

impl StorageKind {
    /// Open the backend, placing file storage under `data_dir`.
    pub fn open(self, data_dir: &Path) -> Result<Box<dyn TokenStorage>> {
        Ok(match self {
            StorageKind::File => Box::new(FileStorage::new(data_dir.join(SESSION_FILE))),
            StorageKind::Keyring => Box::new(KeyringStorage::new(SERVICE_NAME)),
            StorageKind::Memory => Box::new(MemoryStorage::default()),
        })
    }
}

// ============================================================================
// File
// ============================================================================

/// All keys in one JSON file.
///
/// Each batch rewrites the whole file through a temporary sibling and a
/// rename, so a reader after a crash sees either the old or the new set.
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_map(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents =
            std::fs::read_to_string(&self.path).context("Failed to read session file")?;
        serde_json::from_str(&contents).context("Failed to parse session file")
    }

    fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        if map.is_empty() {
            if self.path.exists() {
                std::fs::remove_file(&self.path).context("Failed to remove session file")?;
            }
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let contents = serde_json::to_string_pretty(map)?;
        std::fs::write(&tmp, contents).context("Failed to write session file")?;
        std::fs::rename(&tmp, &self.path).context("Failed to replace session file")?;
        Ok(())
    }

    fn guard(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| anyhow!("session file lock poisoned"))
    }
}

impl TokenStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.guard()?;
        Ok(self.read_map()?.remove(key))
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let _guard = self.guard()?;
        let mut map = self.read_map()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), (*value).to_string());
        }
        self.write_map(&map)?;
        debug!(path = %self.path.display(), keys = entries.len(), "Session file written");
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let _guard = self.guard()?;
        // An unreadable file is replaced rather than left behind
        let mut map = self.read_map().unwrap_or_default();
        for key in keys {
            map.remove(*key);
        }
        self.write_map(&map)
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// One keychain entry per key, under a shared service name.
///
/// The keychain has no transactions: a batch that fails half way is retried
/// key by key on the next write.
pub struct KeyringStorage {
    service: String,
}

impl KeyringStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> Result<Entry> {
        Entry::new(&self.service, key).context("Failed to create keyring entry")
    }
}

impl TokenStorage for KeyringStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        match self.entry(key)?.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve token from keychain"),
        }
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        for (key, value) in entries {
            self.entry(key)?
                .set_password(value)
                .context("Failed to store token in keychain")?;
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut first_error = None;
        for key in keys {
            match self.entry(key)?.delete_credential() {
                Ok(()) | Err(keyring::Error::NoEntry) => {}
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e).context("Failed to delete token from keychain"),
            None => Ok(()),
        }
    }
}

// ============================================================================
// Memory
// ============================================================================

/// Process-local storage. Survives a [`crate::auth::SessionStore`] being
/// rebuilt over the same instance, which is how tests simulate a restart.
#[derive(Default)]
pub struct MemoryStorage {
    values: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    fn values(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.values
            .lock()
            .map_err(|_| anyhow!("memory storage lock poisoned"))
    }
}

impl TokenStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.values()?.get(key).cloned())
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        let mut values = self.values()?;
        for (key, value) in entries {
            values.insert((*key).to_string(), (*value).to_string());
        }
        Ok(())
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        let mut values = self.values()?;
        for key in keys {
            values.remove(*key);
        }
        Ok(())
    }
}

impl<T: TokenStorage + ?Sized> TokenStorage for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Result<Option<String>> {
        (**self).get(key)
    }

    fn set_all(&self, entries: &[(&str, &str)]) -> Result<()> {
        (**self).set_all(entries)
    }

    fn remove_all(&self, keys: &[&str]) -> Result<()> {
        (**self).remove_all(keys)
    }
}
