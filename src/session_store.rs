//! Session token storage with per-key expiration

use crate::error::{ClientError, Result};
use crate::types::{AccessToken, RefreshToken};
use chrono::{DateTime, Utc};
use papaya::HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

pub const ACCESS_TOKEN_KEY: &str = "accessToken";
pub const REFRESH_TOKEN_KEY: &str = "refreshToken";

/// Storage for the current session's tokens.
///
/// Each key is a single mutable slot with read/overwrite semantics; the last
/// write wins. Entries carry a storage expiry after which they read as absent.
/// That expiry is only a cleanup horizon: whether an access token is stale is
/// decided by its own `exp` claim.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    fn get_access_token(&self) -> Result<Option<AccessToken>> {
        Ok(self.get(ACCESS_TOKEN_KEY)?.map(AccessToken::new))
    }

    fn get_refresh_token(&self) -> Result<Option<RefreshToken>> {
        Ok(self.get(REFRESH_TOKEN_KEY)?.map(RefreshToken::new))
    }

    /// Overwrite the access token
    fn set_access_token(&self, token: &AccessToken, ttl: Duration) -> Result<()> {
        self.set(ACCESS_TOKEN_KEY, token.as_str(), ttl)
    }

    fn set_refresh_token(&self, token: &RefreshToken, ttl: Duration) -> Result<()> {
        self.set(REFRESH_TOKEN_KEY, token.as_str(), ttl)
    }

    /// Remove both tokens
    fn clear(&self) -> Result<()> {
        self.remove(ACCESS_TOKEN_KEY)?;
        self.remove(REFRESH_TOKEN_KEY)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    value: String,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn new(value: &str, ttl: Duration) -> Result<Self> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| ClientError::Storage(format!("session TTL out of range: {ttl:?}")))?;
        Ok(Self {
            value: value.to_string(),
            expires_at,
        })
    }

    fn is_live(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

/// Thread-safe in-memory session store using Papaya HashMap
///
/// Clones share the same underlying map.
#[derive(Clone)]
pub struct MemorySessionStore {
    entries: Arc<HashMap<String, StoredEntry>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(HashMap::new()),
        }
    }

    /// Keys currently holding a live entry
    pub fn keys(&self) -> Vec<String> {
        let now = Utc::now();
        self.entries
            .pin()
            .iter()
            .filter(|(_, entry)| entry.is_live(now))
            .map(|(k, _)| k.clone())
            .collect()
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStore for MemorySessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        // Expired entries are left in place; the next write to the key replaces them.
        let entries = self.entries.pin();
        match entries.get(key) {
            Some(entry) if entry.is_live(Utc::now()) => Ok(Some(entry.value.clone())),
            _ => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(value, ttl)?;
        self.entries.pin().insert(key.to_string(), entry);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.entries.pin().remove(key);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionFile {
    version: u32,
    entries: BTreeMap<String, StoredEntry>,
}

/// Session store persisted as a JSON file, surviving process restarts.
///
/// Every write rewrites the whole file. A missing file is an empty session.
#[derive(Debug)]
pub struct FileSessionStore {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock(&self) -> Result<MutexGuard<'_, ()>> {
        self.lock
            .lock()
            .map_err(|_| ClientError::Storage("session file lock poisoned".to_string()))
    }

    fn load(&self) -> Result<SessionFile> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Ok(SessionFile::default())
            }
            Err(err) => return Err(err.into()),
        };
        Ok(serde_json::from_str(&raw)?)
    }

    fn save(&self, mut file: SessionFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        file.version = 1;
        let serialized = serde_json::to_string_pretty(&file)?;
        fs::write(&self.path, serialized)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&self.path, fs::Permissions::from_mode(0o600))?;
        }
        Ok(())
    }

    fn update<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&mut SessionFile),
    {
        let _guard = self.lock()?;
        let mut file = self.load()?;
        let now = Utc::now();
        file.entries.retain(|_, entry| entry.is_live(now));
        f(&mut file);
        self.save(file)
    }
}

impl SessionStore for FileSessionStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        // Check and purge under one hold of the lock so a concurrent write
        // to the same key is never removed.
        let _guard = self.lock()?;
        let mut file = self.load()?;
        let now = Utc::now();

        let Some(entry) = file.entries.get(key) else {
            return Ok(None);
        };
        if entry.is_live(now) {
            return Ok(Some(entry.value.clone()));
        }

        debug!(key = %key, path = %self.path.display(), "Purging expired session entries");
        file.entries.retain(|_, entry| entry.is_live(now));
        self.save(file)?;
        Ok(None)
    }

    fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let entry = StoredEntry::new(value, ttl)?;
        self.update(|file| {
            file.entries.insert(key.to_string(), entry);
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.update(|file| {
            file.entries.remove(key);
        })
    }

    fn clear(&self) -> Result<()> {
        self.update(|file| {
            file.entries.remove(ACCESS_TOKEN_KEY);
            file.entries.remove(REFRESH_TOKEN_KEY);
        })
    }
}
