//! Snapshot persistence.
//!
//! A store is a flat key -> JSON text map. The engine keeps one key for the
//! account and one for the bet book and rewrites each in full on save, so a
//! store only has to make single-key writes atomic.

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("snapshot encoding error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("store unavailable: {0}")]
    Backend(String),
}

/// Durable key-value storage for serialized snapshots.
pub trait LedgerStore: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn save(&self, key: &str, body: &str) -> Result<(), StoreError>;
}

impl<T: LedgerStore + ?Sized> LedgerStore for std::sync::Arc<T> {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        (**self).load(key)
    }

    fn save(&self, key: &str, body: &str) -> Result<(), StoreError> {
        (**self).save(key, body)
    }
}

pub fn load_snapshot<T: DeserializeOwned>(
    store: &dyn LedgerStore,
    key: &str,
) -> Result<Option<T>, StoreError> {
    match store.load(key)? {
        Some(body) => Ok(Some(serde_json::from_str(&body)?)),
        None => Ok(None),
    }
}

pub fn save_snapshot<T: Serialize>(
    store: &dyn LedgerStore,
    key: &str,
    snapshot: &T,
) -> Result<(), StoreError> {
    let body = serde_json::to_string(snapshot)?;
    store.save(key, &body)
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, StoreError> {
    mutex
        .lock()
        .map_err(|_| StoreError::Backend("store lock poisoned".to_string()))
}

/// In-process store. Can be switched into a failing mode to exercise retry paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    fail_saves: Mutex<bool>,
    saves: Mutex<u64>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_saves(&self, fail: bool) {
        if let Ok(mut flag) = self.fail_saves.lock() {
            *flag = fail;
        }
    }

    /// Successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.lock().map(|n| *n).unwrap_or(0)
    }

    pub fn raw(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}

impl LedgerStore for MemoryStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.entries)?.get(key).cloned())
    }

    fn save(&self, key: &str, body: &str) -> Result<(), StoreError> {
        if *lock(&self.fail_saves)? {
            return Err(StoreError::Backend("simulated write failure".to_string()));
        }
        lock(&self.entries)?.insert(key.to_string(), body.to_string());
        *lock(&self.saves)? += 1;
        Ok(())
    }
}

/// One JSON file per key inside a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        info!(dir = %dir.display(), "JSON snapshot store ready");
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        let safe_key = key.replace(['/', '\\', ':', '*', '?', '"', '<', '>', '|'], "_");
        self.dir.join(format!("{}.json", safe_key))
    }
}

impl LedgerStore for JsonFileStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        match fs::read_to_string(self.path_for(key)) {
            Ok(body) => Ok(Some(body)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    // write to a sibling temp file then rename, so a crash never leaves half a snapshot
    fn save(&self, key: &str, body: &str) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &path)?;
        debug!(key, "Snapshot written");
        Ok(())
    }
}

/// SQLite-backed store with a single `snapshots` table.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        info!("SQLite snapshot store initialized");
        Ok(store)
    }

    pub fn new_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        debug!("In-memory SQLite store initialized");
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), StoreError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS snapshots (
                key TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }
}

impl LedgerStore for SqliteStore {
    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = lock(&self.conn)?;
        let body = conn
            .query_row(
                "SELECT body FROM snapshots WHERE key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(body)
    }

    fn save(&self, key: &str, body: &str) -> Result<(), StoreError> {
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO snapshots (key, body, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET body = excluded.body, updated_at = excluded.updated_at",
            params![key, body, chrono::Utc::now().timestamp_millis()],
        )?;
        Ok(())
    }
}
