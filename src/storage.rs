//! Durable key/value storage for the language preference and the cache blob.
//! `SqliteStorage` persists across sessions; `MemoryStorage` backs tests.
//! `Persister` decides whether writes land inline or through a batched flush loop.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Interval at which deferred writes are flushed.
const FLUSH_INTERVAL: Duration = Duration::from_millis(300);

#[derive(Debug)]
pub enum StorageError {
    Sqlite(rusqlite::Error),
    Unavailable(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Sqlite(e) => write!(f, "sqlite storage error: {e}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {}

impl From<rusqlite::Error> for StorageError {
    fn from(e: rusqlite::Error) -> Self {
        StorageError::Sqlite(e)
    }
}

/// Durable string storage keyed by logical name.
pub trait Storage: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StorageError>;
}

#[derive(Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed a value, e.g. a blob left by an earlier session.
    pub fn with_entry(self, key: &str, value: &str) -> Self {
        self.entries.lock().insert(key.to_string(), value.to_string());
        self
    }
}

impl Storage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries.lock().insert(key.to_string(), value.to_string());
        Ok(())
    }
}

/// SQLite-backed storage: one row per logical key.
pub struct SqliteStorage {
    conn: Mutex<Connection>,
}

impl SqliteStorage {
    /// Open (or create) the store at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
        let store = Self::init(conn)?;
        info!(path = %db_path.display(), "sqlite storage opened");
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS kv_store (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );",
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Storage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, now_unix()],
        )?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PersistMode {
    /// Write through on every mutation.
    #[default]
    Immediate,
    /// Queue writes; a background task flushes the latest value per key.
    Deferred,
}

/// Write path in front of a `Storage`. Failures are logged, never returned.
pub struct Persister {
    storage: Arc<dyn Storage>,
    queue: Option<mpsc::UnboundedSender<(String, String)>>,
}

impl Persister {
    pub fn immediate(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            queue: None,
        }
    }

    /// Spawns the flush loop, so it must be called inside a Tokio runtime.
    pub fn deferred(storage: Arc<dyn Storage>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(flush_loop(rx, Arc::clone(&storage)));
        Self {
            storage,
            queue: Some(tx),
        }
    }

    pub fn new(storage: Arc<dyn Storage>, mode: PersistMode) -> Self {
        match mode {
            PersistMode::Immediate => Self::immediate(storage),
            PersistMode::Deferred => Self::deferred(storage),
        }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn read(&self, key: &str) -> Option<String> {
        match self.storage.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "storage read failed, treating as absent");
                None
            }
        }
    }

    pub fn write(&self, key: &str, value: String) {
        let value = match &self.queue {
            Some(queue) => match queue.send((key.to_string(), value)) {
                Ok(()) => return,
                Err(mpsc::error::SendError((_, value))) => {
                    warn!(key, "flush loop gone, writing inline");
                    value
                }
            },
            None => value,
        };
        if let Err(e) = self.storage.set(key, &value) {
            warn!(key, error = %e, "storage write failed");
        }
    }
}

/// Drains queued writes every `FLUSH_INTERVAL`, keeping only the newest value
/// per key. Exits after a final flush once every sender is dropped.
async fn flush_loop(mut rx: mpsc::UnboundedReceiver<(String, String)>, storage: Arc<dyn Storage>) {
    let mut pending: HashMap<String, String> = HashMap::new();
    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);

    loop {
        tokio::select! {
            received = rx.recv() => {
                match received {
                    Some((key, value)) => {
                        pending.insert(key, value);
                    }
                    None => {
                        flush(&mut pending, &storage);
                        debug!("storage flush loop exiting");
                        return;
                    }
                }
            }
            _ = ticker.tick() => {
                flush(&mut pending, &storage);
            }
        }
    }
}

fn flush(pending: &mut HashMap<String, String>, storage: &Arc<dyn Storage>) {
    if pending.is_empty() {
        return;
    }
    let count = pending.len();
    for (key, value) in pending.drain() {
        if let Err(e) = storage.set(&key, &value) {
            warn!(key, error = %e, "deferred storage write failed");
        }
    }
    debug!(keys = count, "storage flushed");
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
