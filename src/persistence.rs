//! Database persistence layer for the ledger

use crate::crypto::{hash_to_hex, Sha256Hash};
use crate::error::ChainError;
use crate::transaction::Transaction;
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default database file name inside the chain directory.
pub const DEFAULT_DATABASE_FILE: &str = "ledger.db";

/// Entry file layout version understood by this build.
pub const MANIFEST_FORMAT_VERSION: u32 = 1;

const MAX_BUSY_RETRIES: u32 = 3;

/// Abstraction for persistence backends. Implementations must make
/// `append_confirmed` atomic: either the record is durably stored or nothing
/// changes.
pub trait Persistence: Send + Sync {
    /// Appends a confirmed transaction and returns its sequence number.
    fn append_confirmed(&self, tx: &Transaction, confirmed_at: u64) -> Result<u64, ChainError>;
    /// All confirmed transactions in confirmation order.
    fn load_confirmed(&self) -> Result<Vec<Transaction>, ChainError>;
    fn confirmed_count(&self) -> Result<u64, ChainError>;
    /// Hash of the most recently confirmed transaction.
    fn head(&self) -> Result<Option<Sha256Hash>, ChainError>;
}

pub struct Database {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").finish_non_exhaustive()
    }
}

fn is_transient(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.code == ErrorCode::DatabaseBusy || e.code == ErrorCode::DatabaseLocked
    )
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation
    )
}

/// Runs `op`, retrying transient busy/locked failures with a short backoff.
fn with_retry<T>(mut op: impl FnMut() -> rusqlite::Result<T>) -> rusqlite::Result<T> {
    let mut attempt = 0;
    loop {
        match op() {
            Err(e) if is_transient(&e) && attempt < MAX_BUSY_RETRIES => {
                attempt += 1;
                debug!(attempt, error = %e, "database busy, retrying");
                std::thread::sleep(Duration::from_millis(25 * attempt as u64));
            }
            result => return result,
        }
    }
}

impl Database {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ChainError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| {
            ChainError::StorageError(format!("Failed to open database {}: {}", path.display(), e))
        })?;

        // journal_mode answers with the resulting mode; in-memory databases report "memory".
        let _mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .map_err(|e| ChainError::StorageError(format!("Failed to enable WAL: {}", e)))?;
        conn.pragma_update(None, "synchronous", "FULL")
            .map_err(|e| ChainError::StorageError(format!("Failed to set synchronous mode: {}", e)))?;
        conn.busy_timeout(Duration::from_millis(250))
            .map_err(|e| ChainError::StorageError(format!("Failed to set busy timeout: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS transactions (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                hash BLOB NOT NULL UNIQUE,
                sender BLOB NOT NULL,
                recipient BLOB NOT NULL,
                confirmed_at INTEGER NOT NULL,
                data BLOB NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::StorageError(format!("Failed to create transactions table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )",
            [],
        )
        .map_err(|e| {
            ChainError::StorageError(format!("Failed to create metadata table: {}", e))
        })?;

        Ok(Database {
            conn: Mutex::new(conn),
        })
    }

    /// Inserts the record and advances the `head` metadata in one SQLite
    /// transaction.
    pub fn append_confirmed(&self, tx: &Transaction, confirmed_at: u64) -> Result<u64, ChainError> {
        let hash = tx.hash();
        let data = tx.to_bytes()?;
        let conn = self.conn.lock();

        let result = with_retry(|| {
            let db_tx = conn.unchecked_transaction()?;
            db_tx.execute(
                "INSERT INTO transactions (hash, sender, recipient, confirmed_at, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    hash.to_vec(),
                    tx.sender.to_vec(),
                    tx.recipient.to_vec(),
                    confirmed_at as i64,
                    data,
                ],
            )?;
            let seq = db_tx.last_insert_rowid();
            db_tx.execute(
                "INSERT OR REPLACE INTO metadata (key, value) VALUES ('head', ?1)",
                params![hash_to_hex(&hash)],
            )?;
            db_tx.commit()?;
            Ok(seq as u64)
        });

        result.map_err(|e| {
            if is_constraint_violation(&e) {
                ChainError::DuplicateConfirmation(hash_to_hex(&hash))
            } else {
                ChainError::StorageError(format!("Failed to append transaction: {}", e))
            }
        })
    }

    pub fn load_confirmed(&self) -> Result<Vec<Transaction>, ChainError> {
        let conn = self.conn.lock();
        let rows: Vec<Vec<u8>> = with_retry(|| {
            let mut stmt = conn.prepare("SELECT data FROM transactions ORDER BY seq ASC")?;
            let rows = stmt.query_map([], |row| row.get::<_, Vec<u8>>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()
        })
        .map_err(|e| ChainError::StorageError(format!("Failed to load transactions: {}", e)))?;

        rows.iter()
            .map(|data| {
                Transaction::from_bytes(data).map_err(|e| {
                    ChainError::StorageError(format!("Corrupt transaction record: {}", e))
                })
            })
            .collect()
    }

    pub fn confirmed_count(&self) -> Result<u64, ChainError> {
        let conn = self.conn.lock();
        let count: i64 = with_retry(|| {
            conn.query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))
        })
        .map_err(|e| ChainError::StorageError(format!("Failed to count transactions: {}", e)))?;
        Ok(count as u64)
    }

    pub fn head(&self) -> Result<Option<Sha256Hash>, ChainError> {
        let conn = self.conn.lock();
        let value: Option<String> = with_retry(|| {
            conn.query_row("SELECT value FROM metadata WHERE key = 'head'", [], |row| row.get(0))
                .optional()
        })
        .map_err(|e| ChainError::StorageError(format!("Failed to read head: {}", e)))?;

        value
            .map(|v| {
                crate::crypto::hash_from_hex(&v)
                    .map_err(|e| ChainError::StorageError(format!("Corrupt head metadata: {}", e)))
            })
            .transpose()
    }
}

// Implement the Persistence trait for the rusqlite-backed Database
impl Persistence for Database {
    fn append_confirmed(&self, tx: &Transaction, confirmed_at: u64) -> Result<u64, ChainError> {
        Database::append_confirmed(self, tx, confirmed_at)
    }

    fn load_confirmed(&self) -> Result<Vec<Transaction>, ChainError> {
        Database::load_confirmed(self)
    }

    fn confirmed_count(&self) -> Result<u64, ChainError> {
        Database::confirmed_count(self)
    }

    fn head(&self) -> Result<Option<Sha256Hash>, ChainError> {
        Database::head(self)
    }
}

/// Simple in-memory persistence implementation useful for tests and ephemeral runs.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersistence {
    records: Arc<Mutex<Vec<Transaction>>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for InMemoryPersistence {
    fn append_confirmed(&self, tx: &Transaction, _confirmed_at: u64) -> Result<u64, ChainError> {
        let mut records = self.records.lock();
        let hash = tx.hash();
        if records.iter().any(|r| r.hash() == hash) {
            return Err(ChainError::DuplicateConfirmation(hash_to_hex(&hash)));
        }
        records.push(tx.clone());
        Ok(records.len() as u64)
    }

    fn load_confirmed(&self) -> Result<Vec<Transaction>, ChainError> {
        Ok(self.records.lock().clone())
    }

    fn confirmed_count(&self) -> Result<u64, ChainError> {
        Ok(self.records.lock().len() as u64)
    }

    fn head(&self) -> Result<Option<Sha256Hash>, ChainError> {
        Ok(self.records.lock().last().map(Transaction::hash))
    }
}

/// The entry file: a small JSON document naming the database and recording
/// the confirmed count and head at the last write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub database: String,
    pub confirmed: u64,
    pub head: Option<String>,
    pub updated_at: String,
}

impl Manifest {
    pub fn new(database: impl Into<String>, confirmed: u64, head: Option<Sha256Hash>) -> Self {
        Manifest {
            format_version: MANIFEST_FORMAT_VERSION,
            database: database.into(),
            confirmed,
            head: head.as_ref().map(hash_to_hex),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }

    /// Reads the entry file. `Ok(None)` if it does not exist.
    pub fn read(path: &Path) -> Result<Option<Self>, ChainError> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)?;
        let manifest: Manifest = serde_json::from_str(&contents).map_err(|e| {
            ChainError::StorageError(format!("Malformed entry file {}: {}", path.display(), e))
        })?;

        if manifest.format_version != MANIFEST_FORMAT_VERSION {
            return Err(ChainError::StorageError(format!(
                "Unsupported entry file format version {} (expected {})",
                manifest.format_version, MANIFEST_FORMAT_VERSION
            )));
        }
        if Path::new(&manifest.database).file_name().and_then(|n| n.to_str())
            != Some(manifest.database.as_str())
        {
            return Err(ChainError::StorageError(format!(
                "Entry file names an invalid database '{}'",
                manifest.database
            )));
        }

        Ok(Some(manifest))
    }

    /// Writes the entry file through a temp file and rename.
    pub fn write(&self, path: &Path) -> Result<(), ChainError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ChainError::StorageError(format!("Failed to encode entry file: {}", e)))?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
        tmp.write_all(json.as_bytes())?;
        tmp.as_file().sync_all()?;
        tmp.persist(path).map_err(|e| ChainError::StorageError(e.to_string()))?;
        Ok(())
    }

    /// Whether the recorded count and head agree with the database.
    pub fn matches(&self, confirmed: u64, head: Option<&Sha256Hash>) -> bool {
        self.confirmed == confirmed && self.head.as_deref() == head.map(hash_to_hex).as_deref()
    }
}
