//! Generation store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::error::{CacheError, Result};

use super::types::{GenerationLabel, ResourceId, Snapshot};

/// Diagnostic summary of one stored generation.
#[derive(Debug, Clone)]
pub struct GenerationInfo {
  pub label: GenerationLabel,
  pub created_at: DateTime<Utc>,
  pub entries: u64,
}

/// Durable key-value regions holding generations of cached responses.
///
/// Operations on distinct generations are independent. Operations on a
/// single generation must appear serializable to callers: the last `put`
/// for a key wins and readers never observe a partially written snapshot.
pub trait GenerationStore: Send + Sync {
  /// Create the generation's storage region if absent. Idempotent.
  fn open_generation(&self, label: &GenerationLabel) -> Result<()>;

  /// Store a full set of snapshots for a generation as one transaction.
  fn insert_batch(
    &self,
    label: &GenerationLabel,
    entries: &[(ResourceId, Snapshot)],
  ) -> Result<()>;

  /// Side-effect-free read of one snapshot.
  fn lookup(&self, label: &GenerationLabel, id: &ResourceId) -> Result<Option<Snapshot>>;

  /// Insert or replace one snapshot. Storage exhaustion is reported as
  /// `CacheError::StorageCapacity`.
  fn put(&self, label: &GenerationLabel, id: &ResourceId, snapshot: &Snapshot) -> Result<()>;

  /// All stored generations, oldest first.
  fn list_generations(&self) -> Result<Vec<GenerationLabel>>;

  /// Remove a generation and every snapshot stored under it.
  fn delete_generation(&self, label: &GenerationLabel) -> Result<()>;

  /// Summaries of all stored generations, oldest first.
  fn describe(&self) -> Result<Vec<GenerationInfo>>;
}

/// SQLite-backed generation store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the given path.
  pub fn open(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::from_connection(conn)
  }

  /// Open or create the store at the default location.
  pub fn open_default() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| {
        CacheError::Io(std::io::Error::other("could not determine data directory"))
      })?;

    Self::open(&data_dir.join("qrcache").join("cache.db"))
  }

  #[cfg(test)]
  pub(crate) fn open_in_memory() -> Result<Self> {
    Self::from_connection(Connection::open_in_memory()?)
  }

  fn from_connection(conn: Connection) -> Result<Self> {
    let store = Self {
      conn: Mutex::new(conn),
    };
    store.run_migrations()?;
    Ok(store)
  }

  fn run_migrations(&self) -> Result<()> {
    self.conn()?.execute_batch(CACHE_SCHEMA)?;
    Ok(())
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|_| CacheError::LockPoisoned)
  }
}

/// Schema for the generation store.
const CACHE_SCHEMA: &str = r#"
-- One row per generation of the cached asset set
CREATE TABLE IF NOT EXISTS generations (
    label TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots, keyed by generation and hashed resource identity
CREATE TABLE IF NOT EXISTS snapshots (
    label TEXT NOT NULL,
    resource_key TEXT NOT NULL,
    resource TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (label, resource_key)
);

CREATE INDEX IF NOT EXISTS idx_snapshots_label ON snapshots(label);
"#;

impl GenerationStore for SqliteStore {
  fn open_generation(&self, label: &GenerationLabel) -> Result<()> {
    self.conn()?.execute(
      "INSERT OR IGNORE INTO generations (label) VALUES (?)",
      params![label.as_str()],
    )?;
    Ok(())
  }

  fn insert_batch(
    &self,
    label: &GenerationLabel,
    entries: &[(ResourceId, Snapshot)],
  ) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    tx.execute(
      "INSERT OR IGNORE INTO generations (label) VALUES (?)",
      params![label.as_str()],
    )?;

    for (id, snapshot) in entries {
      let headers = serde_json::to_vec(&snapshot.headers)?;
      tx.execute(
        "INSERT OR REPLACE INTO snapshots (label, resource_key, resource, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          label.as_str(),
          id.storage_key(),
          id.to_string(),
          snapshot.status,
          headers,
          snapshot.body
        ],
      )
      .map_err(classify_storage)?;
    }

    tx.commit()?;
    Ok(())
  }

  fn lookup(&self, label: &GenerationLabel, id: &ResourceId) -> Result<Option<Snapshot>> {
    let conn = self.conn()?;

    let mut stmt = conn.prepare(
      "SELECT status, headers, body FROM snapshots
       WHERE label = ? AND resource_key = ?",
    )?;

    let row = stmt
      .query_row(params![label.as_str(), id.storage_key()], |row| {
        Ok((
          row.get::<_, u16>(0)?,
          row.get::<_, Vec<u8>>(1)?,
          row.get::<_, Vec<u8>>(2)?,
        ))
      })
      .optional()?;

    match row {
      Some((status, headers, body)) => Ok(Some(Snapshot {
        status,
        headers: serde_json::from_slice(&headers)?,
        body,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, label: &GenerationLabel, id: &ResourceId, snapshot: &Snapshot) -> Result<()> {
    let conn = self.conn()?;
    let headers = serde_json::to_vec(&snapshot.headers)?;

    conn
      .execute(
        "INSERT OR REPLACE INTO snapshots (label, resource_key, resource, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, datetime('now'))",
        params![
          label.as_str(),
          id.storage_key(),
          id.to_string(),
          snapshot.status,
          headers,
          snapshot.body
        ],
      )
      .map_err(classify_storage)?;

    Ok(())
  }

  fn list_generations(&self) -> Result<Vec<GenerationLabel>> {
    let conn = self.conn()?;

    // Insertion order is recency order; labels stay opaque.
    let mut stmt = conn.prepare("SELECT label FROM generations ORDER BY rowid")?;
    let labels = stmt
      .query_map([], |row| row.get::<_, String>(0))?
      .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(labels.into_iter().map(GenerationLabel::new).collect())
  }

  fn delete_generation(&self, label: &GenerationLabel) -> Result<()> {
    let mut conn = self.conn()?;
    let tx = conn.transaction()?;

    tx.execute(
      "DELETE FROM snapshots WHERE label = ?",
      params![label.as_str()],
    )?;
    tx.execute(
      "DELETE FROM generations WHERE label = ?",
      params![label.as_str()],
    )?;

    tx.commit()?;
    Ok(())
  }

  fn describe(&self) -> Result<Vec<GenerationInfo>> {
    let conn = self.conn()?;

    let mut stmt = conn.prepare(
      "SELECT g.label, g.created_at, COUNT(s.resource_key)
       FROM generations g
       LEFT JOIN snapshots s ON s.label = g.label
       GROUP BY g.label
       ORDER BY g.rowid",
    )?;

    let rows = stmt.query_map([], |row| {
      Ok((
        row.get::<_, String>(0)?,
        row.get::<_, String>(1)?,
        row.get::<_, u64>(2)?,
      ))
    })?;

    let mut infos = Vec::new();
    for row in rows {
      let (label, created_at, entries) = row?;
      infos.push(GenerationInfo {
        label: GenerationLabel::new(label),
        created_at: parse_datetime(&created_at)?,
        entries,
      });
    }

    Ok(infos)
  }
}

/// Map storage-exhaustion failures to the capacity error; everything else
/// stays a plain storage error.
fn classify_storage(err: rusqlite::Error) -> CacheError {
  if let rusqlite::Error::SqliteFailure(cause, _) = &err {
    if matches!(
      cause.code,
      ErrorCode::DiskFull | ErrorCode::TooBig | ErrorCode::OutOfMemory
    ) {
      return CacheError::StorageCapacity;
    }
  }
  CacheError::Storage(err)
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|_| CacheError::Timestamp(s.to_string()))
}
