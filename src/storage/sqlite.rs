//! SQLite record storage.
//!
//! The record lives in a single row of the `election_record` table, keyed
//! by namespace, together with a monotonically increasing version.  A
//! conditional `UPDATE ... WHERE version = ?` provides compare-and-swap.
//!
//! Because `rusqlite::Connection` is `!Send`, we wrap it in a
//! `std::sync::Mutex` behind an `Arc` and use `tokio::task::spawn_blocking`
//! for every database operation.

use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

use super::backend::{ObservedVersion, RecordStorage, StorageFuture};
use crate::errors::StorageError;
use crate::record::Record;

/// Namespace used when none is configured.
pub const DEFAULT_NAMESPACE: &str = "default";

/// SQLite-backed versioned record.
///
/// Several election namespaces can share one database file.
pub struct SqliteStorage {
    conn: Arc<Mutex<Connection>>,
    namespace: String,
    observed: ObservedVersion,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `db_path` and initialise the
    /// record table.
    ///
    /// Configures WAL journal mode and a 5-second busy timeout so several
    /// processes can share the file.
    pub fn open(db_path: &str, namespace: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(db_path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            namespace: namespace.to_string(),
            observed: ObservedVersion::new(),
        })
    }

    /// Another handle onto the same connection and namespace with its own
    /// observed version.
    pub fn handle(&self) -> Self {
        Self {
            conn: Arc::clone(&self.conn),
            namespace: self.namespace.clone(),
            observed: ObservedVersion::new(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }
}

/// Create the record table if it does not exist.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;\
         PRAGMA busy_timeout=5000;\
         PRAGMA synchronous=NORMAL;",
    )?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS election_record (\
             name    TEXT PRIMARY KEY,\
             version INTEGER NOT NULL,\
             record  TEXT NOT NULL\
         );",
    )
}

/// Read the raw `(version, record_json)` row for `namespace`.
pub fn load_row(conn: &Connection, namespace: &str) -> rusqlite::Result<Option<(u64, String)>> {
    conn.query_row(
        "SELECT version, record FROM election_record WHERE name = ?1",
        params![namespace],
        |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)),
    )
    .optional()
}

/// Overwrite the row for `namespace` regardless of its version, returning
/// the new version.  Live electors see the bump as a conflict and re-read.
pub fn store_unconditional(
    conn: &Connection,
    namespace: &str,
    record_json: &str,
) -> rusqlite::Result<u64> {
    conn.execute(
        "INSERT INTO election_record (name, version, record) VALUES (?1, 1, ?2) \
         ON CONFLICT(name) DO UPDATE SET version = version + 1, record = excluded.record",
        params![namespace, record_json],
    )?;
    Ok(load_row(conn, namespace)?.map(|(v, _)| v).unwrap_or(0))
}

/// Compare-and-swap the row for `namespace` from `expected` to
/// `expected + 1`.  Returns the actual stored version on mismatch.
fn compare_and_swap(
    conn: &Connection,
    namespace: &str,
    expected: u64,
    record_json: &str,
) -> Result<u64, StorageError> {
    let changed = if expected == 0 {
        conn.execute(
            "INSERT INTO election_record (name, version, record) VALUES (?1, 1, ?2) \
             ON CONFLICT(name) DO NOTHING",
            params![namespace, record_json],
        )?
    } else {
        conn.execute(
            "UPDATE election_record SET version = version + 1, record = ?2 \
             WHERE name = ?1 AND version = ?3",
            params![namespace, record_json, expected as i64],
        )?
    };
    if changed == 0 {
        let actual = load_row(conn, namespace)?.map(|(v, _)| v).unwrap_or(0);
        return Err(StorageError::Conflict { expected, actual });
    }
    Ok(expected + 1)
}

// ── RecordStorage implementation ───────────────────────────────────────

impl RecordStorage for SqliteStorage {
    fn get(&self) -> StorageFuture<'_, Record> {
        let conn = Arc::clone(&self.conn);
        let namespace = self.namespace.clone();
        Box::pin(async move {
            let (version, record) = tokio::task::spawn_blocking(move || {
                let conn = conn
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Mutex poisoned: {e}"))?;
                let row = load_row(&conn, &namespace)?;
                Ok::<_, StorageError>(match row {
                    Some((version, json)) => (version, Record::from_json(&json)?),
                    None => (0, Record::default()),
                })
            })
            .await
            .map_err(|e| anyhow::anyhow!("blocking task failed: {e}"))??;
            self.observed.set(version);
            Ok(record)
        })
    }

    fn update(&self, record: &Record) -> StorageFuture<'_, ()> {
        let conn = Arc::clone(&self.conn);
        let namespace = self.namespace.clone();
        let expected = self.observed.get();
        let json = record.to_json();
        Box::pin(async move {
            let json = json?;
            let version = tokio::task::spawn_blocking(move || {
                let conn = conn
                    .lock()
                    .map_err(|e| anyhow::anyhow!("Mutex poisoned: {e}"))?;
                compare_and_swap(&conn, &namespace, expected, &json)
            })
            .await
            .map_err(|e| anyhow::anyhow!("blocking task failed: {e}"))??;
            self.observed.set(version);
            Ok(())
        })
    }
}
