//! In-memory record storage.
//!
//! A single versioned cell shared by any number of handles.  Each handle
//! created with [`MemoryStorage::handle`] tracks its own observed version,
//! so several electors in one process behave like separate processes
//! sharing one store.  Useful for tests and single-process deployments.
//!
//! Test hooks allow injecting transient `get`/`update` failures.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::backend::{ObservedVersion, RecordStorage, StorageFuture};
use crate::errors::StorageError;
use crate::record::Record;

#[derive(Debug, Default)]
struct Cell {
    version: u64,
    record: Record,
    /// Number of upcoming `get` calls that fail with `Unavailable`.
    failing_gets: usize,
    /// Number of upcoming `update` calls that fail with `Unavailable`.
    failing_updates: usize,
    /// Successful updates since creation.
    writes: u64,
}

/// Handle onto an in-memory versioned record.
pub struct MemoryStorage {
    cell: Arc<Mutex<Cell>>,
    observed: ObservedVersion,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    /// Create an empty store and the first handle onto it.
    pub fn new() -> Self {
        Self {
            cell: Arc::new(Mutex::new(Cell::default())),
            observed: ObservedVersion::new(),
        }
    }

    /// Another handle onto the same store with its own observed version.
    pub fn handle(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
            observed: ObservedVersion::new(),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Cell>, StorageError> {
        self.cell
            .lock()
            .map_err(|e| StorageError::Internal(anyhow::anyhow!("Mutex poisoned: {e}")))
    }

    fn lock_unchecked(&self) -> MutexGuard<'_, Cell> {
        self.cell.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite the stored record unconditionally, bumping its version.
    pub fn put_record(&self, record: Record) {
        let mut cell = self.lock_unchecked();
        cell.version += 1;
        cell.record = record;
    }

    /// Current stored record.
    pub fn snapshot(&self) -> Record {
        self.lock_unchecked().record.clone()
    }

    /// Current stored version.
    pub fn version(&self) -> u64 {
        self.lock_unchecked().version
    }

    /// Number of successful updates so far.
    pub fn write_count(&self) -> u64 {
        self.lock_unchecked().writes
    }

    /// Make the next `n` `get` calls (from any handle) fail.
    pub fn fail_next_gets(&self, n: usize) {
        self.lock_unchecked().failing_gets = n;
    }

    /// Make the next `n` `update` calls (from any handle) fail.
    pub fn fail_next_updates(&self, n: usize) {
        self.lock_unchecked().failing_updates = n;
    }
}

impl RecordStorage for MemoryStorage {
    fn get(&self) -> StorageFuture<'_, Record> {
        Box::pin(async move {
            let mut cell = self.lock()?;
            if cell.failing_gets > 0 {
                cell.failing_gets -= 1;
                return Err(StorageError::Unavailable("injected get failure".into()));
            }
            self.observed.set(cell.version);
            Ok(cell.record.clone())
        })
    }

    fn update(&self, record: &Record) -> StorageFuture<'_, ()> {
        let record = record.clone();
        Box::pin(async move {
            let mut cell = self.lock()?;
            if cell.failing_updates > 0 {
                cell.failing_updates -= 1;
                return Err(StorageError::Unavailable("injected update failure".into()));
            }
            self.observed.check(cell.version)?;
            cell.version += 1;
            cell.record = record;
            cell.writes += 1;
            self.observed.set(cell.version);
            Ok(())
        })
    }
}
