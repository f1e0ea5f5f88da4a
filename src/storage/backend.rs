//! Abstract record storage trait.
//!
//! Every storage backend must implement [`RecordStorage`].  The elector
//! only ever needs two operations: read the current [`Record`], and write
//! a new one back if nobody else wrote in between.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::errors::StorageError;
use crate::record::Record;

/// Boxed future returned by [`RecordStorage`] methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Optimistic-concurrency record store.
///
/// A value implementing this trait is one *handle* onto the shared store.
/// Each handle remembers the version it last read or wrote, and
/// [`update`](RecordStorage::update) must fail with
/// [`StorageError::Conflict`] when the stored version has moved on since
/// then.  A store that has never been written reads as an empty record at
/// version 0; the first successful update creates it.
pub trait RecordStorage: Send + Sync + 'static {
    /// Read the current record, remembering its version for the next update.
    fn get(&self) -> StorageFuture<'_, Record>;

    /// Replace the record if it has not changed since this handle last
    /// observed it.
    fn update(&self, record: &Record) -> StorageFuture<'_, ()>;
}

/// Last version a storage handle observed.
///
/// Version 0 means "never written".
#[derive(Debug, Default)]
pub struct ObservedVersion(AtomicU64);

impl ObservedVersion {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Acquire)
    }

    pub fn set(&self, version: u64) {
        self.0.store(version, Ordering::Release);
    }

    /// Check `actual` against the observed version, producing the conflict
    /// error callers should return on mismatch.
    pub fn check(&self, actual: u64) -> Result<u64, StorageError> {
        let expected = self.get();
        if expected != actual {
            return Err(StorageError::Conflict { expected, actual });
        }
        Ok(expected)
    }
}
