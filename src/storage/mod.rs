//! Record storage backends.
//!
//! The [`backend::RecordStorage`] trait abstracts over where the election
//! record physically lives.  Implementations include an in-process memory
//! cell and a SQLite table shared between processes on one host.

pub mod backend;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use crate::config::StorageConfig;
use backend::RecordStorage;

/// Build the storage backend selected by `config.backend`.
pub fn open_storage(config: &StorageConfig) -> anyhow::Result<Arc<dyn RecordStorage>> {
    match config.backend.as_str() {
        "memory" => {
            tracing::info!("Memory record storage initialized");
            Ok(Arc::new(memory::MemoryStorage::new()))
        }
        "sqlite" => {
            let path = &config.sqlite.path;
            if let Some(parent) = std::path::Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let storage = sqlite::SqliteStorage::open(path, &config.sqlite.namespace)?;
            tracing::info!(
                "SQLite record storage initialized at {} (namespace '{}')",
                path,
                config.sqlite.namespace
            );
            Ok(Arc::new(storage))
        }
        other => anyhow::bail!("unknown storage backend '{other}'"),
    }
}
