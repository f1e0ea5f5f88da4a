//! lease-elector: lease-based leader election over an optimistic-concurrency
//! record store.
//!
//! A fleet of equivalent processes each run an [`Elector`]; at most one of
//! them is leader at a time and runs the leader-only callback.  The crate
//! also ships a small admin HTTP surface ([`server`]) and storage backends
//! for tests ([`storage::memory`]) and single-host deployments
//! ([`storage::sqlite`]).

use std::sync::Arc;

pub mod cluster;
pub mod config;
pub mod errors;
pub mod metrics;
pub mod record;
pub mod serialization;
pub mod server;
pub mod storage;

pub use cluster::{leader_callback, CallbackFuture, Elector, LeaderCallback};
pub use config::{ElectorConfig, ShutdownMode};
pub use errors::{ElectionError, StorageError};
pub use record::{Member, Record};
pub use storage::backend::RecordStorage;

/// Shared application state passed to admin handlers via `axum::extract::State`.
pub struct AppState {
    /// The elector this process runs.
    pub elector: Elector,
    /// Whether the `/metrics` endpoint is served.
    pub metrics_enabled: bool,
}

impl AppState {
    pub fn new(elector: Elector) -> Arc<Self> {
        Arc::new(Self {
            elector,
            metrics_enabled: false,
        })
    }
}
