//! Configuration loading and types.
//!
//! [`ElectorConfig`] governs one elector: its identity and lease timings.
//! [`Config`] is the host process configuration read from a YAML file;
//! each subsection governs a different part of the process: the admin
//! listener, the elector, the record store, logging and metrics.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::errors::{ElectionError, Result};
use crate::serialization::duration_ms;

pub const DEFAULT_LEASE_DURATION: Duration = Duration::from_secs(10);
pub const DEFAULT_RENEW_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_RESIGN_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_RELEASE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a stopping elector writes back to storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownMode {
    /// Clear the leader pointer and drop our member entry.
    #[default]
    RemoveMember,
    /// Clear the leader pointer only; the member entry expires on its own.
    ReleaseLeadership,
}

/// Identity and timing for one elector.
///
/// Zero durations are replaced by defaults in
/// [`adjust_and_validate`](ElectorConfig::adjust_and_validate).
#[derive(Debug, Clone, Deserialize)]
pub struct ElectorConfig {
    /// Cluster-wide unique member ID.
    #[serde(default)]
    pub id: String,

    /// Display name.
    #[serde(default)]
    pub name: String,

    /// Contact address advertised to other members.
    #[serde(default)]
    pub address: String,

    /// How long a renewal stays valid.
    #[serde(rename = "lease_duration_ms", default, with = "duration_ms")]
    pub lease_duration: Duration,

    /// Time between renewal cycles. Must be shorter than the lease.
    #[serde(rename = "renew_interval_ms", default, with = "duration_ms")]
    pub renew_interval: Duration,

    /// Upper bound on one renewal cycle including retries.
    #[serde(rename = "renew_deadline_ms", default, with = "duration_ms")]
    pub renew_deadline: Duration,

    /// How long `resign_leader` waits for the loop to service it.
    #[serde(rename = "resign_timeout_ms", default, with = "duration_ms")]
    pub resign_timeout: Duration,

    /// Bound on the release write performed during shutdown.
    #[serde(rename = "release_timeout_ms", default, with = "duration_ms")]
    pub release_timeout: Duration,

    /// What to write back on shutdown.
    #[serde(default)]
    pub shutdown_mode: ShutdownMode,
}

impl Default for ElectorConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            address: String::new(),
            lease_duration: DEFAULT_LEASE_DURATION,
            renew_interval: DEFAULT_RENEW_INTERVAL,
            // Derived from lease and interval when adjusted.
            renew_deadline: Duration::ZERO,
            resign_timeout: DEFAULT_RESIGN_TIMEOUT,
            release_timeout: DEFAULT_RELEASE_TIMEOUT,
            shutdown_mode: ShutdownMode::default(),
        }
    }
}

impl ElectorConfig {
    /// Config with the given identity and default timings.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            ..Self::default()
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_lease_duration(mut self, d: Duration) -> Self {
        self.lease_duration = d;
        self
    }

    pub fn with_renew_interval(mut self, d: Duration) -> Self {
        self.renew_interval = d;
        self
    }

    pub fn with_renew_deadline(mut self, d: Duration) -> Self {
        self.renew_deadline = d;
        self
    }

    pub fn with_shutdown_mode(mut self, mode: ShutdownMode) -> Self {
        self.shutdown_mode = mode;
        self
    }

    /// Fill unset durations with defaults and check the timing invariants.
    ///
    /// The renew deadline defaults to `lease_duration - renew_interval`, so
    /// a leader that keeps failing to renew gives up its claim before its
    /// lease expires for everyone else.
    pub fn adjust_and_validate(&mut self) -> Result<()> {
        if self.id.is_empty() {
            return Err(ElectionError::InvalidConfig("id must not be empty".into()));
        }
        if self.name.is_empty() {
            self.name = self.id.clone();
        }
        if self.lease_duration.is_zero() {
            self.lease_duration = DEFAULT_LEASE_DURATION;
        }
        if self.renew_interval.is_zero() {
            self.renew_interval = DEFAULT_RENEW_INTERVAL;
        }
        if self.renew_deadline.is_zero() {
            self.renew_deadline = self.lease_duration.saturating_sub(self.renew_interval);
        }
        if self.resign_timeout.is_zero() {
            self.resign_timeout = DEFAULT_RESIGN_TIMEOUT;
        }
        if self.release_timeout.is_zero() {
            self.release_timeout = DEFAULT_RELEASE_TIMEOUT;
        }

        if self.renew_interval >= self.lease_duration {
            return Err(ElectionError::InvalidConfig(format!(
                "renew interval {:?} must be shorter than lease duration {:?}",
                self.renew_interval, self.lease_duration
            )));
        }
        if self.renew_deadline.is_zero() || self.renew_deadline > self.lease_duration {
            return Err(ElectionError::InvalidConfig(format!(
                "renew deadline {:?} must be in (0, {:?}]",
                self.renew_deadline, self.lease_duration
            )));
        }
        Ok(())
    }
}

/// Top-level host configuration.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Admin HTTP listener settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Elector identity and timings.
    #[serde(default)]
    pub elector: ElectorConfig,

    /// Record storage settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Observability settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Admin HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind host address.
    #[serde(default = "default_host")]
    pub host: String,

    /// Bind port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Record storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Backend type: `sqlite` or `memory`.
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// SQLite-specific configuration.
    #[serde(default)]
    pub sqlite: SqliteConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            sqlite: SqliteConfig::default(),
        }
    }
}

/// SQLite record storage configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_sqlite_path")]
    pub path: String,

    /// Election namespace (row key) inside the database.
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: default_sqlite_path(),
            namespace: default_namespace(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: text or json.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Observability settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// Enable Prometheus metrics collection and the `/metrics` endpoint.
    #[serde(default = "default_true")]
    pub metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self { metrics: true }
    }
}

// -- Defaults ----------------------------------------------------------------

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    9380
}

fn default_storage_backend() -> String {
    "sqlite".to_string()
}

fn default_sqlite_path() -> String {
    "./data/election.db".to_string()
}

fn default_namespace() -> String {
    crate::storage::sqlite::DEFAULT_NAMESPACE.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

// -- Loader ------------------------------------------------------------------

/// Load and parse configuration from a YAML file at `path`.
pub fn load_config<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let contents = std::fs::read_to_string(path.as_ref())?;
    parse_config(&contents)
}

/// Parse configuration from YAML text.
pub fn parse_config(contents: &str) -> anyhow::Result<Config> {
    let config: Config = serde_yaml::from_str(contents)?;
    Ok(config)
}
