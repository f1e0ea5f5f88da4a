//! Record serialization helpers: serde adapters and export/import of the
//! persisted election record between SQLite and JSON.

use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::record::Record;
use crate::storage::sqlite::{init_schema, load_row, store_unconditional};

pub const EXPORT_VERSION: i64 = 1;

/// Serialize a [`std::time::Duration`] as integer milliseconds.
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u64::MAX as u128) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Envelope written by [`export_record`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordExport {
    pub export_version: i64,
    pub namespace: String,
    /// Stored version at export time; 0 when the record was never written.
    pub record_version: u64,
    pub exported_at: chrono::DateTime<chrono::Utc>,
    pub record: Record,
}

/// Options for [`import_record`].
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    /// Drop the leader pointer from the imported record.
    pub clear_leader: bool,
}

/// Result of [`import_record`].
#[derive(Debug, Clone)]
pub struct ImportResult {
    /// Stored version after the import.
    pub version: u64,
    pub members: usize,
    pub warnings: Vec<String>,
}

/// Export the record stored under `namespace` in `db_path` as pretty JSON.
pub fn export_record(db_path: &str, namespace: &str) -> anyhow::Result<String> {
    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    let (record_version, record) = match load_row(&conn, namespace)? {
        Some((version, json)) => (version, Record::from_json(&json)?),
        None => (0, Record::default()),
    };
    let export = RecordExport {
        export_version: EXPORT_VERSION,
        namespace: namespace.to_string(),
        record_version,
        exported_at: chrono::Utc::now(),
        record,
    };
    Ok(serde_json::to_string_pretty(&export)?)
}

/// Import a record (either a bare [`Record`] or a [`RecordExport`]
/// envelope) into `namespace`, overwriting whatever is stored.
///
/// The stored version is bumped, so running electors treat the import as
/// a concurrent write and re-read before their next update.
pub fn import_record(
    db_path: &str,
    namespace: &str,
    json: &str,
    opts: &ImportOptions,
) -> anyhow::Result<ImportResult> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let mut warnings = Vec::new();

    let mut record: Record = if value.get("record").is_some() {
        let export: RecordExport = serde_json::from_value(value)?;
        if export.export_version != EXPORT_VERSION {
            anyhow::bail!("unsupported export version {}", export.export_version);
        }
        if export.namespace != namespace {
            warnings.push(format!(
                "importing record exported from namespace '{}' into '{}'",
                export.namespace, namespace
            ));
        }
        export.record
    } else {
        serde_json::from_value(value)?
    };

    let mut seen = std::collections::HashSet::new();
    record.members.retain(|m| {
        if seen.insert(m.id.clone()) {
            true
        } else {
            warnings.push(format!("dropped duplicate member '{}'", m.id));
            false
        }
    });

    if opts.clear_leader {
        record.leader_id.clear();
    } else if record.has_leader() && record.leader().is_none() {
        warnings.push(format!(
            "leader '{}' is not a member; electors will clear it",
            record.leader_id
        ));
    }

    let conn = Connection::open(db_path)?;
    init_schema(&conn)?;
    let version = store_unconditional(&conn, namespace, &record.to_json()?)?;

    Ok(ImportResult {
        version,
        members: record.members.len(),
        warnings,
    })
}
