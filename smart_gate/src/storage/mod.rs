use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use log::{error, info};
use rusqlite::{Connection, ErrorCode};

mod arrivals;
mod migrations;
mod models;
mod whitelist;

pub use models::{ArrivalRecord, WhitelistEntry, WhitelistInsert};

use crate::error::StoreError;
use migrations::run_migrations;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Millisecond precision in a form SQLite's date functions parse. Recency
/// checks compare through `julianday`, so rows filled in by `CURRENT_TIMESTAMP`
/// (whole seconds) compare correctly against these.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";
const TIMESTAMP_PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, StoreError> {
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, TIMESTAMP_PARSE_FORMAT) {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| StoreError::InvalidTimestamp(value.to_string()))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

/// SQLite-backed arrival log and whitelist.
///
/// Every operation is its own short unit of work. The only multi-statement
/// operation, [`Database::record_arrival_if_absent`], runs in an immediate
/// transaction so concurrent writers cannot both pass the recency check.
pub struct Database {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl Database {
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let db_path = db_path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let mut conn = Connection::open(&db_path)?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            error!("Failed to enable WAL mode: {err}");
        }
        conn.busy_timeout(BUSY_TIMEOUT)?;
        run_migrations(&mut conn)?;

        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            conn,
            db_path: Some(db_path),
        })
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        run_migrations(&mut conn)?;
        Ok(Self {
            conn,
            db_path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }
}
