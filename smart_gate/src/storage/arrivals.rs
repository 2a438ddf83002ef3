use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::{format_timestamp, parse_timestamp, ArrivalRecord, Database};
use crate::access::ArrivalStore;
use crate::error::StoreError;
use crate::plate_number::PlateNumber;

fn row_to_arrival(row: &Row) -> Result<ArrivalRecord, StoreError> {
    let timestamp: String = row.get("timestamp")?;
    Ok(ArrivalRecord {
        id: row.get("id")?,
        plate_number: PlateNumber::from_stored(row.get("plate_number")?),
        timestamp: parse_timestamp(&timestamp)?,
    })
}

impl Database {
    pub fn insert_arrival(&self, plate: &PlateNumber, at: DateTime<Utc>) -> Result<i64, StoreError> {
        self.conn.execute(
            "INSERT INTO arrivals (plate_number, timestamp) VALUES (?1, ?2)",
            params![plate.as_str(), format_timestamp(at)],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn recent_arrival_exists(
        &self,
        plate: &PlateNumber,
        since: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM arrivals
                 WHERE plate_number = ?1 AND julianday(timestamp) >= julianday(?2)
                 LIMIT 1",
                params![plate.as_str(), format_timestamp(since)],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Inserts an arrival at `at` unless one for the same plate exists at or
    /// after `since`. Returns the new row id, or `None` when suppressed.
    pub fn record_arrival_if_absent(
        &self,
        plate: &PlateNumber,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        let tx = Transaction::new_unchecked(&self.conn, TransactionBehavior::Immediate)?;

        let recent = tx
            .query_row(
                "SELECT 1 FROM arrivals
                 WHERE plate_number = ?1 AND julianday(timestamp) >= julianday(?2)
                 LIMIT 1",
                params![plate.as_str(), format_timestamp(since)],
                |_| Ok(()),
            )
            .optional()?;
        if recent.is_some() {
            tx.commit()?;
            return Ok(None);
        }

        tx.execute(
            "INSERT INTO arrivals (plate_number, timestamp) VALUES (?1, ?2)",
            params![plate.as_str(), format_timestamp(at)],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        Ok(Some(id))
    }

    pub fn list_arrivals(&self) -> Result<Vec<ArrivalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, plate_number, timestamp FROM arrivals ORDER BY timestamp ASC, id ASC",
        )?;
        let mut rows = stmt.query([])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_arrival(row)?);
        }
        Ok(records)
    }

    pub fn arrivals_for(&self, plate: &PlateNumber) -> Result<Vec<ArrivalRecord>, StoreError> {
        let mut stmt = self.conn.prepare(
            "SELECT id, plate_number, timestamp FROM arrivals
             WHERE plate_number = ?1
             ORDER BY timestamp ASC, id ASC",
        )?;
        let mut rows = stmt.query(params![plate.as_str()])?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            records.push(row_to_arrival(row)?);
        }
        Ok(records)
    }

    pub fn count_arrivals(&self) -> Result<i64, StoreError> {
        Ok(self
            .conn
            .query_row("SELECT COUNT(*) FROM arrivals", [], |row| row.get(0))?)
    }

    /// Rewrites one row of the arrival log, as the operator's table editor does.
    pub fn update_arrival(
        &self,
        id: i64,
        plate: &PlateNumber,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let changed = self.conn.execute(
            "UPDATE arrivals SET plate_number = ?1, timestamp = ?2 WHERE id = ?3",
            params![plate.as_str(), format_timestamp(timestamp), id],
        )?;
        if changed == 0 {
            return Err(StoreError::MissingRow {
                table: "arrivals",
                id,
            });
        }
        Ok(())
    }
}

impl ArrivalStore for Database {
    fn record_arrival_if_absent(
        &self,
        plate: &PlateNumber,
        since: DateTime<Utc>,
        at: DateTime<Utc>,
    ) -> Result<Option<i64>, StoreError> {
        Database::record_arrival_if_absent(self, plate, since, at)
    }

    fn is_whitelisted(&self, plate: &PlateNumber) -> Result<bool, StoreError> {
        Database::is_whitelisted(self, plate)
    }
}
