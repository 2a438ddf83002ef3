use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::plate_number::PlateNumber;

/// One sighting of a plate that passed the recency window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArrivalRecord {
    pub id: i64,
    pub plate_number: PlateNumber,
    pub timestamp: DateTime<Utc>,
}

/// A plate authorized to pass the gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WhitelistEntry {
    pub id: i64,
    pub plate_number: PlateNumber,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhitelistInsert {
    Added(i64),
    AlreadyPresent,
}
