//! Scan record model
//!
//! One `ScanRecord` is created per physical scan attempt. Several records may
//! target the same ticket (offline retries, double scans); reconciliation
//! against the ledger happens later in the sync engine.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a locally captured scan, using UUID v7
/// (time-sortable). This identifies the physical scan attempt, not the
/// ticket: retries re-attempt sync, they never rescan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanRecordId(Uuid);

impl ScanRecordId {
    /// Create a new unique scan record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for ScanRecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ScanRecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ScanRecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// A scan as it arrives from the input surface, before the queue assigns an
/// id and sync bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewScan {
    /// Raw scanned or typed ticket identifier (ticket number or QR payload)
    pub ticket_identifier: String,
    /// Target event
    pub event_id: String,
    /// Client timestamp of the physical scan (unix ms)
    pub scanned_at: i64,
    /// Staff member or device that performed the scan
    pub scanned_by: String,
}

impl NewScan {
    /// Create a scan stamped with the current client time
    #[must_use]
    pub fn new(
        ticket_identifier: impl Into<String>,
        event_id: impl Into<String>,
        scanned_by: impl Into<String>,
    ) -> Self {
        Self {
            ticket_identifier: ticket_identifier.into(),
            event_id: event_id.into(),
            scanned_at: chrono::Utc::now().timestamp_millis(),
            scanned_by: scanned_by.into(),
        }
    }

    /// Override the scan timestamp (unix ms)
    #[must_use]
    pub const fn at(mut self, scanned_at: i64) -> Self {
        self.scanned_at = scanned_at;
        self
    }
}

/// A durably stored scan awaiting (or done with) reconciliation.
///
/// The identity fields (`ticket_identifier`, `event_id`, `scanned_at`,
/// `scanned_by`) never change after creation; only the sync bookkeeping
/// fields mutate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanRecord {
    /// Unique local identifier for this scan attempt
    pub id: ScanRecordId,
    /// Raw scanned or typed ticket identifier
    pub ticket_identifier: String,
    /// Target event
    pub event_id: String,
    /// Client timestamp of the physical scan (unix ms); authoritative for
    /// replay ordering, not server receipt time
    pub scanned_at: i64,
    /// Staff member or device that performed the scan
    pub scanned_by: String,
    /// True once the remote authority has durably accepted this scan
    pub synced: bool,
    /// Count of failed push attempts
    pub sync_attempts: u32,
    /// Timestamp of the most recent push attempt (unix ms)
    pub last_sync_attempt: Option<i64>,
    /// Most recent failure reason, for diagnostics
    pub last_error: Option<String>,
}

impl ScanRecord {
    /// Build a fresh record from an incoming scan, with sync bookkeeping
    /// initialized
    #[must_use]
    pub fn from_scan(scan: NewScan) -> Self {
        Self {
            id: ScanRecordId::new(),
            ticket_identifier: scan.ticket_identifier,
            event_id: scan.event_id,
            scanned_at: scan.scanned_at,
            scanned_by: scan.scanned_by,
            synced: false,
            sync_attempts: 0,
            last_sync_attempt: None,
            last_error: None,
        }
    }

    /// Whether this record has hit the attempt cap and needs operator action
    #[must_use]
    pub const fn is_exhausted(&self, max_attempts: u32) -> bool {
        !self.synced && self.sync_attempts >= max_attempts
    }
}
