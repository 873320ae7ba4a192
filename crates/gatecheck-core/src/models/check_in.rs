//! Check-in ledger models and scan outcomes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// A unique identifier for a ledger check-in entry, using UUID v7
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckInId(Uuid);

impl CheckInId {
    /// Create a new unique check-in ID using UUID v7
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

impl Default for CheckInId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CheckInId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for CheckInId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Terminal status of a check-in attempt.
///
/// The ledger only ever stores `completed` and `flagged` rows: `duplicate`
/// and `invalid` are reported to the scanning device but create no second
/// ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckInStatus {
    /// First valid scan of the ticket; the ticket is now consumed
    Completed,
    /// The ticket already has a check-in on the ledger
    Duplicate,
    /// Unknown ticket, or ticket not in `active` status
    Invalid,
    /// Operator flagged an already-completed check-in for review
    Flagged,
}

impl CheckInStatus {
    /// Storage/wire representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
            Self::Flagged => "flagged",
        }
    }
}

impl fmt::Display for CheckInStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CheckInStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "duplicate" => Ok(Self::Duplicate),
            "invalid" => Ok(Self::Invalid),
            "flagged" => Ok(Self::Flagged),
            other => Err(format!("unknown check-in status: {other}")),
        }
    }
}

/// An authoritative ledger entry, at most one per `(ticket_id, event_id)`.
///
/// Attendee name and tier are snapshotted at check-in time so later ticket
/// edits do not retroactively alter history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckIn {
    /// Ledger entry identifier
    pub id: CheckInId,
    /// Ticket that was checked in
    pub ticket_id: String,
    /// Event the check-in belongs to
    pub event_id: String,
    /// Current ledger status (`completed` or `flagged`)
    pub status: CheckInStatus,
    /// Attendee name snapshot
    pub attendee_name: Option<String>,
    /// Attendee email snapshot
    pub attendee_email: Option<String>,
    /// Tier name snapshot
    pub ticket_tier: Option<String>,
    /// Staff member who checked the ticket in
    pub checked_in_by: String,
    /// Scan timestamp applied to the ledger (unix ms, client scan time)
    pub checked_in_at: i64,
    /// Issue description while flagged
    pub issue_description: Option<String>,
}

/// What the classifier decided for one scan
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Classification {
    /// Terminal status assigned to the scan
    pub status: CheckInStatus,
    /// Attendee name, when the ticket resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_name: Option<String>,
    /// Tier name, when the ticket resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_tier: Option<String>,
}

impl Classification {
    /// An `invalid` classification with no attendee details
    #[must_use]
    pub const fn invalid() -> Self {
        Self {
            status: CheckInStatus::Invalid,
            attendee_name: None,
            ticket_tier: None,
        }
    }
}

/// What the scanning device shows to staff for one scan.
///
/// `Deferred` is distinct from the terminal ledger statuses: the scan was
/// durably recorded but not yet confirmed by the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Admitted
    Completed,
    /// Already used
    Duplicate,
    /// Not a usable ticket
    Invalid,
    /// Recorded locally, pending sync
    Deferred,
}

impl fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Completed => "completed",
            Self::Duplicate => "duplicate",
            Self::Invalid => "invalid",
            Self::Deferred => "deferred",
        };
        f.write_str(s)
    }
}

/// Result of `submit_scan`, surfaced directly to the staff UI
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanOutcome {
    /// Status to display
    pub status: ScanStatus,
    /// Attendee name for the welcome message, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attendee_name: Option<String>,
    /// Tier name, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ticket_tier: Option<String>,
}

impl ScanOutcome {
    /// Outcome for a scan recorded locally while the authority is unreachable
    #[must_use]
    pub const fn deferred() -> Self {
        Self {
            status: ScanStatus::Deferred,
            attendee_name: None,
            ticket_tier: None,
        }
    }
}

impl From<Classification> for ScanOutcome {
    fn from(classification: Classification) -> Self {
        let status = match classification.status {
            CheckInStatus::Completed => ScanStatus::Completed,
            // A flagged ledger row still means the ticket was used
            CheckInStatus::Duplicate | CheckInStatus::Flagged => ScanStatus::Duplicate,
            CheckInStatus::Invalid => ScanStatus::Invalid,
        };
        Self {
            status,
            attendee_name: classification.attendee_name,
            ticket_tier: classification.ticket_tier,
        }
    }
}

/// Aggregate check-in figures for one event, for the operator dashboard
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInStats {
    /// Tickets in `active` or `checked_in` status
    pub total_tickets: u64,
    /// Completed check-ins
    pub completed: u64,
    /// Flagged check-ins
    pub flagged: u64,
    /// Completed as a percentage of total tickets
    pub check_in_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_in_status_roundtrip() {
        for status in [
            CheckInStatus::Completed,
            CheckInStatus::Duplicate,
            CheckInStatus::Invalid,
            CheckInStatus::Flagged,
        ] {
            let parsed: CheckInStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_outcome_from_classification() {
        let outcome = ScanOutcome::from(Classification {
            status: CheckInStatus::Completed,
            attendee_name: Some("Ada Lovelace".to_string()),
            ticket_tier: Some("VIP".to_string()),
        });
        assert_eq!(outcome.status, ScanStatus::Completed);
        assert_eq!(outcome.attendee_name.as_deref(), Some("Ada Lovelace"));

        let outcome = ScanOutcome::from(Classification::invalid());
        assert_eq!(outcome.status, ScanStatus::Invalid);
        assert!(outcome.attendee_name.is_none());
    }

    #[test]
    fn test_deferred_outcome_serializes_compactly() {
        let json = serde_json::to_string(&ScanOutcome::deferred()).unwrap();
        assert_eq!(json, r#"{"status":"deferred"}"#);
    }
}
