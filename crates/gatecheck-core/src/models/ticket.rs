//! Ticket model (external ticket store row, consumed by the classifier)

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Lifecycle status of a ticket in the ticket store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
    /// Sold and not yet used at the gate
    Active,
    /// Consumed by a completed check-in
    CheckedIn,
    /// Cancelled before the event
    Cancelled,
    /// Refunded before the event
    Refunded,
}

impl TicketStatus {
    /// Storage representation
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::CheckedIn => "checked_in",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TicketStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "checked_in" => Ok(Self::CheckedIn),
            "cancelled" => Ok(Self::Cancelled),
            "refunded" => Ok(Self::Refunded),
            other => Err(format!("unknown ticket status: {other}")),
        }
    }
}

/// A ticket as resolved from the ticket store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket store primary key
    pub id: String,
    /// Event this ticket admits to
    pub event_id: String,
    /// Human-facing ticket number (also the QR payload)
    pub ticket_number: String,
    /// Current lifecycle status
    pub status: TicketStatus,
    /// Attendee name at purchase time
    pub attendee_name: Option<String>,
    /// Attendee email at purchase time
    pub attendee_email: Option<String>,
    /// Denormalized tier name
    pub tier: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_roundtrip() {
        for status in [
            TicketStatus::Active,
            TicketStatus::CheckedIn,
            TicketStatus::Cancelled,
            TicketStatus::Refunded,
        ] {
            let parsed: TicketStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn test_status_rejects_unknown() {
        assert!("scanned".parse::<TicketStatus>().is_err());
    }
}
