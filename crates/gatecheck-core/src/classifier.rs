//! Check-in classifier
//!
//! Pure decision logic turning a ticket lookup plus existing check-in history
//! into a terminal status. Validation failures classify as `invalid`;
//! storage I/O failures propagate as errors so the caller can retry.

use crate::db::{ClaimOutcome, TicketLedger};
use crate::error::Result;
use crate::models::{CheckInStatus, Classification, TicketStatus};

/// Classifies check-in attempts against an authoritative ledger
pub struct Classifier<L> {
    ledger: L,
}

impl<L: TicketLedger> Classifier<L> {
    /// Create a classifier over the given ledger
    pub const fn new(ledger: L) -> Self {
        Self { ledger }
    }

    /// Access the underlying ledger
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Classify one scan of `ticket_identifier` for `event_id`.
    ///
    /// Exactly one of any set of concurrent or replayed scans of the same
    /// ticket comes back `completed`; the rest come back `duplicate`. The
    /// classifier never assigns `flagged` — that is an out-of-band operator
    /// action on the ledger.
    pub async fn classify(
        &self,
        ticket_identifier: &str,
        event_id: &str,
        staff_id: &str,
        scanned_at: i64,
    ) -> Result<Classification> {
        let identifier = ticket_identifier.trim();

        let Some(ticket) = self.ledger.find_ticket(identifier, event_id).await? else {
            tracing::debug!(identifier, event = event_id, "unknown ticket identifier");
            return Ok(Classification::invalid());
        };

        // A pre-existing ledger row means the ticket was used, whatever the
        // ticket's own status says. The original completed row is untouched.
        if let Some(existing) = self.ledger.find_check_in(&ticket.id, event_id).await? {
            return Ok(Classification {
                status: CheckInStatus::Duplicate,
                attendee_name: existing.attendee_name,
                ticket_tier: existing.ticket_tier,
            });
        }

        if ticket.status != TicketStatus::Active {
            tracing::debug!(
                identifier,
                status = %ticket.status,
                "ticket not active"
            );
            return Ok(Classification::invalid());
        }

        // Atomic claim; the ledger's uniqueness constraint breaks ties when
        // two scans race past the check above.
        match self
            .ledger
            .claim_check_in(&ticket, staff_id, scanned_at)
            .await?
        {
            ClaimOutcome::Claimed(check_in) => Ok(Classification {
                status: CheckInStatus::Completed,
                attendee_name: check_in.attendee_name,
                ticket_tier: check_in.ticket_tier,
            }),
            ClaimOutcome::AlreadyCheckedIn(existing) => Ok(Classification {
                status: CheckInStatus::Duplicate,
                attendee_name: existing.attendee_name,
                ticket_tier: existing.ticket_tier,
            }),
        }
    }
}
