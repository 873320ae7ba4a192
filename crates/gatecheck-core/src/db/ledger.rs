//! Authoritative ticket and check-in ledger
//!
//! External collaborator seam for the classifier. The libSQL implementation
//! backs the embedded kiosk authority and the test environment; a hosted
//! deployment supplies its own implementation over the shared store.

use crate::error::{Error, Result};
use crate::models::{CheckIn, CheckInId, CheckInStats, CheckInStatus, Ticket, TicketStatus};
use libsql::{params, Connection, Row};

/// Result of an atomic check-in claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClaimOutcome {
    /// This scan won: a new completed ledger row was created and the ticket
    /// was flipped to `checked_in`
    Claimed(CheckIn),
    /// Another scan got there first; the existing row is returned untouched
    AlreadyCheckedIn(CheckIn),
}

/// Trait for authoritative ledger operations (async)
///
/// `claim_check_in` must be atomic with respect to concurrent claims for the
/// same `(ticket, event)`: the backing store has to enforce uniqueness, not
/// the caller.
#[allow(async_fn_in_trait)]
pub trait TicketLedger {
    /// Insert a ticket into the ticket store (seeding/ops tooling)
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()>;

    /// Resolve a raw scanned identifier (ticket number or id) within an event
    async fn find_ticket(&self, identifier: &str, event_id: &str) -> Result<Option<Ticket>>;

    /// Look up the existing check-in for a ticket, if any
    async fn find_check_in(&self, ticket_id: &str, event_id: &str) -> Result<Option<CheckIn>>;

    /// Fetch a check-in by ledger id
    async fn get_check_in(&self, id: &CheckInId) -> Result<Option<CheckIn>>;

    /// Atomically create the completed check-in row and flip the ticket to
    /// `checked_in`. Exactly one concurrent claim per `(ticket, event)` wins.
    async fn claim_check_in(
        &self,
        ticket: &Ticket,
        checked_in_by: &str,
        checked_in_at: i64,
    ) -> Result<ClaimOutcome>;

    /// Move a completed check-in to `flagged` with an issue description
    async fn flag_check_in(&self, id: &CheckInId, issue_description: &str) -> Result<CheckIn>;

    /// Move a flagged check-in back to `completed`
    async fn resolve_check_in_issue(&self, id: &CheckInId) -> Result<CheckIn>;

    /// All check-ins for an event, newest first
    async fn list_check_ins(&self, event_id: &str) -> Result<Vec<CheckIn>>;

    /// Aggregate check-in figures for an event
    async fn check_in_stats(&self, event_id: &str) -> Result<CheckInStats>;
}

/// libSQL implementation of `TicketLedger`
pub struct LibSqlTicketLedger<'a> {
    conn: &'a Connection,
}

const CHECK_IN_COLUMNS: &str = "id, ticket_id, event_id, status, attendee_name, attendee_email, \
     ticket_tier, checked_in_by, checked_in_at, issue_description";

impl<'a> LibSqlTicketLedger<'a> {
    /// Create a new ledger over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_ticket(row: &Row) -> Result<Ticket> {
        let status: String = row.get(3)?;
        Ok(Ticket {
            id: row.get(0)?,
            event_id: row.get(1)?,
            ticket_number: row.get(2)?,
            status: status.parse().map_err(Error::Database)?,
            attendee_name: row.get(4)?,
            attendee_email: row.get(5)?,
            tier: row.get(6)?,
        })
    }

    fn parse_check_in(row: &Row) -> Result<CheckIn> {
        let id: String = row.get(0)?;
        let status: String = row.get(3)?;
        Ok(CheckIn {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("invalid check-in id: {id}")))?,
            ticket_id: row.get(1)?,
            event_id: row.get(2)?,
            status: status.parse().map_err(Error::Database)?,
            attendee_name: row.get(4)?,
            attendee_email: row.get(5)?,
            ticket_tier: row.get(6)?,
            checked_in_by: row.get(7)?,
            checked_in_at: row.get(8)?,
            issue_description: row.get(9)?,
        })
    }

    async fn count(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<u64> {
        let mut rows = self.conn.query(sql, args).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn set_check_in_status(
        &self,
        id: &CheckInId,
        from: CheckInStatus,
        to: CheckInStatus,
        issue_description: Option<&str>,
    ) -> Result<CheckIn> {
        let rows = match issue_description {
            Some(issue) => {
                self.conn
                    .execute(
                        "UPDATE check_ins SET status = ?, issue_description = ?
                         WHERE id = ? AND status = ?",
                        params![to.as_str(), issue, id.as_str(), from.as_str()],
                    )
                    .await?
            }
            None => {
                self.conn
                    .execute(
                        "UPDATE check_ins SET status = ?, issue_description = NULL
                         WHERE id = ? AND status = ?",
                        params![to.as_str(), id.as_str(), from.as_str()],
                    )
                    .await?
            }
        };

        if rows == 0 {
            return Err(Error::NotFound(format!(
                "no {from} check-in with id {id}"
            )));
        }

        self.get_check_in(id)
            .await?
            .ok_or_else(|| Error::NotFound(id.to_string()))
    }
}

impl TicketLedger for LibSqlTicketLedger<'_> {
    async fn insert_ticket(&self, ticket: &Ticket) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO tickets
                     (id, event_id, ticket_number, status, attendee_name, attendee_email, tier)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    ticket.id.clone(),
                    ticket.event_id.clone(),
                    ticket.ticket_number.clone(),
                    ticket.status.as_str(),
                    ticket.attendee_name.clone(),
                    ticket.attendee_email.clone(),
                    ticket.tier.clone(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn find_ticket(&self, identifier: &str, event_id: &str) -> Result<Option<Ticket>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, event_id, ticket_number, status, attendee_name, attendee_email, tier
                 FROM tickets
                 WHERE event_id = ? AND (ticket_number = ? OR id = ?)",
                params![event_id, identifier, identifier],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_ticket(&row)?)),
            None => Ok(None),
        }
    }

    async fn find_check_in(&self, ticket_id: &str, event_id: &str) -> Result<Option<CheckIn>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CHECK_IN_COLUMNS} FROM check_ins
                     WHERE ticket_id = ? AND event_id = ?"
                ),
                params![ticket_id, event_id],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_check_in(&row)?)),
            None => Ok(None),
        }
    }

    async fn get_check_in(&self, id: &CheckInId) -> Result<Option<CheckIn>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {CHECK_IN_COLUMNS} FROM check_ins WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_check_in(&row)?)),
            None => Ok(None),
        }
    }

    async fn claim_check_in(
        &self,
        ticket: &Ticket,
        checked_in_by: &str,
        checked_in_at: i64,
    ) -> Result<ClaimOutcome> {
        let check_in = CheckIn {
            id: CheckInId::new(),
            ticket_id: ticket.id.clone(),
            event_id: ticket.event_id.clone(),
            status: CheckInStatus::Completed,
            attendee_name: ticket.attendee_name.clone(),
            attendee_email: ticket.attendee_email.clone(),
            ticket_tier: ticket.tier.clone(),
            checked_in_by: checked_in_by.to_string(),
            checked_in_at,
            issue_description: None,
        };

        // The UNIQUE(ticket_id, event_id) index resolves the race: of any
        // number of concurrent claims, exactly one insert takes effect.
        self.conn.execute("BEGIN IMMEDIATE", ()).await?;

        let insert = self
            .conn
            .execute(
                "INSERT INTO check_ins
                     (id, ticket_id, event_id, status, attendee_name, attendee_email,
                      ticket_tier, checked_in_by, checked_in_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                 ON CONFLICT (ticket_id, event_id) DO NOTHING",
                params![
                    check_in.id.as_str(),
                    check_in.ticket_id.clone(),
                    check_in.event_id.clone(),
                    check_in.status.as_str(),
                    check_in.attendee_name.clone(),
                    check_in.attendee_email.clone(),
                    check_in.ticket_tier.clone(),
                    check_in.checked_in_by.clone(),
                    check_in.checked_in_at,
                ],
            )
            .await;

        let inserted = match insert {
            Ok(rows) => rows,
            Err(e) => {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e.into());
            }
        };

        if inserted == 0 {
            self.conn.execute("COMMIT", ()).await?;
            let existing = self
                .find_check_in(&ticket.id, &ticket.event_id)
                .await?
                .ok_or_else(|| {
                    Error::Database(format!(
                        "check-in claim conflicted but no row exists for ticket {}",
                        ticket.id
                    ))
                })?;
            return Ok(ClaimOutcome::AlreadyCheckedIn(existing));
        }

        let flip = self
            .conn
            .execute(
                "UPDATE tickets SET status = ? WHERE id = ?",
                params![TicketStatus::CheckedIn.as_str(), ticket.id.clone()],
            )
            .await;

        if let Err(e) = flip {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        self.conn.execute("COMMIT", ()).await?;
        tracing::info!(
            ticket = %ticket.ticket_number,
            event = %ticket.event_id,
            by = %checked_in_by,
            "check-in completed"
        );
        Ok(ClaimOutcome::Claimed(check_in))
    }

    async fn flag_check_in(&self, id: &CheckInId, issue_description: &str) -> Result<CheckIn> {
        let flagged = self
            .set_check_in_status(
                id,
                CheckInStatus::Completed,
                CheckInStatus::Flagged,
                Some(issue_description),
            )
            .await?;
        tracing::warn!(check_in = %id, issue = issue_description, "check-in flagged");
        Ok(flagged)
    }

    async fn resolve_check_in_issue(&self, id: &CheckInId) -> Result<CheckIn> {
        let resolved = self
            .set_check_in_status(id, CheckInStatus::Flagged, CheckInStatus::Completed, None)
            .await?;
        tracing::info!(check_in = %id, "check-in issue resolved");
        Ok(resolved)
    }

    async fn list_check_ins(&self, event_id: &str) -> Result<Vec<CheckIn>> {
        let mut rows = self
            .conn
            .query(
                &format!(
                    "SELECT {CHECK_IN_COLUMNS} FROM check_ins
                     WHERE event_id = ?
                     ORDER BY checked_in_at DESC"
                ),
                params![event_id],
            )
            .await?;

        let mut check_ins = Vec::new();
        while let Some(row) = rows.next().await? {
            check_ins.push(Self::parse_check_in(&row)?);
        }
        Ok(check_ins)
    }

    async fn check_in_stats(&self, event_id: &str) -> Result<CheckInStats> {
        let total_tickets = self
            .count(
                "SELECT COUNT(*) FROM tickets
                 WHERE event_id = ? AND status IN ('active', 'checked_in')",
                params![event_id],
            )
            .await?;
        let completed = self
            .count(
                "SELECT COUNT(*) FROM check_ins WHERE event_id = ? AND status = 'completed'",
                params![event_id],
            )
            .await?;
        let flagged = self
            .count(
                "SELECT COUNT(*) FROM check_ins WHERE event_id = ? AND status = 'flagged'",
                params![event_id],
            )
            .await?;

        #[allow(clippy::cast_precision_loss)]
        let check_in_rate = if total_tickets > 0 {
            (completed as f64 / total_tickets as f64) * 100.0
        } else {
            0.0
        };

        Ok(CheckInStats {
            total_tickets,
            completed,
            flagged,
            check_in_rate,
        })
    }
}
