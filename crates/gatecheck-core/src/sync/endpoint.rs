//! Remote check-in endpoint contract
//!
//! The sync engine and the immediate ingestion path both talk to the
//! authority through this seam: over HTTP for hosted deployments, or
//! directly against an embedded ledger for kiosk mode and tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::classifier::Classifier;
use crate::db::{Database, LibSqlTicketLedger};
use crate::models::{Classification, ScanRecord};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Wire payload for one scan pushed to the check-in endpoint.
///
/// `offline_replay` tells the server to apply `scanned_at`-based ordering
/// instead of receipt-time ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReplay {
    /// Raw scanned or typed ticket identifier
    pub ticket_identifier: String,
    /// Target event
    pub event_id: String,
    /// Client timestamp of the physical scan (unix ms)
    pub scanned_at: i64,
    /// Staff member or device that performed the scan
    pub scanned_by: String,
    /// True when this scan is replayed from the offline queue
    pub offline_replay: bool,
}

impl ScanReplay {
    /// Build the wire payload for a queued record
    #[must_use]
    pub fn from_record(record: &ScanRecord, offline_replay: bool) -> Self {
        Self {
            ticket_identifier: record.ticket_identifier.clone(),
            event_id: record.event_id.clone(),
            scanned_at: record.scanned_at,
            scanned_by: record.scanned_by.clone(),
            offline_replay,
        }
    }
}

/// Structured push failure.
///
/// Terminal outcomes (`duplicate`, `invalid`) are *not* errors: the endpoint
/// returns them as classifications so sync-attempt accounting never counts
/// them as failures. Everything here is a candidate for retry.
#[derive(Debug, Error)]
pub enum PushError {
    /// The bounded request timeout elapsed
    #[error("check-in request timed out")]
    Timeout,

    /// Connection-level failure (DNS, refused, reset)
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with an error status
    #[error("server error {status} ({code}): {message}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Structured error code from the response body
        code: String,
        /// Human-readable message for diagnostics
        message: String,
    },

    /// The server answered 2xx with a body we could not interpret
    #[error("invalid response payload: {0}")]
    InvalidPayload(String),
}

impl PushError {
    /// Whether the sync engine should keep this record queued for retry
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout | Self::Transport(_) | Self::InvalidPayload(_) => true,
            Self::Server { status, .. } => *status >= 500,
        }
    }
}

/// Result alias for endpoint pushes
pub type PushResult = std::result::Result<Classification, PushError>;

/// Trait for the remote check-in endpoint (async)
#[allow(async_fn_in_trait)]
pub trait CheckInEndpoint {
    /// Submit one scan and get back its terminal classification
    async fn push(&self, replay: &ScanReplay) -> PushResult;
}

/// Endpoint that runs the classifier against a local authority database.
///
/// This is the embedded kiosk deployment and the test double: same contract
/// as the HTTP endpoint, no network.
#[derive(Clone)]
pub struct LedgerEndpoint {
    db: Arc<Mutex<Database>>,
}

impl LedgerEndpoint {
    /// Create an endpoint over a shared authority database
    #[must_use]
    pub fn new(db: Arc<Mutex<Database>>) -> Self {
        Self { db }
    }
}

impl CheckInEndpoint for LedgerEndpoint {
    async fn push(&self, replay: &ScanReplay) -> PushResult {
        let db = self.db.lock().await;
        let classifier = Classifier::new(LibSqlTicketLedger::new(db.connection()));
        classifier
            .classify(
                &replay.ticket_identifier,
                &replay.event_id,
                &replay.scanned_by,
                replay.scanned_at,
            )
            .await
            // Ledger I/O failures are retryable, same as a lost connection
            .map_err(|e| PushError::Transport(e.to_string()))
    }
}
