//! Sync engine: reconciles the local scan queue against the authority
//!
//! Records are pushed sequentially in insertion order so that replays of the
//! same ticket scanned twice while offline resolve deterministically on the
//! server. A `duplicate` or `invalid` response settles a record just like
//! `completed`; only transport and server failures count as attempts.

mod endpoint;
mod http;

pub use endpoint::{CheckInEndpoint, LedgerEndpoint, PushError, PushResult, ScanReplay};
pub use http::{HttpCheckInEndpoint, DEFAULT_PUSH_TIMEOUT};

use libsql::Connection;
use serde::Serialize;

use crate::db::{LibSqlScanQueue, ScanQueue};
use crate::error::Result;
use crate::models::ScanRecordId;

/// Default cap on automatic push attempts per record. Records at the cap are
/// retained and excluded from automatic sync until an operator requeues them.
pub const MAX_SYNC_ATTEMPTS: u32 = 5;

/// One record that failed to push during a sync pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// The record that failed
    pub id: ScanRecordId,
    /// Failure reason recorded on the record
    pub error: String,
}

/// Outcome of one `sync_all` pass, surfaced to the operator dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    /// Records newly settled this pass
    pub synced: usize,
    /// Records that failed and stay queued (or hit the cap)
    pub failed: usize,
    /// Per-record failure details
    pub errors: Vec<SyncFailure>,
    /// Settled records deleted by the retention cleanup
    pub cleaned: u64,
}

/// Drains the local scan queue against a check-in endpoint
pub struct SyncEngine<E> {
    endpoint: E,
    max_attempts: u32,
}

impl<E: CheckInEndpoint> SyncEngine<E> {
    /// Create an engine with the default attempt cap
    pub const fn new(endpoint: E) -> Self {
        Self {
            endpoint,
            max_attempts: MAX_SYNC_ATTEMPTS,
        }
    }

    /// Override the attempt cap
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// The configured attempt cap
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Access the underlying endpoint (used by the immediate ingestion path)
    pub const fn endpoint(&self) -> &E {
        &self.endpoint
    }

    /// Push every unsynced record below the attempt cap, in insertion order,
    /// then run retention cleanup.
    ///
    /// Idempotent: a second pass with no new scans pushes nothing.
    pub async fn sync_all(&self, conn: &Connection) -> Result<SyncSummary> {
        let queue = LibSqlScanQueue::new(conn);
        let pending = queue.pending(self.max_attempts).await?;

        let mut summary = SyncSummary::default();
        if !pending.is_empty() {
            tracing::info!(count = pending.len(), "syncing queued scans");
        }

        for record in pending {
            let replay = ScanReplay::from_record(&record, true);
            match self.endpoint.push(&replay).await {
                Ok(classification) => {
                    // "Already checked in" settles the record; it is not a
                    // failure for attempt accounting
                    queue.mark_synced(&record.id).await?;
                    summary.synced += 1;
                    tracing::debug!(
                        scan = %record.id,
                        status = %classification.status,
                        "scan settled"
                    );
                }
                Err(err) => {
                    let reason = err.to_string();
                    queue.mark_sync_failed(&record.id, &reason).await?;
                    summary.failed += 1;
                    tracing::warn!(scan = %record.id, error = %reason, "scan push failed");
                    summary.errors.push(SyncFailure {
                        id: record.id,
                        error: reason,
                    });
                }
            }
        }

        summary.cleaned = queue.cleanup().await?;

        if summary.synced > 0 || summary.failed > 0 {
            tracing::info!(
                synced = summary.synced,
                failed = summary.failed,
                "sync pass complete"
            );
        }
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{CheckInStatus, Classification, NewScan, TicketStatus};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use tokio::sync::Mutex;

    /// Endpoint that always fails with a transport error
    struct UnreachableEndpoint;

    impl CheckInEndpoint for UnreachableEndpoint {
        async fn push(&self, _replay: &ScanReplay) -> PushResult {
            Err(PushError::Transport("connection refused".to_string()))
        }
    }

    /// Endpoint that fails a fixed number of times, then succeeds
    struct FlakyEndpoint {
        remaining_failures: AtomicU32,
    }

    impl CheckInEndpoint for FlakyEndpoint {
        async fn push(&self, _replay: &ScanReplay) -> PushResult {
            if self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(PushError::Timeout);
            }
            Ok(Classification {
                status: CheckInStatus::Completed,
                attendee_name: None,
                ticket_tier: None,
            })
        }
    }

    /// Wraps another endpoint and records the scanned_at of each push
    struct RecordingEndpoint<E> {
        inner: E,
        pushed_at: StdMutex<Vec<i64>>,
    }

    impl<E: CheckInEndpoint> CheckInEndpoint for RecordingEndpoint<E> {
        async fn push(&self, replay: &ScanReplay) -> PushResult {
            self.pushed_at.lock().unwrap().push(replay.scanned_at);
            self.inner.push(replay).await
        }
    }

    async fn seeded_authority() -> Arc<Mutex<Database>> {
        let db = Database::open_in_memory().await.unwrap();
        for (id, number) in [("t1", "TKT-1"), ("t2", "TKT-2"), ("t3", "TKT-3")] {
            db.connection()
                .execute(
                    "INSERT INTO tickets (id, event_id, ticket_number, status)
                     VALUES (?, ?, ?, ?)",
                    libsql::params![id, "evt-1", number, TicketStatus::Active.as_str()],
                )
                .await
                .unwrap();
        }
        Arc::new(Mutex::new(db))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_all_settles_queued_scans() {
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());
        queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();
        queue
            .enqueue(NewScan::new("TKT-2", "evt-1", "staff-1"))
            .await
            .unwrap();

        let engine = SyncEngine::new(LedgerEndpoint::new(seeded_authority().await));
        let summary = engine.sync_all(device.connection()).await.unwrap();
        assert_eq!(summary.synced, 2);
        assert_eq!(summary.failed, 0);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_duplicate_and_invalid_are_successful_settlement() {
        let authority = seeded_authority().await;
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());

        // Same ticket twice plus an unknown one
        queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();
        queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();
        queue
            .enqueue(NewScan::new("BOGUS-999", "evt-1", "staff-1"))
            .await
            .unwrap();

        let engine = SyncEngine::new(LedgerEndpoint::new(authority.clone()));
        let summary = engine.sync_all(device.connection()).await.unwrap();
        assert_eq!(summary.synced, 3);
        assert_eq!(summary.failed, 0);

        // Exactly one completed ledger row for the doubly scanned ticket
        let authority = authority.lock().await;
        let mut rows = authority
            .connection()
            .query(
                "SELECT COUNT(*) FROM check_ins WHERE ticket_id = 't1' AND status = 'completed'",
                (),
            )
            .await
            .unwrap();
        let count: i64 = rows.next().await.unwrap().unwrap().get(0).unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failures_count_attempts_and_cap_excludes() {
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());
        let record = queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();

        let engine = SyncEngine::new(UnreachableEndpoint);
        for _ in 0..5 {
            let summary = engine.sync_all(device.connection()).await.unwrap();
            assert_eq!(summary.failed, 1);
            assert_eq!(summary.errors.len(), 1);
            assert_eq!(summary.errors[0].id, record.id);
        }

        let fetched = queue.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.sync_attempts, 5);
        assert!(!fetched.synced);

        // The sixth pass skips the exhausted record entirely
        let summary = engine.sync_all(device.connection()).await.unwrap();
        assert_eq!(summary.synced, 0);
        assert_eq!(summary.failed, 0);
        let fetched = queue.get(&record.id).await.unwrap().unwrap();
        assert_eq!(fetched.sync_attempts, 5);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_flaky_endpoint_eventually_settles() {
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());
        queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();

        let engine = SyncEngine::new(FlakyEndpoint {
            remaining_failures: AtomicU32::new(2),
        });

        assert_eq!(engine.sync_all(device.connection()).await.unwrap().failed, 1);
        assert_eq!(engine.sync_all(device.connection()).await.unwrap().failed, 1);
        let summary = engine.sync_all(device.connection()).await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_sync_all_is_idempotent() {
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());
        queue
            .enqueue(NewScan::new("TKT-1", "evt-1", "staff-1"))
            .await
            .unwrap();

        let authority = seeded_authority().await;
        let endpoint = RecordingEndpoint {
            inner: LedgerEndpoint::new(authority),
            pushed_at: StdMutex::new(Vec::new()),
        };
        let engine = SyncEngine::new(endpoint);

        engine.sync_all(device.connection()).await.unwrap();
        let count_after_first = engine.endpoint().pushed_at.lock().unwrap().len();

        // No new scans: the second pass must push nothing
        let summary = engine.sync_all(device.connection()).await.unwrap();
        assert_eq!(summary.synced, 0);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            engine.endpoint().pushed_at.lock().unwrap().len(),
            count_after_first
        );
        assert_eq!(queue.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_replay_preserves_scan_order() {
        let device = Database::open_in_memory().await.unwrap();
        let queue = LibSqlScanQueue::new(device.connection());

        // Three scans at t1 < t2 < t3 while offline
        for (number, at) in [("TKT-1", 100), ("TKT-2", 200), ("TKT-3", 300)] {
            queue
                .enqueue(NewScan::new(number, "evt-1", "staff-1").at(at))
                .await
                .unwrap();
        }

        let endpoint = RecordingEndpoint {
            inner: LedgerEndpoint::new(seeded_authority().await),
            pushed_at: StdMutex::new(Vec::new()),
        };
        let engine = SyncEngine::new(endpoint);
        engine.sync_all(device.connection()).await.unwrap();

        let pushed = engine.endpoint().pushed_at.lock().unwrap().clone();
        assert_eq!(pushed, vec![100, 200, 300]);
    }
}
