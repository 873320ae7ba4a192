//! Device-facing check-in service
//!
//! The entry point a gate device calls for every scan. Owns the device's
//! local database exclusively; the authoritative ledger is only ever reached
//! through the configured endpoint.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::connectivity::ConnectivityMonitor;
use crate::db::{Database, LibSqlScanQueue, ScanQueue};
use crate::error::{Error, Result};
use crate::models::{NewScan, ScanOutcome, ScanRecord, ScanRecordId};
use crate::sync::{CheckInEndpoint, ScanReplay, SyncEngine, SyncSummary};

/// Thread-safe service wrapping the scan queue, sync engine, and
/// connectivity state for one device.
#[derive(Clone)]
pub struct CheckInService<E> {
    db: Arc<Mutex<Database>>,
    engine: Arc<SyncEngine<E>>,
    monitor: ConnectivityMonitor,
}

impl<E: CheckInEndpoint> CheckInService<E> {
    /// Open a service over a database file, creating parent directories as
    /// needed
    pub async fn open_path(
        db_path: impl Into<PathBuf>,
        engine: SyncEngine<E>,
        monitor: ConnectivityMonitor,
    ) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            engine: Arc::new(engine),
            monitor,
        })
    }

    /// Open a service over an in-memory database (primarily for tests)
    pub async fn open_in_memory(engine: SyncEngine<E>, monitor: ConnectivityMonitor) -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            engine: Arc::new(engine),
            monitor,
        })
    }

    /// The device's connectivity monitor
    pub const fn connectivity(&self) -> &ConnectivityMonitor {
        &self.monitor
    }

    /// Ingest one scan from the input surface.
    ///
    /// The scan is durably queued before anything else happens; if the local
    /// write fails, the error propagates as a hard failure since nothing
    /// downstream could recover a scan that was never captured. When online,
    /// the scan is pushed immediately for instant staff feedback; otherwise
    /// (or when the push fails transiently) the outcome is `deferred` and
    /// the sync engine settles the record later.
    pub async fn submit_scan(
        &self,
        ticket_identifier: &str,
        event_id: &str,
        staff_id: &str,
    ) -> Result<ScanOutcome> {
        let identifier = ticket_identifier.trim();
        if identifier.is_empty() {
            return Err(Error::InvalidInput(
                "ticket identifier must not be empty".to_string(),
            ));
        }

        let record = {
            let db = self.db.lock().await;
            LibSqlScanQueue::new(db.connection())
                .enqueue(NewScan::new(identifier, event_id, staff_id))
                .await?
        };

        if !self.monitor.is_online() {
            tracing::debug!(scan = %record.id, "offline, scan deferred");
            return Ok(ScanOutcome::deferred());
        }

        let replay = ScanReplay::from_record(&record, false);
        match self.engine.endpoint().push(&replay).await {
            Ok(classification) => {
                let db = self.db.lock().await;
                LibSqlScanQueue::new(db.connection())
                    .mark_synced(&record.id)
                    .await?;
                Ok(ScanOutcome::from(classification))
            }
            Err(err) => {
                // The record stays queued untouched; immediate-path failures
                // don't consume sync attempts
                tracing::warn!(scan = %record.id, error = %err, "immediate push failed, scan deferred");
                Ok(ScanOutcome::deferred())
            }
        }
    }

    /// Count of scans not yet accepted by the authority (the staff-visible
    /// pending badge)
    pub async fn pending_count(&self) -> Result<u64> {
        let db = self.db.lock().await;
        LibSqlScanQueue::new(db.connection()).pending_count().await
    }

    /// Full local queue in insertion order
    pub async fn queue_snapshot(&self) -> Result<Vec<ScanRecord>> {
        let db = self.db.lock().await;
        LibSqlScanQueue::new(db.connection()).list_all().await
    }

    /// Records that hit the attempt cap and need operator action
    pub async fn exhausted_records(&self) -> Result<Vec<ScanRecord>> {
        let db = self.db.lock().await;
        LibSqlScanQueue::new(db.connection())
            .exhausted(self.engine.max_attempts())
            .await
    }

    /// Operator decision: put an exhausted record back into automatic sync
    pub async fn requeue(&self, id: &ScanRecordId) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlScanQueue::new(db.connection()).requeue(id).await
    }

    /// Run one sync pass now
    pub async fn sync_all(&self) -> Result<SyncSummary> {
        let db = self.db.lock().await;
        self.engine.sync_all(db.connection()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ScanStatus, Ticket, TicketStatus};
    use crate::sync::{LedgerEndpoint, PushError, PushResult};
    use pretty_assertions::assert_eq;

    struct UnreachableEndpoint;

    impl CheckInEndpoint for UnreachableEndpoint {
        async fn push(&self, _replay: &ScanReplay) -> PushResult {
            Err(PushError::Transport("connection refused".to_string()))
        }
    }

    async fn seeded_authority() -> Arc<Mutex<Database>> {
        let db = Database::open_in_memory().await.unwrap();
        {
            use crate::db::TicketLedger;
            let ledger = crate::db::LibSqlTicketLedger::new(db.connection());
            for (id, number) in [("t1", "TKT-1"), ("t2", "TKT-2")] {
                ledger
                    .insert_ticket(&Ticket {
                        id: id.to_string(),
                        event_id: "evt-1".to_string(),
                        ticket_number: number.to_string(),
                        status: TicketStatus::Active,
                        attendee_name: Some("Ada Lovelace".to_string()),
                        attendee_email: None,
                        tier: Some("VIP".to_string()),
                    })
                    .await
                    .unwrap();
            }
        }
        Arc::new(Mutex::new(db))
    }

    async fn online_service() -> CheckInService<LedgerEndpoint> {
        let endpoint = LedgerEndpoint::new(seeded_authority().await);
        CheckInService::open_in_memory(SyncEngine::new(endpoint), ConnectivityMonitor::new(true))
            .await
            .unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_online_scan_completes_immediately() {
        let service = online_service().await;

        let outcome = service.submit_scan("TKT-1", "evt-1", "staff-1").await.unwrap();
        assert_eq!(outcome.status, ScanStatus::Completed);
        assert_eq!(outcome.attendee_name.as_deref(), Some("Ada Lovelace"));
        // Synced immediately, nothing pending
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_online_rescan_is_duplicate() {
        let service = online_service().await;

        service.submit_scan("TKT-1", "evt-1", "staff-1").await.unwrap();
        let outcome = service.submit_scan("TKT-1", "evt-1", "staff-2").await.unwrap();
        assert_eq!(outcome.status, ScanStatus::Duplicate);
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_unknown_identifier_is_invalid() {
        let service = online_service().await;

        let outcome = service
            .submit_scan("BOGUS-999", "evt-1", "staff-1")
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Invalid);
        // Terminal: settled, not retried
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_empty_identifier_is_rejected() {
        let service = online_service().await;
        assert!(service.submit_scan("   ", "evt-1", "staff-1").await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_offline_scan_defers_then_syncs_on_reconnect() {
        let endpoint = LedgerEndpoint::new(seeded_authority().await);
        let monitor = ConnectivityMonitor::new(false);
        let service =
            CheckInService::open_in_memory(SyncEngine::new(endpoint), monitor.clone())
                .await
                .unwrap();

        let outcome = service.submit_scan("TKT-2", "evt-1", "staff-1").await.unwrap();
        assert_eq!(outcome.status, ScanStatus::Deferred);
        assert_eq!(service.pending_count().await.unwrap(), 1);

        // Back online: sync resolves the deferred scan
        monitor.set_online(true);
        let summary = service.sync_all().await.unwrap();
        assert_eq!(summary.synced, 1);
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_transient_push_failure_defers_without_burning_attempts() {
        let service = CheckInService::open_in_memory(
            SyncEngine::new(UnreachableEndpoint),
            ConnectivityMonitor::new(true),
        )
        .await
        .unwrap();

        let outcome = service.submit_scan("TKT-1", "evt-1", "staff-1").await.unwrap();
        assert_eq!(outcome.status, ScanStatus::Deferred);

        let queue = service.queue_snapshot().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert!(!queue[0].synced);
        assert_eq!(queue[0].sync_attempts, 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_exhausted_records_surface_and_requeue() {
        let service = CheckInService::open_in_memory(
            SyncEngine::new(UnreachableEndpoint),
            ConnectivityMonitor::new(false),
        )
        .await
        .unwrap();

        service.submit_scan("TKT-1", "evt-1", "staff-1").await.unwrap();
        for _ in 0..5 {
            let summary = service.sync_all().await.unwrap();
            assert_eq!(summary.failed, 1);
        }

        let exhausted = service.exhausted_records().await.unwrap();
        assert_eq!(exhausted.len(), 1);
        assert_eq!(exhausted[0].sync_attempts, 5);
        assert_eq!(
            exhausted[0].last_error.as_deref(),
            Some("transport error: connection refused")
        );

        // Operator requeues; the record is eligible again but still retained
        service.requeue(&exhausted[0].id).await.unwrap();
        assert!(service.exhausted_records().await.unwrap().is_empty());
        assert_eq!(service.pending_count().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_queue_survives_restart() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("device.db");
        let monitor = ConnectivityMonitor::new(false);

        {
            let service = CheckInService::open_path(
                &db_path,
                SyncEngine::new(UnreachableEndpoint),
                monitor.clone(),
            )
            .await
            .unwrap();
            service.submit_scan("TKT-1", "evt-1", "staff-1").await.unwrap();
            service.submit_scan("TKT-2", "evt-1", "staff-1").await.unwrap();
            assert_eq!(service.pending_count().await.unwrap(), 2);
        }

        // Process restart: unsynced records are still there, in order
        let endpoint = LedgerEndpoint::new(seeded_authority().await);
        let service = CheckInService::open_path(&db_path, SyncEngine::new(endpoint), monitor)
            .await
            .unwrap();
        assert_eq!(service.pending_count().await.unwrap(), 2);
        let queue = service.queue_snapshot().await.unwrap();
        assert_eq!(queue[0].ticket_identifier, "TKT-1");
        assert_eq!(queue[1].ticket_identifier, "TKT-2");

        // And they settle once the authority is reachable
        service.connectivity().set_online(true);
        let summary = service.sync_all().await.unwrap();
        assert_eq!(summary.synced, 2);
        assert_eq!(service.pending_count().await.unwrap(), 0);
    }
}
