//! Local scan queue repository
//!
//! Durable, append-mostly queue of scan records. Enqueue never depends on
//! network state; the only way it fails is local storage I/O, which the
//! ingestion layer surfaces as a hard error.

use crate::error::{Error, Result};
use crate::models::{NewScan, ScanRecord, ScanRecordId};
use libsql::{params, Connection, Row};

/// Synced records are kept this long after their scan time before cleanup
/// deletes them (bounds local storage growth)
pub const SYNCED_RETENTION_MS: i64 = 24 * 60 * 60 * 1000;

const RECORD_COLUMNS: &str = "id, ticket_identifier, event_id, scanned_at, scanned_by, \
     synced, sync_attempts, last_sync_attempt, last_error";

/// Trait for scan queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait ScanQueue {
    /// Append a scan, assigning a fresh local id and zeroed sync fields
    async fn enqueue(&self, scan: NewScan) -> Result<ScanRecord>;

    /// Fetch one record by id
    async fn get(&self, id: &ScanRecordId) -> Result<Option<ScanRecord>>;

    /// Full queue in insertion order (stable iteration order for sync)
    async fn list_all(&self) -> Result<Vec<ScanRecord>>;

    /// Unsynced records below the attempt cap, in insertion order
    async fn pending(&self, max_attempts: u32) -> Result<Vec<ScanRecord>>;

    /// Count of unsynced records
    async fn pending_count(&self) -> Result<u64>;

    /// Unsynced records at or above the attempt cap, awaiting operator action
    async fn exhausted(&self, max_attempts: u32) -> Result<Vec<ScanRecord>>;

    /// Mark a record as durably accepted by the authority; idempotent
    async fn mark_synced(&self, id: &ScanRecordId) -> Result<()>;

    /// Record a failed push attempt: increments the attempt counter once and
    /// stores the failure reason
    async fn mark_sync_failed(&self, id: &ScanRecordId, error: &str) -> Result<()>;

    /// Operator-initiated reset of the attempt counter so the next sync pass
    /// picks the record up again
    async fn requeue(&self, id: &ScanRecordId) -> Result<()>;

    /// Delete synced records older than the retention window. Unsynced
    /// records are never deleted regardless of age or attempt count.
    async fn cleanup(&self) -> Result<u64>;
}

/// libSQL implementation of `ScanQueue`
pub struct LibSqlScanQueue<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlScanQueue<'a> {
    /// Create a new queue over the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a scan record from a database row
    fn parse_record(row: &Row) -> Result<ScanRecord> {
        let id: String = row.get(0)?;
        let id = id
            .parse()
            .map_err(|_| Error::Database(format!("invalid scan record id: {id}")))?;
        let attempts: i64 = row.get(6)?;
        let sync_attempts = u32::try_from(attempts)
            .map_err(|_| Error::Database(format!("invalid sync attempt count: {attempts}")))?;

        Ok(ScanRecord {
            id,
            ticket_identifier: row.get(1)?,
            event_id: row.get(2)?,
            scanned_at: row.get(3)?,
            scanned_by: row.get(4)?,
            synced: row.get::<i32>(5)? != 0,
            sync_attempts,
            last_sync_attempt: row.get(7)?,
            last_error: row.get(8)?,
        })
    }

    async fn query_records(&self, sql: &str, args: impl libsql::params::IntoParams) -> Result<Vec<ScanRecord>> {
        let mut rows = self.conn.query(sql, args).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl ScanQueue for LibSqlScanQueue<'_> {
    async fn enqueue(&self, scan: NewScan) -> Result<ScanRecord> {
        let record = ScanRecord::from_scan(scan);

        self.conn
            .execute(
                "INSERT INTO scan_queue
                     (id, ticket_identifier, event_id, scanned_at, scanned_by, synced, sync_attempts)
                 VALUES (?, ?, ?, ?, ?, 0, 0)",
                params![
                    record.id.as_str(),
                    record.ticket_identifier.clone(),
                    record.event_id.clone(),
                    record.scanned_at,
                    record.scanned_by.clone(),
                ],
            )
            .await?;

        tracing::debug!(scan = %record.id, ticket = %record.ticket_identifier, "queued scan");
        Ok(record)
    }

    async fn get(&self, id: &ScanRecordId) -> Result<Option<ScanRecord>> {
        let mut rows = self
            .conn
            .query(
                &format!("SELECT {RECORD_COLUMNS} FROM scan_queue WHERE id = ?"),
                params![id.as_str()],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_record(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_all(&self) -> Result<Vec<ScanRecord>> {
        self.query_records(
            &format!("SELECT {RECORD_COLUMNS} FROM scan_queue ORDER BY seq ASC"),
            (),
        )
        .await
    }

    async fn pending(&self, max_attempts: u32) -> Result<Vec<ScanRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM scan_queue
                 WHERE synced = 0 AND sync_attempts < ?
                 ORDER BY seq ASC"
            ),
            params![i64::from(max_attempts)],
        )
        .await
    }

    async fn pending_count(&self) -> Result<u64> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM scan_queue WHERE synced = 0", ())
            .await?;

        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn exhausted(&self, max_attempts: u32) -> Result<Vec<ScanRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM scan_queue
                 WHERE synced = 0 AND sync_attempts >= ?
                 ORDER BY seq ASC"
            ),
            params![i64::from(max_attempts)],
        )
        .await
    }

    async fn mark_synced(&self, id: &ScanRecordId) -> Result<()> {
        // Idempotent: no-op when already synced or the id is unknown
        self.conn
            .execute(
                "UPDATE scan_queue SET synced = 1 WHERE id = ?",
                params![id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn mark_sync_failed(&self, id: &ScanRecordId, error: &str) -> Result<()> {
        let now = chrono::Utc::now().timestamp_millis();
        self.conn
            .execute(
                "UPDATE scan_queue
                 SET sync_attempts = sync_attempts + 1,
                     last_sync_attempt = ?,
                     last_error = ?
                 WHERE id = ? AND synced = 0",
                params![now, error, id.as_str()],
            )
            .await?;
        Ok(())
    }

    async fn requeue(&self, id: &ScanRecordId) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE scan_queue
                 SET sync_attempts = 0, last_error = NULL
                 WHERE id = ? AND synced = 0",
                params![id.as_str()],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        tracing::info!(scan = %id, "requeued scan for sync");
        Ok(())
    }

    async fn cleanup(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now().timestamp_millis() - SYNCED_RETENTION_MS;
        let deleted = self
            .conn
            .execute(
                "DELETE FROM scan_queue WHERE synced = 1 AND scanned_at < ?",
                params![cutoff],
            )
            .await?;

        if deleted > 0 {
            tracing::debug!(deleted, "cleaned up settled scan records");
        }
        Ok(deleted)
    }
}
