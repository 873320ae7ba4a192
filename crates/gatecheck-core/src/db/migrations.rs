//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }
    if version < 2 {
        migrate_v2(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    // Check if schema_version table exists
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Migration to version 1: local scan queue
async fn migrate_v1(conn: &Connection) -> Result<()> {
    // libsql doesn't have execute_batch, so we run each statement separately
    // Using a transaction for atomicity

    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        // Durable scan queue; seq preserves insertion order for replay.
        // Identity columns never change after insert, only the sync
        // bookkeeping columns do.
        "CREATE TABLE IF NOT EXISTS scan_queue (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            id TEXT NOT NULL UNIQUE,
            ticket_identifier TEXT NOT NULL,
            event_id TEXT NOT NULL,
            scanned_at INTEGER NOT NULL,
            scanned_by TEXT NOT NULL,
            synced INTEGER NOT NULL DEFAULT 0,
            sync_attempts INTEGER NOT NULL DEFAULT 0,
            last_sync_attempt INTEGER,
            last_error TEXT
        )",
        "CREATE INDEX IF NOT EXISTS idx_scan_queue_synced ON scan_queue(synced)",
        "CREATE INDEX IF NOT EXISTS idx_scan_queue_scanned_at ON scan_queue(scanned_at)",
        // Record migration version
        "INSERT INTO schema_version (version) VALUES (1)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version 1");
    Ok(())
}

/// Migration to version 2: embedded authority tables (tickets + ledger)
async fn migrate_v2(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let statements = [
        "CREATE TABLE IF NOT EXISTS tickets (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL,
            ticket_number TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'active',
            attendee_name TEXT,
            attendee_email TEXT,
            tier TEXT,
            UNIQUE (event_id, ticket_number)
        )",
        "CREATE INDEX IF NOT EXISTS idx_tickets_event ON tickets(event_id)",
        // The UNIQUE(ticket_id, event_id) index is what makes concurrent
        // scans of the same ticket yield exactly one completed check-in;
        // the classifier must not rely on check-then-act alone.
        "CREATE TABLE IF NOT EXISTS check_ins (
            id TEXT PRIMARY KEY,
            ticket_id TEXT NOT NULL REFERENCES tickets(id),
            event_id TEXT NOT NULL,
            status TEXT NOT NULL,
            attendee_name TEXT,
            attendee_email TEXT,
            ticket_tier TEXT,
            checked_in_by TEXT NOT NULL,
            checked_in_at INTEGER NOT NULL,
            issue_description TEXT,
            UNIQUE (ticket_id, event_id)
        )",
        "CREATE INDEX IF NOT EXISTS idx_check_ins_event ON check_ins(event_id)",
        "CREATE INDEX IF NOT EXISTS idx_check_ins_checked_in_at ON check_ins(checked_in_at DESC)",
        "INSERT INTO schema_version (version) VALUES (2)",
    ];

    for stmt in statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}
