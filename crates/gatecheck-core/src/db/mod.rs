//! Database layer for Gatecheck

mod connection;
mod ledger;
mod migrations;
mod scan_queue;

pub use connection::Database;
pub use ledger::{ClaimOutcome, LibSqlTicketLedger, TicketLedger};
pub use scan_queue::{LibSqlScanQueue, ScanQueue, SYNCED_RETENTION_MS};
