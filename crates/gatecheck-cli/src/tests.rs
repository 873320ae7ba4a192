use std::sync::Arc;

use clap::CommandFactory;
use gatecheck_core::connectivity::ConnectivityMonitor;
use gatecheck_core::db::Database;
use gatecheck_core::sync::{LedgerEndpoint, SyncEngine};
use gatecheck_core::CheckInService;
use tokio::sync::Mutex;

use crate::error::CliError;
use crate::{run_device_command, run_ledger_command, Cli, Commands, LedgerCommands};

#[test]
fn test_cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_scan_against_embedded_ledger() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger_path = tmp.path().join("ledger.db");
    let device_path = tmp.path().join("device.db");

    run_ledger_command(
        LedgerCommands::SeedTicket {
            number: "TKT-1".to_string(),
            event: "evt-1".to_string(),
            id: None,
            attendee: Some("Ada Lovelace".to_string()),
            email: None,
            tier: None,
        },
        &ledger_path,
    )
    .await
    .unwrap();

    let ledger_db = Arc::new(Mutex::new(Database::open(&ledger_path).await.unwrap()));
    let engine = SyncEngine::new(LedgerEndpoint::new(ledger_db));
    let service = CheckInService::open_path(&device_path, engine, ConnectivityMonitor::new(true))
        .await
        .unwrap();

    run_device_command(
        Commands::Scan {
            identifier: "TKT-1".to_string(),
            event: "evt-1".to_string(),
            staff: "staff-1".to_string(),
            json: true,
        },
        service.clone(),
    )
    .await
    .unwrap();
    assert_eq!(service.pending_count().await.unwrap(), 0);

    // Stats come from the same ledger file the scan settled into
    run_ledger_command(
        LedgerCommands::Stats {
            event: "evt-1".to_string(),
        },
        &ledger_path,
    )
    .await
    .unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_requeue_rejects_malformed_id() {
    let tmp = tempfile::tempdir().unwrap();
    let ledger_db = Arc::new(Mutex::new(Database::open_in_memory().await.unwrap()));
    let service = CheckInService::open_path(
        tmp.path().join("device.db"),
        SyncEngine::new(LedgerEndpoint::new(ledger_db)),
        ConnectivityMonitor::new(false),
    )
    .await
    .unwrap();

    let result = run_device_command(
        Commands::Requeue {
            id: "not-a-uuid".to_string(),
        },
        service,
    )
    .await;
    assert!(matches!(result, Err(CliError::InvalidScanId(_))));
}
