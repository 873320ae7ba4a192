//! Gatecheck CLI - a gate device in your terminal
//!
//! Scans tickets against a hosted check-in endpoint or an embedded local
//! ledger, queues everything durably, and syncs when connected.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use gatecheck_core::connectivity::ConnectivityMonitor;
use gatecheck_core::db::{Database, LibSqlTicketLedger, TicketLedger};
use gatecheck_core::models::{CheckInId, ScanStatus, Ticket, TicketStatus};
use gatecheck_core::sync::{CheckInEndpoint, HttpCheckInEndpoint, LedgerEndpoint, SyncEngine};
use gatecheck_core::{CheckInService, ScanRecordId};
use tokio::sync::Mutex;

use crate::error::CliError;

mod error;
#[cfg(test)]
mod tests;

#[derive(Parser)]
#[command(name = "gatecheck")]
#[command(about = "Scan tickets at the gate, with or without a connection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Optional path to the local device database file
    #[arg(long, value_name = "PATH")]
    db_path: Option<PathBuf>,

    /// Base URL of the hosted check-in endpoint; omit to run against the
    /// embedded ledger
    #[arg(long, value_name = "URL", env = "GATECHECK_ENDPOINT")]
    endpoint: Option<String>,

    /// Optional path to the embedded ledger database
    #[arg(long, value_name = "PATH")]
    ledger_path: Option<PathBuf>,

    /// Treat the device as offline: scans are queued, not pushed
    #[arg(long)]
    offline: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan or manually enter a ticket identifier
    Scan {
        /// Raw ticket identifier (ticket number or QR payload)
        identifier: String,
        /// Event being checked into
        #[arg(long, value_name = "EVENT")]
        event: String,
        /// Staff member or device id performing the scan
        #[arg(long, value_name = "STAFF")]
        staff: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push queued scans to the authority now
    Sync,
    /// Show pending and exhausted scan counts
    Status,
    /// Show the local scan queue
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Put an exhausted scan back into automatic sync
    Requeue {
        /// Scan record id
        id: String,
    },
    /// Run the automatic sync loop until interrupted
    Watch {
        /// Periodic sync interval in seconds
        #[arg(long, default_value = "300")]
        interval_secs: u64,
    },
    /// Operate directly on the authoritative ledger
    #[command(subcommand)]
    Ledger(LedgerCommands),
}

#[derive(Subcommand)]
enum LedgerCommands {
    /// Insert a ticket into the ticket store
    SeedTicket {
        /// Ticket number (also the QR payload)
        number: String,
        /// Event the ticket admits to
        #[arg(long, value_name = "EVENT")]
        event: String,
        /// Explicit ticket id (defaults to the ticket number)
        #[arg(long, value_name = "ID")]
        id: Option<String>,
        /// Attendee name
        #[arg(long, value_name = "NAME")]
        attendee: Option<String>,
        /// Attendee email
        #[arg(long, value_name = "EMAIL")]
        email: Option<String>,
        /// Tier name
        #[arg(long, value_name = "TIER")]
        tier: Option<String>,
    },
    /// Flag a completed check-in for review
    Flag {
        /// Check-in id
        id: String,
        /// Issue description
        #[arg(long, value_name = "TEXT")]
        reason: String,
    },
    /// Resolve a flagged check-in back to completed
    Resolve {
        /// Check-in id
        id: String,
    },
    /// Check-in totals for an event
    Stats {
        /// Event id
        #[arg(long, value_name = "EVENT")]
        event: String,
    },
    /// List check-ins for an event, newest first
    List {
        /// Event id
        #[arg(long, value_name = "EVENT")]
        event: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("gatecheck=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();
    let device_path = resolve_device_path(cli.db_path);
    let ledger_path = resolve_ledger_path(cli.ledger_path);

    if let Commands::Ledger(command) = cli.command {
        return run_ledger_command(command, &ledger_path).await;
    }

    let monitor = ConnectivityMonitor::new(!cli.offline);
    match cli.endpoint {
        Some(url) => {
            let engine = SyncEngine::new(HttpCheckInEndpoint::new(url)?);
            let service = CheckInService::open_path(&device_path, engine, monitor).await?;
            run_device_command(cli.command, service).await
        }
        None => {
            let ledger_db = Arc::new(Mutex::new(Database::open(&ledger_path).await?));
            let engine = SyncEngine::new(LedgerEndpoint::new(ledger_db));
            let service = CheckInService::open_path(&device_path, engine, monitor).await?;
            run_device_command(cli.command, service).await
        }
    }
}

async fn run_device_command<E: CheckInEndpoint>(
    command: Commands,
    service: CheckInService<E>,
) -> Result<(), CliError> {
    match command {
        Commands::Scan {
            identifier,
            event,
            staff,
            json,
        } => run_scan(&service, &identifier, &event, &staff, json).await,
        Commands::Sync => run_sync(&service).await,
        Commands::Status => run_status(&service).await,
        Commands::Queue { json } => run_queue(&service, json).await,
        Commands::Requeue { id } => run_requeue(&service, &id).await,
        Commands::Watch { interval_secs } => {
            println!(
                "Watching for connectivity and syncing every {interval_secs}s (Ctrl-C to stop)"
            );
            gatecheck_core::connectivity::run_sync_loop(
                service,
                Duration::from_secs(interval_secs),
            )
            .await;
            Ok(())
        }
        Commands::Ledger(_) => unreachable!("ledger commands are handled in run()"),
    }
}

async fn run_scan<E: CheckInEndpoint>(
    service: &CheckInService<E>,
    identifier: &str,
    event: &str,
    staff: &str,
    as_json: bool,
) -> Result<(), CliError> {
    if identifier.trim().is_empty() {
        return Err(CliError::EmptyIdentifier);
    }

    let outcome = service.submit_scan(identifier, event, staff).await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
        return Ok(());
    }

    match outcome.status {
        ScanStatus::Completed => match outcome.attendee_name {
            Some(name) => println!("Checked in: {name}"),
            None => println!("Checked in"),
        },
        ScanStatus::Duplicate => println!("Already checked in"),
        ScanStatus::Invalid => println!("Invalid ticket"),
        ScanStatus::Deferred => println!("Recorded offline; will sync when connected"),
    }

    let pending = service.pending_count().await?;
    if pending > 0 {
        println!("{pending} scan(s) pending sync");
    }
    Ok(())
}

async fn run_sync<E: CheckInEndpoint>(service: &CheckInService<E>) -> Result<(), CliError> {
    let summary = service.sync_all().await?;
    println!(
        "Sync complete: {} settled, {} failed",
        summary.synced, summary.failed
    );
    for failure in &summary.errors {
        println!("  {}: {}", failure.id, failure.error);
    }
    Ok(())
}

async fn run_status<E: CheckInEndpoint>(service: &CheckInService<E>) -> Result<(), CliError> {
    let pending = service.pending_count().await?;
    let exhausted = service.exhausted_records().await?;
    println!("Pending sync: {pending}");
    println!("Needs operator action: {}", exhausted.len());
    for record in &exhausted {
        println!(
            "  {} {} ({} attempts, last error: {})",
            record.id,
            record.ticket_identifier,
            record.sync_attempts,
            record.last_error.as_deref().unwrap_or("unknown")
        );
    }
    Ok(())
}

async fn run_queue<E: CheckInEndpoint>(
    service: &CheckInService<E>,
    as_json: bool,
) -> Result<(), CliError> {
    let records = service.queue_snapshot().await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Scan queue is empty.");
        return Ok(());
    }

    for record in &records {
        let state = if record.synced { "synced" } else { "pending" };
        println!(
            "{} {} event={} at={} by={} [{}] attempts={}",
            record.id,
            record.ticket_identifier,
            record.event_id,
            format_timestamp(record.scanned_at),
            record.scanned_by,
            state,
            record.sync_attempts,
        );
    }
    Ok(())
}

async fn run_requeue<E: CheckInEndpoint>(
    service: &CheckInService<E>,
    id: &str,
) -> Result<(), CliError> {
    let id: ScanRecordId = id
        .parse()
        .map_err(|_| CliError::InvalidScanId(id.to_string()))?;
    service.requeue(&id).await?;
    println!("Requeued {id} for sync");
    Ok(())
}

async fn run_ledger_command(command: LedgerCommands, ledger_path: &Path) -> Result<(), CliError> {
    if let Some(parent) = ledger_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = Database::open(ledger_path).await?;
    let ledger = LibSqlTicketLedger::new(db.connection());

    match command {
        LedgerCommands::SeedTicket {
            number,
            event,
            id,
            attendee,
            email,
            tier,
        } => {
            let ticket = Ticket {
                id: id.unwrap_or_else(|| number.clone()),
                event_id: event,
                ticket_number: number,
                status: TicketStatus::Active,
                attendee_name: attendee,
                attendee_email: email,
                tier,
            };
            ledger.insert_ticket(&ticket).await?;
            println!("Seeded ticket {} for event {}", ticket.ticket_number, ticket.event_id);
        }
        LedgerCommands::Flag { id, reason } => {
            let id = parse_check_in_id(&id)?;
            let check_in = ledger.flag_check_in(&id, &reason).await?;
            println!("Flagged check-in {} ({})", check_in.id, check_in.status);
        }
        LedgerCommands::Resolve { id } => {
            let id = parse_check_in_id(&id)?;
            let check_in = ledger.resolve_check_in_issue(&id).await?;
            println!("Resolved check-in {} ({})", check_in.id, check_in.status);
        }
        LedgerCommands::Stats { event } => {
            let stats = ledger.check_in_stats(&event).await?;
            println!("Tickets:   {}", stats.total_tickets);
            println!("Completed: {}", stats.completed);
            println!("Flagged:   {}", stats.flagged);
            println!("Rate:      {:.1}%", stats.check_in_rate);
        }
        LedgerCommands::List { event, json } => {
            let check_ins = ledger.list_check_ins(&event).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&check_ins)?);
            } else if check_ins.is_empty() {
                println!("No check-ins recorded for {event}.");
            } else {
                for check_in in &check_ins {
                    println!(
                        "{} {} ticket={} by={} at={}",
                        check_in.id,
                        check_in.status,
                        check_in.ticket_id,
                        check_in.checked_in_by,
                        format_timestamp(check_in.checked_in_at),
                    );
                }
            }
        }
    }
    Ok(())
}

fn parse_check_in_id(raw: &str) -> Result<CheckInId, CliError> {
    raw.parse()
        .map_err(|_| CliError::InvalidCheckInId(raw.to_string()))
}

fn format_timestamp(unix_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(unix_ms)
        .map_or_else(|| unix_ms.to_string(), |dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn resolve_device_path(override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| default_data_dir().join("device.db"))
}

fn resolve_ledger_path(override_path: Option<PathBuf>) -> PathBuf {
    override_path.unwrap_or_else(|| default_data_dir().join("ledger.db"))
}

fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("gatecheck")
}
