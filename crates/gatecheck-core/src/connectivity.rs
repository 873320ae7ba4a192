//! Connectivity monitoring and sync scheduling
//!
//! The host environment owns the actual connectivity signal (OS callbacks,
//! reachability probes, a toggle in a simulator); it reports transitions
//! through `ConnectivityMonitor` and the sync loop reacts.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::service::CheckInService;
use crate::sync::CheckInEndpoint;

/// Default periodic sync interval (catches missed transitions and retries
/// previously failed records)
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Two-state online/offline signal, cloneable across tasks
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    /// Create a monitor with the given initial state
    #[must_use]
    pub fn new(initially_online: bool) -> Self {
        let (tx, _rx) = watch::channel(initially_online);
        Self { tx: Arc::new(tx) }
    }

    /// Current state
    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Report a state change from the host's connectivity signal.
    /// No-op (no notification) when the state is unchanged.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(online, "connectivity changed");
        }
    }

    /// Subscribe to state transitions
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for ConnectivityMonitor {
    fn default() -> Self {
        Self::new(true)
    }
}

/// Drive automatic sync for a device service:
/// one immediate pass on start when online, one on every offline-to-online
/// transition, and one per timer interval while online.
///
/// Runs until the monitor is dropped. Sync failures are logged, not fatal;
/// failed records stay queued for the next pass.
pub async fn run_sync_loop<E: CheckInEndpoint>(
    service: CheckInService<E>,
    interval: Duration,
) {
    let monitor = service.connectivity().clone();
    let mut transitions = monitor.subscribe();
    transitions.mark_unchanged();

    if monitor.is_online() {
        sync_quietly(&service).await;
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick of a fresh interval fires immediately; the start pass
    // above already covered it
    ticker.tick().await;

    loop {
        tokio::select! {
            changed = transitions.changed() => {
                if changed.is_err() {
                    // All senders gone; the device is shutting down
                    return;
                }
                let online = *transitions.borrow_and_update();
                if online {
                    tracing::info!("connection restored, syncing queued scans");
                    sync_quietly(&service).await;
                }
            }
            _ = ticker.tick() => {
                if monitor.is_online() {
                    sync_quietly(&service).await;
                }
            }
        }
    }
}

async fn sync_quietly<E: CheckInEndpoint>(service: &CheckInService<E>) {
    if let Err(e) = service.sync_all().await {
        tracing::error!(error = %e, "automatic sync pass failed");
    }
}
