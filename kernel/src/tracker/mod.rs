//! Polling change tracker.
//!
//! A [`ChangeTracker`] owns one tokio task that rescans the tracked roots on a
//! fixed period and publishes the inventory only when it changed. Scans run
//! on the blocking pool and are awaited inside the loop, so two scans never
//! overlap and [`ChangeTracker::stop`] also waits for an in-flight scan.

pub mod scan;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::isolation::Surface;
use crate::ws::{BroadcastMessage, Broadcaster, SessionEvent};

pub use scan::scan_surfaces;
pub use types::{FileInventory, TrackedFile};

/// Default polling period.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Shared handle to the current inventory.
pub type InventorySender = Arc<watch::Sender<Arc<FileInventory>>>;

/// Errors raised by the tracker task.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// A zero polling period was configured.
    #[error("Poll interval must be greater than zero")]
    ZeroInterval,
    /// The tracker task panicked.
    #[error("Tracker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Handle to a running tracker task.
#[derive(Debug)]
pub struct ChangeTracker {
    stop_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl ChangeTracker {
    /// Spawns the polling task. The first scan runs immediately.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ZeroInterval`] if `period` is zero.
    pub fn start(
        surfaces: Vec<Surface>,
        period: Duration,
        inventory: InventorySender,
        broadcaster: Broadcaster,
    ) -> Result<Self, TrackerError> {
        if period.is_zero() {
            return Err(TrackerError::ZeroInterval);
        }
        let (stop_tx, stop_rx) = oneshot::channel();
        let surfaces = Arc::new(surfaces);
        info!(roots = surfaces.len(), period_ms = period.as_millis(), "Change tracker started");
        let handle = tokio::spawn(poll_loop(surfaces, period, inventory, broadcaster, stop_rx));
        Ok(Self { stop_tx, handle })
    }

    /// Signals the task to stop and waits for it, including any scan in flight.
    ///
    /// # Errors
    ///
    /// Returns an error if the task panicked.
    pub async fn stop(self) -> Result<(), TrackerError> {
        let _ = self.stop_tx.send(());
        self.handle.await?;
        info!("Change tracker stopped");
        Ok(())
    }
}

async fn poll_loop(
    surfaces: Arc<Vec<Surface>>,
    period: Duration,
    inventory: InventorySender,
    broadcaster: Broadcaster,
    mut stop_rx: oneshot::Receiver<()>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            _ = &mut stop_rx => break,
            _ = ticker.tick() => {
                let roots = Arc::clone(&surfaces);
                let started = Instant::now();
                let scanned = match tokio::task::spawn_blocking(move || scan_surfaces(&roots)).await {
                    Ok(scanned) => scanned,
                    Err(e) => {
                        warn!(error = %e, "Scan task failed");
                        continue;
                    }
                };
                metrics::histogram!("ephemera_tracker_scan_seconds")
                    .record(started.elapsed().as_secs_f64());

                // A stop requested during the walk wins over publishing.
                if !matches!(stop_rx.try_recv(), Err(oneshot::error::TryRecvError::Empty)) {
                    break;
                }
                publish(&inventory, &broadcaster, scanned);
            }
        }
    }
    debug!("Poll loop exited");
}

/// Replaces the current inventory if `scanned` differs from it and
/// broadcasts the change. Returns `true` if anything was published.
pub(crate) fn publish(
    inventory: &watch::Sender<Arc<FileInventory>>,
    broadcaster: &Broadcaster,
    scanned: FileInventory,
) -> bool {
    #[allow(clippy::cast_precision_loss)]
    metrics::gauge!("ephemera_tracked_files").set(scanned.len() as f64);

    let next = Arc::new(scanned);
    let changed = inventory.send_if_modified(|current| {
        if **current == *next {
            false
        } else {
            *current = Arc::clone(&next);
            true
        }
    });
    if changed {
        debug!(files = next.len(), "Inventory changed");
        let _ = broadcaster.broadcast(BroadcastMessage::Event(SessionEvent::InventoryChanged {
            files: next,
        }));
    }
    changed
}
