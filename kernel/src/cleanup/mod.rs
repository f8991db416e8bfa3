//! Teardown pipeline.
//!
//! Steps run in a fixed order and each yields a [`StepOutcome`]. Nothing
//! short-circuits: a failing step becomes a warning in the
//! [`CleanupReport`] and the next step still runs.

pub mod browser;
pub mod purge;
pub mod report;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::isolation::{IsolationBackend, UserFolder};
use crate::snapshot::{RestoreOutcome, SnapshotStore};
use crate::tracker::ChangeTracker;

pub use browser::{Browser, BrowserFamily, FileRemover, FsRemover};
pub use report::{CleanupReport, CleanupStep, StepOutcome, StepRecord};

/// What the coordinator scrubs and purges besides the backend and snapshot.
#[derive(Debug, Clone)]
pub struct CleanupPlan {
    /// Browsers to scrub; empty disables the step.
    pub browsers: Vec<Browser>,
    /// Temp and cache locations to purge.
    pub temp_locations: Vec<PathBuf>,
    /// Recently-used list file or folder.
    pub recent_list: Option<PathBuf>,
    /// Only files modified within this window are purged.
    pub window: Duration,
    /// Private working root, excluded from purges.
    pub working_root: PathBuf,
}

/// The blocking part of a cleanup run panicked.
#[derive(Debug, Error)]
#[error("Cleanup task aborted: {0}")]
pub struct CleanupAborted(#[from] tokio::task::JoinError);

/// Runs the teardown pipeline.
#[derive(Debug, Clone)]
pub struct CleanupCoordinator {
    backend: Arc<dyn IsolationBackend>,
    snapshot: Arc<dyn SnapshotStore>,
    remover: Arc<dyn FileRemover>,
    plan: Arc<CleanupPlan>,
}

impl CleanupCoordinator {
    /// Creates a coordinator removing files through `remover`.
    #[must_use]
    pub fn new(
        backend: Arc<dyn IsolationBackend>,
        snapshot: Arc<dyn SnapshotStore>,
        remover: Arc<dyn FileRemover>,
        plan: CleanupPlan,
    ) -> Self {
        Self {
            backend,
            snapshot,
            remover,
            plan: Arc::new(plan),
        }
    }

    /// Stops `tracker`, then restores `folders`, the snapshot, scrubs
    /// browsers and purges temp locations.
    ///
    /// # Errors
    ///
    /// Returns an error only if the blocking steps panicked.
    #[instrument(skip(self, tracker), fields(folders = folders.len()))]
    pub async fn run(
        &self,
        folders: Vec<UserFolder>,
        tracker: Option<ChangeTracker>,
    ) -> Result<CleanupReport, CleanupAborted> {
        let mut report = CleanupReport::new();

        let stopped = match tracker {
            None => StepOutcome::Skipped("not running".to_string()),
            Some(tracker) => match tracker.stop().await {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) => StepOutcome::Warning(e.to_string()),
            },
        };
        report.record(CleanupStep::StopTracker, stopped);

        let this = self.clone();
        let report = tokio::task::spawn_blocking(move || {
            this.run_blocking(&folders, &mut report);
            report
        })
        .await?;

        metrics::counter!("ephemera_cleanup_runs_total").increment(1);
        metrics::counter!("ephemera_cleanup_warnings_total").increment(report.warning_count() as u64);
        info!(summary = %report.summary(), "Cleanup finished");
        Ok(report)
    }

    /// Restores `folders` and the snapshot only. Used for crash recovery,
    /// where no session ran in this process.
    ///
    /// # Errors
    ///
    /// Returns an error only if the blocking steps panicked.
    #[instrument(skip(self), fields(folders = folders.len()))]
    pub async fn recover(&self, folders: Vec<UserFolder>) -> Result<CleanupReport, CleanupAborted> {
        let this = self.clone();
        let report = tokio::task::spawn_blocking(move || {
            let mut report = CleanupReport::new();
            this.restore_steps(&folders, &mut report);
            report
        })
        .await?;
        info!(summary = %report.summary(), "Recovery finished");
        Ok(report)
    }

    fn run_blocking(&self, folders: &[UserFolder], report: &mut CleanupReport) {
        self.restore_steps(folders, report);
        self.scrub_steps(report);
    }

    fn restore_steps(&self, folders: &[UserFolder], report: &mut CleanupReport) {
        for &folder in folders {
            let outcome = match self.backend.restore(folder) {
                Ok(()) => StepOutcome::Succeeded,
                Err(e) => {
                    warn!(%folder, error = %e, "Restore failed");
                    StepOutcome::Warning(e.to_string())
                }
            };
            report.record(CleanupStep::Restore(folder), outcome);
        }

        let outcome = match self.snapshot.restore() {
            Ok(RestoreOutcome::Restored(_)) => StepOutcome::Succeeded,
            Ok(RestoreOutcome::NothingToRestore) => {
                StepOutcome::Skipped("no snapshot".to_string())
            }
            Err(e) => {
                warn!(error = %e, "Snapshot restore failed");
                StepOutcome::Warning(e.to_string())
            }
        };
        report.record(CleanupStep::SnapshotRestore, outcome);
    }

    fn scrub_steps(&self, report: &mut CleanupReport) {
        for browser in &self.plan.browsers {
            let outcome = browser.scrub(self.remover.as_ref());
            report.record(CleanupStep::BrowserScrub(browser.name.clone()), outcome);
        }

        info!(since = %purge::cutoff(self.plan.window), "Purging recent temp files");
        for location in &self.plan.temp_locations {
            let outcome = purge::purge_recent(
                location,
                self.plan.window,
                Some(&self.plan.working_root),
                self.remover.as_ref(),
            );
            report.record(CleanupStep::TempPurge(location.clone()), outcome);
        }

        let outcome = match &self.plan.recent_list {
            Some(path) => purge::reset_recent_list(path, self.plan.window, self.remover.as_ref()),
            None => StepOutcome::Skipped("not configured".to_string()),
        };
        report.record(CleanupStep::RecentList, outcome);
    }
}
