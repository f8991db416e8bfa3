//! The single owner of session state.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, watch};
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use super::state::{is_live, validate_transition};
use super::types::{
    Session, SessionError, SessionStatus, StartError, StartOutcome, StopError, StopOutcome,
};
use crate::cleanup::{CleanupCoordinator, CleanupReport};
use crate::infrastructure::audit::{AuditEvent, log_audit};
use crate::isolation::{IsolationBackend, MountRecord, Surface, UserFolder, catalog};
use crate::snapshot::SnapshotStore;
use crate::tracker::{ChangeTracker, FileInventory, InventorySender};
use crate::ws::{Broadcaster, SessionEvent};

/// Tunables of a [`SessionManager`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Folders to isolate; empty means the whole catalog.
    pub folders: Vec<UserFolder>,
    /// Change tracker polling period.
    pub poll_interval: Duration,
}

/// Owns the session, serialises start and stop, and publishes state.
///
/// State lives behind a `parking_lot` lock that is never held across an
/// await; the start and stop pipelines are serialised by an async lifecycle
/// lock that also owns the running change tracker.
#[derive(Debug)]
pub struct SessionManager {
    backend: Arc<dyn IsolationBackend>,
    snapshot: Arc<dyn SnapshotStore>,
    cleanup: CleanupCoordinator,
    broadcaster: Broadcaster,
    folders: Vec<UserFolder>,
    poll_interval: Duration,
    session: RwLock<Session>,
    lifecycle: Mutex<Option<ChangeTracker>>,
    inventory: InventorySender,
}

impl SessionManager {
    /// Creates an Idle manager.
    #[must_use]
    pub fn new(
        backend: Arc<dyn IsolationBackend>,
        snapshot: Arc<dyn SnapshotStore>,
        cleanup: CleanupCoordinator,
        broadcaster: Broadcaster,
        options: SessionOptions,
    ) -> Self {
        let (inventory, _) = watch::channel(Arc::new(FileInventory::default()));
        Self {
            session: RwLock::new(Session::idle(backend.kind())),
            backend,
            snapshot,
            cleanup,
            broadcaster,
            folders: catalog::normalize(&options.folders),
            poll_interval: options.poll_interval,
            lifecycle: Mutex::new(None),
            inventory: Arc::new(inventory),
        }
    }

    /// Copy of the session.
    #[must_use]
    pub fn session(&self) -> Session {
        self.session.read().clone()
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.session.read().status
    }

    /// Returns `true` if a session is Active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.status() == SessionStatus::Active
    }

    /// Latest published inventory.
    #[must_use]
    pub fn current_inventory(&self) -> Arc<FileInventory> {
        Arc::clone(&self.inventory.borrow())
    }

    /// Receiver notified on every published inventory.
    #[must_use]
    pub fn subscribe_inventory(&self) -> watch::Receiver<Arc<FileInventory>> {
        self.inventory.subscribe()
    }

    /// Event broadcaster shared with the control plane.
    #[must_use]
    pub fn broadcaster(&self) -> &Broadcaster {
        &self.broadcaster
    }

    /// Where each configured folder is written and tracked.
    #[must_use]
    pub fn surfaces(&self) -> Vec<Surface> {
        self.folders
            .iter()
            .map(|&folder| self.backend.surface(folder))
            .collect()
    }

    /// Records currently held by the isolation backend.
    #[must_use]
    pub fn mount_records(&self) -> Vec<MountRecord> {
        self.backend.records()
    }

    /// Moves to `to` if the transition is valid and announces it.
    fn transition(&self, to: SessionStatus) -> Result<Uuid, SessionError> {
        let id = {
            let mut session = self.session.write();
            validate_transition(session.status, to)?;
            session.status = to;
            session.id
        };
        self.broadcaster
            .publish(SessionEvent::StatusChanged { session_id: id, status: to });
        Ok(id)
    }

    /// Starts a session: redirect every folder, capture the snapshot, start
    /// the tracker. A session that is Starting or Active is left untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if a stop is running or any start step failed; in
    /// the latter case everything done so far was rolled back and the
    /// session is Failed.
    #[instrument(skip(self))]
    pub async fn start_session(&self) -> Result<StartOutcome, StartError> {
        if let Some(early) = self.precheck_start() {
            return early;
        }
        let mut tracker_slot = self.lifecycle.lock().await;

        let id = {
            let mut session = self.session.write();
            if is_live(session.status) {
                return Ok(StartOutcome::AlreadyActive);
            }
            if session.status == SessionStatus::Stopping {
                return Err(StartError::StopInProgress);
            }
            validate_transition(session.status, SessionStatus::Starting)?;
            session.id = Uuid::new_v4();
            session.status = SessionStatus::Starting;
            session.started_at = None;
            session.redirected_paths.clear();
            session.id
        };
        self.broadcaster.publish(SessionEvent::StatusChanged {
            session_id: id,
            status: SessionStatus::Starting,
        });
        info!(session_id = %id, folders = self.folders.len(), "Starting session");

        match self.run_start(id).await {
            Ok(tracker) => {
                *tracker_slot = Some(tracker);
                {
                    let mut session = self.session.write();
                    session.started_at = Some(Utc::now());
                    session.redirected_paths.clone_from(&self.folders);
                }
                self.transition(SessionStatus::Active)?;
                metrics::counter!("ephemera_sessions_started_total").increment(1);
                log_audit(&AuditEvent::SessionStarted {
                    session_id: id.to_string(),
                    backend: self.backend.kind().to_string(),
                    folders: self.folders.iter().map(ToString::to_string).collect(),
                });
                info!(session_id = %id, "Session active");
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                self.fail_start(id, &e);
                Err(e)
            }
        }
    }

    fn precheck_start(&self) -> Option<Result<StartOutcome, StartError>> {
        match self.status() {
            SessionStatus::Starting | SessionStatus::Active => Some(Ok(StartOutcome::AlreadyActive)),
            SessionStatus::Stopping => Some(Err(StartError::StopInProgress)),
            SessionStatus::Idle | SessionStatus::Failed => None,
        }
    }

    async fn run_start(&self, id: Uuid) -> Result<ChangeTracker, StartError> {
        let backend = Arc::clone(&self.backend);
        let folders = self.folders.clone();
        let redirected = tokio::task::spawn_blocking(move || redirect_all(backend.as_ref(), &folders)).await;
        match redirected {
            Ok(result) => result?,
            Err(e) => return Err(self.abort_start(&e).await),
        }

        let snapshot = Arc::clone(&self.snapshot);
        let captured = match tokio::task::spawn_blocking(move || snapshot.capture()).await {
            Ok(captured) => captured,
            Err(e) => return Err(self.abort_start(&e).await),
        };
        if let Err(source) = captured {
            let unrestored = self.rollback_async().await;
            return Err(StartError::Snapshot { source, unrestored });
        }

        match ChangeTracker::start(
            self.surfaces(),
            self.poll_interval,
            Arc::clone(&self.inventory),
            self.broadcaster.clone(),
        ) {
            Ok(tracker) => {
                info!(session_id = %id, "Change tracker running");
                Ok(tracker)
            }
            Err(source) => {
                let unrestored = self.rollback_async().await;
                let snapshot = Arc::clone(&self.snapshot);
                if let Ok(Err(e)) = tokio::task::spawn_blocking(move || snapshot.restore()).await {
                    warn!(error = %e, "Snapshot restore after failed start did not complete");
                }
                Err(StartError::Tracker { source, unrestored })
            }
        }
    }

    /// Rolls back after a blocking start step panicked or was cancelled.
    async fn abort_start(&self, error: &tokio::task::JoinError) -> StartError {
        error!(error = %error, "Start task did not complete");
        let unrestored = self.rollback_async().await;
        StartError::Aborted {
            reason: error.to_string(),
            unrestored,
        }
    }

    async fn rollback_async(&self) -> Vec<UserFolder> {
        let backend = Arc::clone(&self.backend);
        let folders = self.folders.clone();
        match tokio::task::spawn_blocking(move || rollback(backend.as_ref(), &folders)).await {
            Ok(unrestored) => unrestored,
            Err(e) => {
                error!(error = %e, "Rollback task failed");
                self.folders.clone()
            }
        }
    }

    fn fail_start(&self, id: Uuid, error: &StartError) {
        let folder = error.folder();
        if let Err(e) = self.transition(SessionStatus::Failed) {
            error!(error = %e, "Could not record failed start");
        }
        if !error.unrestored().is_empty() {
            error!(unrestored = ?error.unrestored(), "Rollback left folders redirected");
        }
        self.broadcaster.publish(SessionEvent::SessionStartFailed {
            folder: folder.map(|f| f.to_string()),
            reason: error.to_string(),
        });
        metrics::counter!("ephemera_sessions_failed_total").increment(1);
        log_audit(&AuditEvent::SessionStartFailed {
            session_id: id.to_string(),
            folder: folder.map(|f| f.to_string()),
            reason: error.to_string(),
        });
        warn!(session_id = %id, error = %error, "Session start failed");
    }

    /// Stops the session and runs the cleanup pipeline. Waits for a start in
    /// flight to resolve first. From Failed it clears residue.
    ///
    /// # Errors
    ///
    /// Returns an error if the cleanup pipeline aborted; the session is then
    /// Failed and a later stop retries.
    #[instrument(skip(self))]
    pub async fn stop_session(&self) -> Result<StopOutcome, StopError> {
        let mut tracker_slot = self.lifecycle.lock().await;
        if self.status() == SessionStatus::Idle {
            return Ok(StopOutcome::NotRunning);
        }
        let id = self.transition(SessionStatus::Stopping)?;
        self.broadcaster.publish(SessionEvent::CleanupStarted);
        info!(session_id = %id, "Stopping session");

        let tracker = tracker_slot.take();
        match self.cleanup.run(UserFolder::ALL.to_vec(), tracker).await {
            Ok(report) => {
                self.inventory.send_replace(Arc::new(FileInventory::default()));
                {
                    let mut session = self.session.write();
                    session.redirected_paths.clear();
                    session.started_at = None;
                }
                self.broadcaster.publish(SessionEvent::CleanupCompleted {
                    summary: report.summary(),
                    warnings: report.warnings(),
                });
                self.transition(SessionStatus::Idle)?;
                log_audit(&AuditEvent::SessionStopped {
                    session_id: id.to_string(),
                    warnings: report.warning_count(),
                });
                info!(session_id = %id, summary = %report.summary(), "Session stopped");
                Ok(StopOutcome::Completed(report))
            }
            Err(e) => {
                error!(session_id = %id, error = %e, "Cleanup aborted");
                self.broadcaster.publish(SessionEvent::CleanupFailed {
                    reason: e.to_string(),
                });
                self.transition(SessionStatus::Failed)?;
                Err(StopError::Aborted(e))
            }
        }
    }

    /// Restores every catalog folder and any leftover snapshot from an
    /// earlier process. Only valid while Idle.
    ///
    /// # Errors
    ///
    /// Returns an error if a session is running or recovery aborted.
    #[instrument(skip(self))]
    pub async fn recover(&self) -> Result<CleanupReport, StopError> {
        let _guard = self.lifecycle.lock().await;
        let status = self.status();
        if status != SessionStatus::Idle {
            return Err(SessionError::InvalidTransition {
                from: status,
                to: SessionStatus::Stopping,
            }
            .into());
        }
        self.transition(SessionStatus::Stopping)?;

        match self.cleanup.recover(UserFolder::ALL.to_vec()).await {
            Ok(report) => {
                self.transition(SessionStatus::Idle)?;
                log_audit(&AuditEvent::ArtifactsRecovered {
                    warnings: report.warning_count(),
                });
                Ok(report)
            }
            Err(e) => {
                self.transition(SessionStatus::Failed)?;
                Err(StopError::Aborted(e))
            }
        }
    }
}

/// Redirects `folders` in order; on the first failure restores, in reverse
/// order, every folder redirected so far.
fn redirect_all(backend: &dyn IsolationBackend, folders: &[UserFolder]) -> Result<(), StartError> {
    let mut done = Vec::with_capacity(folders.len());
    for &folder in folders {
        match backend.redirect(folder) {
            Ok(_) => done.push(folder),
            Err(source) => {
                warn!(%folder, error = %source, redirected = done.len(), "Redirect failed, rolling back");
                let unrestored = rollback(backend, &done);
                return Err(StartError::Redirect {
                    folder,
                    source,
                    unrestored,
                });
            }
        }
    }
    Ok(())
}

/// Restores `folders` in reverse order and returns those that failed.
fn rollback(backend: &dyn IsolationBackend, folders: &[UserFolder]) -> Vec<UserFolder> {
    folders
        .iter()
        .rev()
        .filter(|&&folder| match backend.restore(folder) {
            Ok(()) => false,
            Err(e) => {
                error!(%folder, error = %e, "Rollback failed");
                true
            }
        })
        .copied()
        .collect()
}
