use serde::Serialize;
use tracing::{info, info_span};

/// Domain event for audit logging.
/// Structured for JSON serialization to enable machine-readable audit trails.
#[derive(Debug, Serialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// The daemon started.
    SystemStartup {
        /// Component that started.
        component: String,
    },
    /// The daemon is shutting down.
    SystemShutdown {
        /// Why.
        reason: String,
    },
    /// A session reached Active.
    SessionStarted {
        /// Session id.
        session_id: String,
        /// Redirection variant in use.
        backend: String,
        /// Redirected folders.
        folders: Vec<String>,
    },
    /// A session start was aborted and rolled back.
    SessionStartFailed {
        /// Session id.
        session_id: String,
        /// Folder that failed, if the failure was folder specific.
        folder: Option<String>,
        /// Failure description.
        reason: String,
    },
    /// A session was torn down.
    SessionStopped {
        /// Session id.
        session_id: String,
        /// Number of cleanup warnings.
        warnings: usize,
    },
    /// A privileged command ran (or was refused).
    PrivilegedCommand {
        /// Short description of the command.
        command: String,
        /// `succeeded`, `declined` or `failed: ...`.
        outcome: String,
    },
    /// Residue from an earlier process was cleaned up at startup.
    ArtifactsRecovered {
        /// Warnings raised while recovering.
        warnings: usize,
    },
}

/// Logs an audit event to the dedicated audit channel as structured JSON.
/// This uses a specific `target` which can be filtered by the subscriber to redirect to a secure file.
pub fn log_audit(event: &AuditEvent) {
    let span = info_span!(target: "audit", "audit_event");
    let _enter = span.enter();

    let json = serde_json::to_string(event).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"));
    info!(target: "audit", audit_json = %json, "Audit event");
}
