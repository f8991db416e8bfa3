//! Ephemera kernel: session isolation and cleanup engine.
//!
//! One session per host redirects a fixed catalog of user folders into a
//! private working area, tracks the files written there, and on teardown
//! restores the host to its pre-session state.

#![warn(missing_docs)]
#![warn(clippy::pedantic)]

/// REST control plane.
pub mod api;
/// Teardown pipeline and its report.
pub mod cleanup;
/// Composition root wiring settings into a running engine.
pub mod host;
/// Infrastructure components (config, server, telemetry, audit).
pub mod infrastructure;
/// Folder redirection backends and the privileged executor port.
pub mod isolation;
/// Session lifecycle state machine.
pub mod session;
/// Configuration snapshot taken before and reverted after a session.
pub mod snapshot;
/// Cloud sync of tracked files.
pub mod sync;
/// Polling change tracker and file inventory.
pub mod tracker;
/// Session event broadcaster and WebSocket fan-out.
pub mod ws;
