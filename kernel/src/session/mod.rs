//! Session lifecycle.
//!
//! One [`SessionManager`] per process owns the single session and moves it
//! through `Idle -> Starting -> Active -> Stopping -> Idle`, with `Failed`
//! reachable from Starting and Stopping.

pub mod manager;
pub mod state;
pub mod types;

pub use manager::{SessionManager, SessionOptions};
pub use state::validate_transition;
pub use types::{
    Session, SessionError, SessionStatus, StartError, StartOutcome, StopError, StopOutcome,
};
