//! REST control plane of the single session.
//!
//! The UI collaborator starts and stops the session, reads the inventory and
//! triggers cloud sync here; lifecycle events arrive over `/ws`.

pub mod handlers;
pub mod routes;
pub mod types;

pub use handlers::ApiError;
pub use routes::routes;
pub use types::{
    FilesResponse, HealthResponse, SessionResponse, StartResponse, StartResult, StopResponse,
    SyncRequest,
};
