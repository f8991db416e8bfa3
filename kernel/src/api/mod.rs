//! REST API of the Ephemera daemon.

pub mod session;

pub use session::ApiError;
pub use session::routes;
