//! HTTP API module: version, organizers, sessions, health and metrics.

pub mod handlers;
pub mod routes;

pub use handlers::{AppState, FatalReceiver};
pub use routes::create_router;
