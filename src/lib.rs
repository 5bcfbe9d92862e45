//! Abstractions conference API.
//!
//! Serves relational data as JSON and brings itself to a ready state against
//! a database that may still be starting up.
//!
//! # Startup
//!
//! ```text
//! plaintext listener (spawned) ─┐
//!                               ├─ /version, /healthz available at once
//! connection gate ──► migrations ──► TLS listener (blocks until fatal error)
//! ```
//!
//! # Modules
//!
//! - [`config`]: Listener flags and `DATABASE_*` environment settings
//! - [`error`]: Unified error types
//! - [`db`]: Query-to-JSON serialization and the connection gate
//! - [`migrations`]: Versioned schema migrations
//! - [`server`]: Plaintext and TLS listeners, startup ordering
//! - [`api`]: HTTP routes
//! - [`health`]: Health check payload
//! - [`metrics`]: Prometheus metrics

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod health;
pub mod metrics;
pub mod migrations;
pub mod server;

pub use config::{DatabaseConfig, ServerConfig};
pub use error::{GateError, MigrationError, QueryError, StartupError};
