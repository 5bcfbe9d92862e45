//! Dual listener server: plaintext first, TLS once the database is ready.

pub mod listener;
pub mod orchestrator;
pub mod tls;

pub use listener::{Binder, TcpBinder};
pub use orchestrator::Startup;
