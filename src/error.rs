//! Error types for queries, the connection gate, migrations and startup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while turning a query into JSON.
#[derive(Error, Debug)]
pub enum QueryError {
    /// The database could not be reached or the query could not run.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A cell could not be decoded from its column type.
    #[error("failed to decode column {column}: {reason}")]
    Decode {
        /// Column name.
        column: String,
        /// Reason for failure.
        reason: String,
    },

    /// The accumulated records could not be encoded as JSON.
    #[error("failed to encode rows: {0}")]
    Encode(String),
}

/// Errors raised by the connection gate.
#[derive(Error, Debug)]
pub enum GateError {
    /// A bounded retry policy ran out of attempts.
    #[error("database still unreachable after {attempts} attempts: {last_error}")]
    Exhausted {
        /// Attempts performed.
        attempts: u32,
        /// Message of the last probe failure.
        last_error: String,
    },
}

/// A single migration failure.
#[derive(Error, Debug)]
pub enum MigrationError {
    /// The migrations directory could not be read.
    #[error("failed to read migrations directory {path}: {source}")]
    ReadDir {
        /// Directory path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A migration file could not be read.
    #[error("failed to read migration file {path}: {source}")]
    ReadFile {
        /// File path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// A file in the migrations directory has an unexpected name.
    #[error("invalid migration file name: {0}")]
    InvalidName(String),

    /// Two up migrations share a version.
    #[error("duplicate migration version {version}: {first} and {second}")]
    DuplicateVersion {
        /// Conflicting version.
        version: u64,
        /// First file name.
        first: String,
        /// Second file name.
        second: String,
    },

    /// The version tracking table could not be read or created.
    #[error("failed to read schema version: {0}")]
    VersionState(String),

    /// A migration step failed.
    #[error("migration {version} ({name}) failed: {reason}")]
    Step {
        /// Version of the failing migration.
        version: u64,
        /// Name of the failing migration.
        name: String,
        /// Reason for failure.
        reason: String,
    },
}

/// Fatal conditions that end the process.
#[derive(Error, Debug)]
pub enum StartupError {
    /// The plaintext listener could not bind.
    #[error("plaintext listener failed to bind {addr}: {source}")]
    PlaintextBind {
        /// Address that failed.
        addr: std::net::SocketAddr,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The plaintext listener stopped serving.
    #[error("plaintext listener failed: {0}")]
    PlaintextServe(String),

    /// The connection gate gave up.
    #[error("connection gate failed: {0}")]
    Gate(#[from] GateError),

    /// One or more migrations failed. Every error is kept, in order.
    #[error("{} migration error(s)", .0.len())]
    Migrations(Vec<MigrationError>),

    /// The TLS certificate or key could not be loaded.
    #[error("tls material error: {0}")]
    TlsMaterial(String),

    /// The TLS listener could not bind.
    #[error("tls listener failed to bind {addr}: {source}")]
    TlsBind {
        /// Address that failed.
        addr: std::net::SocketAddr,
        /// Underlying IO error.
        source: std::io::Error,
    },

    /// The TLS listener stopped serving.
    #[error("tls listener failed: {0}")]
    TlsServe(String),

    /// A request handler hit a condition that must halt the process.
    #[error("fatal request error: {0}")]
    Fatal(String),
}
