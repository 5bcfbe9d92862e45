//! Database access: cell decoding, query serialization and the startup gate.

pub mod gate;
pub mod serializer;
pub mod value;

use sqlx::mysql::{MySqlPool, MySqlPoolOptions};

use crate::config::DatabaseConfig;

pub use gate::{ConnectionGate, GatePolicy, GateState, MySqlProbe, Probe};
pub use serializer::{query_json, ResultSet, RowRecord};
pub use value::Cell;

/// Create a pool that connects on first use, so it can exist before the
/// database is reachable.
pub fn lazy_pool(config: &DatabaseConfig) -> MySqlPool {
    MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(0)
        .connect_lazy_with(config.connect_options())
}

/// Single-connection pool for the migration runner, opened from
/// [`DatabaseConfig::migration_url`]. Connects on first use.
pub fn migration_pool(config: &DatabaseConfig) -> Result<MySqlPool, sqlx::Error> {
    let url = config
        .migration_url()
        .map_err(|e| sqlx::Error::Configuration(e.into()))?;
    MySqlPoolOptions::new()
        .max_connections(1)
        .min_connections(0)
        .connect_lazy(url.as_str())
}
