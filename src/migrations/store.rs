//! Persisted schema version state.

use std::future::Future;

use sqlx::mysql::MySqlPool;
use tracing::{error, warn};

use crate::error::MigrationError;
use crate::migrations::source::Migration;

/// Where migrations are applied and their versions recorded.
pub trait MigrationStore: Send {
    /// Make sure version tracking exists.
    fn prepare(&mut self) -> impl Future<Output = Result<(), MigrationError>> + Send;

    /// Highest applied version, if any.
    fn current_version(&mut self) -> impl Future<Output = Result<Option<u64>, MigrationError>> + Send;

    /// Run one migration and record its version.
    fn apply(&mut self, migration: &Migration) -> impl Future<Output = Result<(), String>> + Send;
}

/// Version tracking in a `schema_migrations` table of the target database.
#[derive(Debug, Clone)]
pub struct MySqlMigrationStore {
    pool: MySqlPool,
}

impl MySqlMigrationStore {
    /// Create a store on top of a pool.
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl MigrationStore for MySqlMigrationStore {
    async fn prepare(&mut self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (version BIGINT NOT NULL PRIMARY KEY)",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::VersionState(e.to_string()))?;
        Ok(())
    }

    async fn current_version(&mut self) -> Result<Option<u64>, MigrationError> {
        let version: Option<i64> = sqlx::query_scalar(
            "SELECT version FROM schema_migrations ORDER BY version DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| MigrationError::VersionState(e.to_string()))?;

        version
            .map(|v| {
                u64::try_from(v)
                    .map_err(|_| MigrationError::VersionState(format!("negative version {v}")))
            })
            .transpose()
    }

    /// Run one migration and record its version.
    ///
    /// MySQL commits DDL implicitly, so the transaction alone cannot tie a
    /// schema change to its version row. The row is written first and
    /// removed again if the migration fails.
    async fn apply(&mut self, migration: &Migration) -> Result<(), String> {
        let version = i64::try_from(migration.version)
            .map_err(|_| format!("version {} out of range", migration.version))?;

        let mut tx = self.pool.begin().await.map_err(|e| e.to_string())?;

        let conn: &mut sqlx::MySqlConnection = &mut tx;
        sqlx::query("INSERT INTO schema_migrations (version) VALUES (?)")
            .bind(version)
            .execute(&mut *conn)
            .await
            .map_err(|e| e.to_string())?;

        if let Err(e) = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(&migration.sql)).await {
            if let Err(rollback) = tx.rollback().await {
                warn!(version = migration.version, error = %rollback, "Rollback failed");
            }
            if let Err(cleanup) = sqlx::query("DELETE FROM schema_migrations WHERE version = ?")
                .bind(version)
                .execute(&self.pool)
                .await
            {
                error!(
                    version = migration.version,
                    error = %cleanup,
                    "Failed migration is still recorded"
                );
            }
            return Err(e.to_string());
        }

        tx.commit().await.map_err(|e| e.to_string())
    }
}
