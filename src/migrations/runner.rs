//! Synchronous up-migration runner.

use std::path::Path;

use tracing::{error, info, instrument};

use crate::error::MigrationError;
use crate::metrics;
use crate::migrations::source::MigrationSet;
use crate::migrations::store::MigrationStore;

/// Outcome of a successful run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MigrationReport {
    /// Version before the run.
    pub from: Option<u64>,
    /// Versions applied by this run, ascending.
    pub applied: Vec<u64>,
}

impl MigrationReport {
    /// Version after the run.
    pub fn to(&self) -> Option<u64> {
        self.applied.last().copied().or(self.from)
    }
}

/// Applies pending migrations against a store.
#[derive(Debug)]
pub struct Migrator<S> {
    store: S,
}

impl<S: MigrationStore> Migrator<S> {
    /// Create a migrator for a store.
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Load `dir` and apply everything newer than the recorded version.
    pub async fn up_from_dir(&mut self, dir: &Path) -> Result<MigrationReport, Vec<MigrationError>> {
        info!(dir = %dir.display(), "Loading migrations");
        let set = MigrationSet::load(dir)?;
        self.up(&set).await
    }

    /// Apply pending migrations in ascending order.
    ///
    /// Stops at the first failing step. The error list is never empty on
    /// failure and later steps are not attempted.
    #[instrument(skip_all, fields(total = set.len()))]
    pub async fn up(&mut self, set: &MigrationSet) -> Result<MigrationReport, Vec<MigrationError>> {
        self.store.prepare().await.map_err(|e| vec![e])?;
        let from = self.store.current_version().await.map_err(|e| vec![e])?;

        let mut report = MigrationReport {
            from,
            applied: Vec::new(),
        };
        let mut errors = Vec::new();

        for migration in set.pending(from) {
            info!(version = migration.version, name = %migration.name, "Applying migration");

            if let Err(reason) = self.store.apply(migration).await {
                error!(version = migration.version, error = %reason, "Migration failed");
                metrics::inc_migrations_failed();
                errors.push(MigrationError::Step {
                    version: migration.version,
                    name: migration.name.clone(),
                    reason,
                });
                break;
            }

            metrics::inc_migrations_applied();
            report.applied.push(migration.version);
        }

        if !errors.is_empty() {
            return Err(errors);
        }

        info!(
            from = ?report.from,
            to = ?report.to(),
            applied = report.applied.len(),
            "Migrations up to date"
        );
        Ok(report)
    }
}
