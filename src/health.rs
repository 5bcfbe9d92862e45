//! Health check for `/healthz`: host identity plus a live database probe.

use std::time::Duration;

use serde::Serialize;
use tracing::warn;

use crate::config::DatabaseConfig;
use crate::db::{MySqlProbe, Probe};

/// How long a health probe may take before the database counts as down.
const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

/// Database section of the health check configuration.
#[derive(Debug, Clone)]
pub struct DatabaseHealthConfig {
    /// Driver name reported in the payload.
    pub driver_name: String,
    /// Data source name with the password masked.
    pub data_source_name: String,
}

/// Health check configuration.
#[derive(Debug, Clone)]
pub struct HealthConfig {
    /// Host name reported in the payload.
    pub hostname: String,
    /// Database to probe.
    pub database: DatabaseHealthConfig,
}

impl HealthConfig {
    /// Configuration for this host and the given database.
    pub fn for_database(config: &DatabaseConfig) -> Self {
        Self {
            hostname: hostname(),
            database: DatabaseHealthConfig {
                driver_name: "mysql".to_string(),
                data_source_name: config.redacted_dsn(),
            },
        }
    }
}

/// Database part of the health payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DatabaseStatus {
    /// Driver name.
    pub driver: String,
    /// Data source, password masked.
    pub data_source: String,
    /// Whether a fresh connection could be opened and pinged.
    pub alive: bool,
    /// Probe failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Health payload.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HealthReport {
    /// Host name.
    pub hostname: String,
    /// Whether startup (gate and migrations) has completed.
    pub ready: bool,
    /// Database probe result.
    pub database: DatabaseStatus,
}

impl HealthReport {
    /// Healthy means the database answered.
    pub fn is_healthy(&self) -> bool {
        self.database.alive
    }
}

/// Runs health probes.
#[derive(Debug, Clone)]
pub struct HealthChecker {
    config: HealthConfig,
    probe: MySqlProbe,
}

impl HealthChecker {
    /// Create a checker probing `database`.
    pub fn new(config: HealthConfig, database: &DatabaseConfig) -> Self {
        Self {
            config,
            probe: MySqlProbe::new(database.connect_options()),
        }
    }

    /// Probe the database and build a report.
    pub async fn check(&self, ready: bool) -> HealthReport {
        let error = match tokio::time::timeout(PROBE_TIMEOUT, self.probe.probe()).await {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("probe timed out after {}s", PROBE_TIMEOUT.as_secs())),
        };

        if let Some(e) = &error {
            warn!(error = %e, "Health probe failed");
        }

        HealthReport {
            hostname: self.config.hostname.clone(),
            ready,
            database: DatabaseStatus {
                driver: self.config.database.driver_name.clone(),
                data_source: self.config.database.data_source_name.clone(),
                alive: error.is_none(),
                error,
            },
        }
    }
}

/// Best-effort host name: `$HOSTNAME`, then `/etc/hostname`.
pub fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .or_else(|| {
            std::fs::read_to_string("/etc/hostname")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_else(|| "localhost".to_string())
}
