//! Connection gate: block startup until the database answers.
//!
//! - Fixed pause between probes, no backoff and no jitter
//! - Unbounded by default; a bounded policy is opt-in
//! - One-shot: once reachable, the gate never probes again

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::Connection;
use tracing::{error, info, warn};

use crate::config::DEFAULT_RETRY_INTERVAL_SECS;
use crate::error::GateError;
use crate::metrics;

/// A connectivity check against the data source.
pub trait Probe: Send + Sync {
    /// Error reported by a failed probe.
    type Error: Display + Send;

    /// Open a connection and check it is alive.
    fn probe(&self) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// Probe that opens a fresh MySQL connection and pings it.
#[derive(Debug, Clone)]
pub struct MySqlProbe {
    options: MySqlConnectOptions,
}

impl MySqlProbe {
    /// Create a probe for the given connection options.
    pub fn new(options: MySqlConnectOptions) -> Self {
        Self { options }
    }
}

impl Probe for MySqlProbe {
    type Error = sqlx::Error;

    async fn probe(&self) -> Result<(), sqlx::Error> {
        let mut conn = MySqlConnection::connect_with(&self.options).await?;
        conn.ping().await?;
        conn.close().await
    }
}

/// Retry policy for the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatePolicy {
    /// Pause between failed probes.
    pub interval: Duration,
    /// Give up after this many probes. `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for GatePolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RETRY_INTERVAL_SECS),
            max_attempts: None,
        }
    }
}

/// Gate state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Not probed yet.
    Init,
    /// Probing, with failed attempts so far.
    Probing(u32),
    /// A probe succeeded.
    Ready,
}

/// Blocks the caller until its probe succeeds.
#[derive(Debug)]
pub struct ConnectionGate<P> {
    probe: P,
    policy: GatePolicy,
    state: GateState,
}

impl<P: Probe> ConnectionGate<P> {
    /// Create a gate in the `Init` state.
    pub fn new(probe: P, policy: GatePolicy) -> Self {
        Self {
            probe,
            policy,
            state: GateState::Init,
        }
    }

    /// Current state.
    pub fn state(&self) -> GateState {
        self.state
    }

    /// Whether a probe has succeeded.
    pub fn is_reachable(&self) -> bool {
        self.state == GateState::Ready
    }

    /// Probe until the database answers. Returns the number of probes made.
    ///
    /// Returns `Ok(0)` without probing if the gate is already `Ready`.
    pub async fn wait(&mut self) -> Result<u32, GateError> {
        if self.is_reachable() {
            return Ok(0);
        }

        let mut attempt = 0u32;
        loop {
            attempt = attempt.saturating_add(1);
            metrics::inc_db_probe_attempts();

            match self.probe.probe().await {
                Ok(()) => {
                    self.state = GateState::Ready;
                    info!(attempts = attempt, "Database is reachable");
                    return Ok(attempt);
                }
                Err(e) => {
                    self.state = GateState::Probing(attempt);

                    if let Some(max) = self.policy.max_attempts {
                        if attempt >= max {
                            error!(attempts = attempt, error = %e, "Giving up on database");
                            return Err(GateError::Exhausted {
                                attempts: attempt,
                                last_error: e.to_string(),
                            });
                        }
                    }

                    warn!(
                        attempt = attempt,
                        error = %e,
                        retry_in_ms = self.policy.interval.as_millis() as u64,
                        "Database not reachable, retrying"
                    );
                    tokio::time::sleep(self.policy.interval).await;
                }
            }
        }
    }
}
