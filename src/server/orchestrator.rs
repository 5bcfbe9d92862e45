//! Dual listener startup.
//!
//! 1. Bind the plaintext listener and serve it in the background
//! 2. Wait for the database (connection gate)
//! 3. Apply migrations, then mark the service ready
//! 4. Load TLS material, bind the TLS listener and serve it on this task
//!
//! Both listeners share one router. Any failure of the plaintext listener,
//! the TLS listener, or a fatal request error ends [`Startup::run`].

use tracing::{error, info};

use crate::api::{create_router, AppState, FatalReceiver};
use crate::config::ServerConfig;
use crate::db::{ConnectionGate, GatePolicy, Probe};
use crate::error::StartupError;
use crate::migrations::{MigrationStore, Migrator};
use crate::server::listener::{serve_plaintext, serve_tls, Binder};
use crate::server::tls::load_acceptor;

/// Everything the startup sequence needs, injected.
pub struct Startup<B, P, S> {
    config: ServerConfig,
    state: AppState,
    fatal_rx: FatalReceiver,
    binder: B,
    gate: ConnectionGate<P>,
    migrator: Migrator<S>,
}

impl<B, P, S> Startup<B, P, S>
where
    B: Binder,
    P: Probe,
    S: MigrationStore,
{
    /// Assemble the startup sequence.
    pub fn new(
        config: ServerConfig,
        state: AppState,
        fatal_rx: FatalReceiver,
        binder: B,
        probe: P,
        store: S,
    ) -> Self {
        let policy = GatePolicy {
            interval: config.retry_interval,
            max_attempts: config.max_connect_attempts,
        };
        Self {
            config,
            state,
            fatal_rx,
            binder,
            gate: ConnectionGate::new(probe, policy),
            migrator: Migrator::new(store),
        }
    }

    /// Run until a fatal error. Never returns `Ok` while serving.
    pub async fn run(self) -> Result<(), StartupError> {
        let Startup {
            config,
            state,
            mut fatal_rx,
            binder,
            mut gate,
            mut migrator,
        } = self;

        let router = create_router(state.clone());

        let addr = config.plaintext_addr();
        let listener = binder
            .bind(addr)
            .await
            .map_err(|source| StartupError::PlaintextBind { addr, source })?;
        info!(addr = ?listener.local_addr().ok(), "Plaintext listener up");
        let mut plaintext = tokio::spawn(serve_plaintext(listener, router.clone()));

        let secure = async {
            let attempts = gate.wait().await?;
            info!(attempts = attempts, "Connection gate open");

            info!("Running migrations");
            let report = migrator
                .up_from_dir(&config.migrations_dir)
                .await
                .map_err(|errors| {
                    error!(count = errors.len(), "Migrations failed");
                    for e in &errors {
                        error!(error = %e, "Migration error");
                    }
                    StartupError::Migrations(errors)
                })?;
            info!(applied = report.applied.len(), version = ?report.to(), "Migrations run");
            state.set_ready(true);

            let acceptor = load_acceptor(&config.tls_cert, &config.tls_key)?;
            let addr = config.tls_addr();
            let listener = binder
                .bind(addr)
                .await
                .map_err(|source| StartupError::TlsBind { addr, source })?;
            serve_tls(listener, acceptor, router)
                .await
                .map_err(|e| StartupError::TlsServe(e.to_string()))
        };

        let result = tokio::select! {
            result = secure => result,
            joined = &mut plaintext => Err(StartupError::PlaintextServe(match joined {
                Ok(Ok(())) => "listener stopped".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            })),
            Some(reason) = fatal_rx.recv() => Err(StartupError::Fatal(reason)),
        };

        plaintext.abort();
        result
    }
}
