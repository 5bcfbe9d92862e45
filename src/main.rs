//! Abstractions API entry point.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use url::Url;

use abstractions_api::api::AppState;
use abstractions_api::config::{
    DatabaseConfig, ServerConfig, DEFAULT_LISTEN_PORT, DEFAULT_MIGRATIONS_DIR,
    DEFAULT_RETRY_INTERVAL_SECS, DEFAULT_SESSIONS_URL, DEFAULT_TLS_CERT, DEFAULT_TLS_KEY,
    DEFAULT_TLS_LISTEN_PORT,
};
use abstractions_api::db::{lazy_pool, migration_pool, ConnectionGate, GatePolicy, MySqlProbe};
use abstractions_api::health::{HealthChecker, HealthConfig};
use abstractions_api::metrics;
use abstractions_api::migrations::{Migrator, MySqlMigrationStore};
use abstractions_api::server::{Startup, TcpBinder};

/// Abstractions conference API.
#[derive(Parser, Debug)]
#[command(name = "abstractions-api")]
#[command(about = "Serves conference data as JSON over HTTP and HTTPS")]
#[command(version)]
struct Args {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Command>,

    /// Port to have the API listen on.
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT, global = true)]
    listen_port: u16,

    /// Port to have the API listen on over TLS.
    #[arg(long, default_value_t = DEFAULT_TLS_LISTEN_PORT, global = true)]
    tls_listen_port: u16,

    /// Directory of `<version>_<name>.up.sql` migrations.
    #[arg(long, default_value = DEFAULT_MIGRATIONS_DIR, global = true)]
    migrations_dir: PathBuf,

    /// PEM certificate chain for the TLS listener.
    #[arg(long, default_value = DEFAULT_TLS_CERT, global = true)]
    tls_cert: PathBuf,

    /// PEM private key for the TLS listener.
    #[arg(long, default_value = DEFAULT_TLS_KEY, global = true)]
    tls_key: PathBuf,

    /// Seconds between database connection attempts.
    #[arg(long, default_value_t = DEFAULT_RETRY_INTERVAL_SECS, global = true)]
    retry_interval_secs: u64,

    /// Give up after this many connection attempts (default: never).
    #[arg(long, global = true)]
    max_connect_attempts: Option<u32>,

    /// Upstream schedule document served at /sessions.
    #[arg(long, default_value = DEFAULT_SESSIONS_URL, global = true)]
    sessions_url: Url,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start both listeners (default).
    Run,

    /// Check configuration validity.
    CheckConfig,

    /// Wait for the database, apply migrations, and exit.
    Migrate,
}

impl Args {
    fn server_config(&self) -> ServerConfig {
        ServerConfig {
            listen_port: self.listen_port,
            tls_listen_port: self.tls_listen_port,
            migrations_dir: self.migrations_dir.clone(),
            tls_cert: self.tls_cert.clone(),
            tls_key: self.tls_key.clone(),
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_connect_attempts: self.max_connect_attempts,
            sessions_url: self.sessions_url.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    let filter = if args.verbose {
        EnvFilter::new("abstractions_api=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match &args.command {
        Some(Command::CheckConfig) => cmd_check_config(&args),
        Some(Command::Migrate) => cmd_migrate(&args).await,
        Some(Command::Run) | None => cmd_run(&args).await,
    }
}

/// Load and validate both halves of the configuration.
fn load_config(args: &Args) -> anyhow::Result<(ServerConfig, DatabaseConfig)> {
    let server = args.server_config();
    if let Err(e) = server.validate() {
        error!("Invalid configuration: {}", e);
        return Err(anyhow::anyhow!("Configuration validation failed: {}", e));
    }

    let database = DatabaseConfig::load().map_err(|e| {
        error!("Failed to load database configuration: {}", e);
        e
    })?;

    Ok((server, database))
}

/// Check configuration validity.
fn cmd_check_config(args: &Args) -> anyhow::Result<()> {
    println!("======================================================================");
    println!("ABSTRACTIONS API - CONFIGURATION CHECK");
    println!("======================================================================");

    let (server, database) = load_config(args)?;

    println!("Configuration Summary:");
    println!("  Listen Port: {}", server.listen_port);
    println!("  TLS Listen Port: {}", server.tls_listen_port);
    println!("  Database: {}", database.redacted_url());
    println!("  Migrations: {}", server.migrations_dir.display());
    println!("  TLS Cert: {}", server.tls_cert.display());
    println!("  TLS Key: {}", server.tls_key.display());
    println!("  Retry Interval: {}s", server.retry_interval.as_secs());
    match server.max_connect_attempts {
        Some(max) => println!("  Max Connect Attempts: {}", max),
        None => println!("  Max Connect Attempts: unbounded"),
    }
    println!("  Sessions URL: {}", server.sessions_url);
    println!("======================================================================");
    println!("CONFIGURATION CHECK PASSED");
    println!("======================================================================");

    Ok(())
}

/// Wait for the database and apply migrations without serving.
async fn cmd_migrate(args: &Args) -> anyhow::Result<()> {
    let (server, database) = load_config(args)?;
    info!(database = %database.redacted_url(), "Migrating");

    let policy = GatePolicy {
        interval: server.retry_interval,
        max_attempts: server.max_connect_attempts,
    };
    let mut gate = ConnectionGate::new(MySqlProbe::new(database.connect_options()), policy);
    gate.wait().await?;

    let mut migrator = Migrator::new(MySqlMigrationStore::new(migration_pool(&database)?));
    match migrator.up_from_dir(&server.migrations_dir).await {
        Ok(report) => {
            info!(applied = report.applied.len(), version = ?report.to(), "Migrations run");
            Ok(())
        }
        Err(errors) => {
            for e in &errors {
                error!(error = %e, "Migration error");
            }
            Err(anyhow::anyhow!("{} migration error(s)", errors.len()))
        }
    }
}

/// Start the plaintext listener, then promote to TLS once the database is ready.
async fn cmd_run(args: &Args) -> anyhow::Result<()> {
    info!("Loading configuration...");
    let (server, database) = load_config(args)?;

    // Initialize metrics
    let prometheus = metrics::install_recorder();
    metrics::init_metrics();

    info!(
        listen_port = server.listen_port,
        tls_listen_port = server.tls_listen_port,
        database = %database.redacted_url(),
        "API is starting"
    );

    let pool = lazy_pool(&database);
    let migrations = MySqlMigrationStore::new(migration_pool(&database)?);
    let health = HealthChecker::new(HealthConfig::for_database(&database), &database);
    let (state, fatal_rx) = AppState::new(
        pool,
        health,
        server.sessions_url.clone(),
        prometheus,
    );

    let startup = Startup::new(
        server,
        state,
        fatal_rx,
        TcpBinder,
        MySqlProbe::new(database.connect_options()),
        migrations,
    );

    if let Err(e) = startup.run().await {
        error!(error = %e, "Fatal error, shutting down");
        return Err(e.into());
    }

    Ok(())
}
