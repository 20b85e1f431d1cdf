//! Booktracker access-control service.
//!
//! Operational entry point: runs migrations, sweeps expired invitations,
//! and answers one-off permission and invitation queries.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt};

use booktracker_core::config::AppConfig;
use booktracker_core::error::AppError;
use booktracker_core::traits::SystemClock;
use booktracker_core::types::{ChildId, UserId};
use booktracker_database::DatabasePool;
use booktracker_entity::permission::PermissionLevel;
use booktracker_service::{AccessService, AccessStores};

/// Booktracker access control
#[derive(Debug, Parser)]
#[command(name = "booktracker", version, about, long_about = None)]
struct Cli {
    /// Configuration environment overlay (`config/{env}`)
    #[arg(short, long, env = "BOOKTRACKER_ENV", default_value = "development")]
    env: String,

    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Apply pending database migrations
    Migrate,
    /// Delete expired invitations
    Sweep {
        /// Keep running, sweeping on the configured interval
        #[arg(long)]
        watch: bool,
        /// Keep running, sweeping every N seconds
        #[arg(long, value_name = "SECS")]
        every: Option<u64>,
    },
    /// Check whether a user holds a level on a child
    Authorize {
        /// User ID
        #[arg(long)]
        user: UserId,
        /// Child ID
        #[arg(long)]
        child: ChildId,
        /// Required level (VIEW or EDIT)
        #[arg(long, default_value = "VIEW")]
        level: PermissionLevel,
    },
    /// Show the live invitations behind a token
    Pending {
        /// Invitation token
        #[arg(long)]
        token: String,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match AppConfig::load(&cli.env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        tracing::error!("Command failed: {}", e);
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(cli: Cli, config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        "Starting Booktracker v{} (env: {})",
        env!("CARGO_PKG_VERSION"),
        cli.env
    );

    let db = DatabasePool::connect(&config.database).await?;

    let result = match cli.command {
        Commands::Migrate => {
            booktracker_database::migration::run_migrations(db.pool()).await?;
            tracing::info!("Database migrations complete");
            Ok(())
        }
        Commands::Sweep { watch, every } => {
            let service = access_service(&db, &config);
            if watch || every.is_some() {
                let period = every
                    .map(Duration::from_secs)
                    .unwrap_or_else(|| config.access.invitation_sweep_interval());
                sweep_loop(&service, period).await
            } else {
                let removed = service.sweep_expired_invitations().await?;
                println!("Removed {} expired invitation(s)", removed);
                Ok(())
            }
        }
        Commands::Authorize { user, child, level } => {
            let service = access_service(&db, &config);
            let ctx = service.begin_request(user);
            let allowed = service.authorize(&ctx, child, level).await?;
            println!("{}", if allowed { "allowed" } else { "denied" });
            Ok(())
        }
        Commands::Pending { token } => {
            let service = access_service(&db, &config);
            let rows = service.pending_invitations_for(&token).await?;
            let json = serde_json::to_string_pretty(&rows)
                .map_err(|e| AppError::internal(format!("Failed to render invitations: {}", e)))?;
            println!("{}", json);
            Ok(())
        }
    };

    db.close().await;
    result
}

fn access_service(db: &DatabasePool, config: &AppConfig) -> AccessService {
    AccessService::new(
        AccessStores::from_pool(db),
        &config.access,
        Arc::new(SystemClock),
    )
}

/// Sweep on `period` until Ctrl+C or SIGTERM.
async fn sweep_loop(service: &AccessService, period: Duration) -> Result<(), AppError> {
    tracing::info!(interval_secs = period.as_secs(), "Invitation sweeper started");
    let mut ticker = tokio::time::interval(period);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = service.sweep_expired_invitations().await {
                    tracing::error!("Invitation sweep failed: {}", e);
                }
            }
            _ = &mut shutdown => {
                tracing::info!("Invitation sweeper stopped");
                return Ok(());
            }
        }
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
