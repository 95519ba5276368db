//! Unora Server
//!
//! HTTP engine for matching, streaks, nudges and reveals.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};

use unora_core::config::load_config;
use unora_core::tracing_init::{LogFormat, init_tracing};
use unora_server::auth::JwtManager;
use unora_server::http::{AppState, build_router};
use unora_server::reveal::{ContentWorker, content_generator};
use unora_server::storage::EngineDatabase;
use unora_server::streak::StreakService;

#[derive(Parser, Debug)]
#[command(name = "unora-server")]
#[command(
    version,
    about = "Unora server - matching, streak lifecycle, nudges and reveals"
)]
struct Args {
    /// Address to listen on. Overrides the configured address.
    #[arg(long)]
    addr: Option<SocketAddr>,

    /// Path to SQLite database file.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Explicit JSON config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Secret shared with the identity service for HS256 access tokens.
    #[arg(
        long,
        env = "UNORA_JWT_SECRET",
        default_value = "dev-secret-change-me"
    )]
    jwt_secret: String,

    /// Access token TTL in seconds, for tokens issued by tooling.
    #[arg(long, default_value_t = 3600)]
    access_ttl: i64,

    /// Key required in `x-admin-key` on admin routes. Admin routes are off without it.
    #[arg(long, env = "UNORA_ADMIN_KEY")]
    admin_key: Option<String>,

    /// Log output format: pretty, compact or json.
    #[arg(long, default_value = "pretty")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let config = load_config(args.config.as_deref())?;
    let level = &config.server.log_level;
    init_tracing(
        &format!("unora_server={level},tower_http={level}"),
        args.log_format,
    );

    let addr: SocketAddr = match args.addr {
        Some(addr) => addr,
        None => config.server.addr.parse()?,
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %addr,
        "Starting unora-server"
    );

    let db_path = match args.db_path.or_else(|| config.server.database_path.clone()) {
        Some(path) => path,
        None => default_db_path()?,
    };
    info!(path = %db_path.display(), "Opening engine database");
    let db = EngineDatabase::open(&db_path).await?;

    if args.admin_key.is_none() {
        warn!("No admin key configured, admin routes are disabled");
    }

    let generator = content_generator(&config.reveal);
    let jwt = JwtManager::new(args.jwt_secret.as_bytes(), args.access_ttl);
    let state = AppState::new(&db, &config, generator, jwt, args.admin_key);

    spawn_decay_sweep(
        state.streaks.clone(),
        Duration::from_secs(config.streak.sweep_interval_secs),
    );
    spawn_content_backfill(
        state.reveals.content_worker().clone(),
        Duration::from_secs(config.reveal.content_retry_interval_secs),
    );

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "HTTP server listening");

    tokio::select! {
        result = axum::serve(listener, app) => {
            result?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
    }

    info!("Server stopped");
    Ok(())
}

/// Periodically move overdue streaks down the decay ladder.
fn spawn_decay_sweep(streaks: StreakService, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.tick().await; // Skip first immediate tick
        loop {
            interval.tick().await;
            match streaks.sweep(unora_core::db::unix_timestamp()).await {
                Ok(report) if report.total() > 0 => {
                    info!(?report, "Streak decay sweep completed");
                }
                Err(e) => {
                    warn!(error = %e, "Streak decay sweep failed");
                }
                _ => {}
            }
        }
    });
}

/// Periodically retry content generation for unlocked reveals that have none.
fn spawn_content_backfill(worker: ContentWorker, period: Duration) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period.max(Duration::from_secs(1)));
        interval.tick().await;
        loop {
            interval.tick().await;
            if let Err(e) = worker.backfill().await {
                warn!(error = %e, "Reveal content backfill failed");
            }
        }
    });
}

fn default_db_path() -> anyhow::Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".unora").join("unora.db"))
}
