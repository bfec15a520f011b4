//! eos-hub server binary
//!
//! ## Environment variables
//!
//! | Variable        | Required | Description                          |
//! |-----------------|----------|--------------------------------------|
//! | `DATABASE_URL`  | Yes      | PostgreSQL connection string         |
//! | `EOS_BASE_URL`  | No       | EOS optimizer base URL               |
//! | `BIND_ADDRESS`  | No       | Listen address (default 0.0.0.0:8080)|
//!
//! All remaining knobs (`EOS_ALIGNED_SCHEDULER_*`, `DATA_*_RETENTION_DAYS`,
//! `EMR_*`, ...) are optional with hard defaults; see `config.rs`.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use eos_hub::api::{build_router, AppState};
use eos_hub::config::AppConfig;
use eos_hub::ingest::channels::ensure_default_channel_exists;
use eos_hub::ingest::InputIngestPipeline;
use eos_hub::jobs::JobSupervisor;
use eos_hub::orchestrator::eos_client::HttpEosClient;
use eos_hub::orchestrator::Orchestrator;
use eos_hub::params::profiles::ensure_bootstrap_profile;
use eos_hub::prefs::PreferenceCache;
use eos_hub::types::ChannelType;
use eos_hub::{db, DomainError};

#[derive(Parser, Debug)]
#[command(name = "eos-hub", about = "Energy-management orchestration backend")]
struct CliArgs {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Port to listen on (default: 8080)
    #[arg(long, short)]
    port: Option<u16>,

    /// Bind address (overrides --port)
    #[arg(long)]
    bind_address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,eos_hub=debug")),
        )
        .init();

    let args = CliArgs::parse();
    let config = AppConfig::from_env(args.database_url, args.bind_address, args.port)?;

    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL must be set via --database-url or DATABASE_URL env var");
    }

    info!(bind = %config.bind_address, eos = %config.eos_base_url, "Starting eos-hub");

    // ── Database ──────────────────────────────────────────────────────────
    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;

    // ── Bootstrap ─────────────────────────────────────────────────────────
    ensure_default_channel_exists(&pool, ChannelType::Http, "http-default", "HTTP Default").await?;
    ensure_bootstrap_profile(&pool).await?;

    let prefs = PreferenceCache::new();
    prefs.refresh(&pool).await?;

    // ── Services ──────────────────────────────────────────────────────────
    let eos_client = Arc::new(
        HttpEosClient::new(&config.eos_base_url)
            .map_err(|e: DomainError| anyhow::anyhow!(e.to_string()))?,
    );
    let orchestrator = Orchestrator::new(pool.clone(), config.clone(), eos_client);
    let ingest = InputIngestPipeline::new(pool.clone(), config.clone());

    // ── Background workers ────────────────────────────────────────────────
    let supervisor = JobSupervisor::new();
    supervisor.start(
        pool.clone(),
        config.clone(),
        orchestrator.clone(),
        prefs.clone(),
    );

    // ── HTTP server ───────────────────────────────────────────────────────
    let state = AppState {
        pool,
        config: config.clone(),
        ingest,
        orchestrator,
        prefs,
        supervisor: supervisor.clone(),
    };
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    info!(address = %config.bind_address, "eos-hub listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(supervisor))
    .await?;

    info!("eos-hub shut down gracefully");
    Ok(())
}

async fn shutdown_signal(supervisor: JobSupervisor) {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::error!("Failed to install Ctrl+C handler");
        return;
    }
    info!("Shutdown signal received");
    supervisor.stop();
}
