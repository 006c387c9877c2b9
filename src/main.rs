//! Ledger Service - double-entry ledger backend API
//!
//! Every movement of funds is recorded as a transaction with exactly two
//! ledger entries, committed under SERIALIZABLE isolation.

use std::net::SocketAddr;

use sqlx::postgres::PgPoolOptions;
use tower_http::cors::CorsLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledger_service::api::{self, AppState, RateLimiter};
use ledger_service::idempotency::IdempotencyStore;
use ledger_service::jobs::{JobScheduler, JobSchedulerConfig};
use ledger_service::{db, Config, LedgerStore};

/// Initialize tracing/logging
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "ledger_service=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting ledger service");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;
    db::verify_connection(&pool).await?;

    if config.run_migrations {
        db::run_migrations(&pool).await?;
    }

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let ledger = LedgerStore::new(pool.clone())
        .with_max_attempts(config.posting_max_attempts)
        .with_page_limits(config.page_limits());
    let idempotency = IdempotencyStore::new(config.idempotency_ttl());
    let rate_limiter = RateLimiter::new(config.rate_limit_per_minute);

    let jobs = JobScheduler::new(idempotency.clone(), rate_limiter.clone())
        .with_config(JobSchedulerConfig {
            sweep_interval: config.idempotency_sweep_interval(),
        })
        .start();

    let mut app = api::build_router(
        AppState::new(ledger, idempotency),
        rate_limiter,
        config.request_timeout(),
    );
    if !config.is_production() {
        app = app.layer(CorsLayer::permissive());
    }

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    jobs.abort();
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
