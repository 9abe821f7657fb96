//! Raffle Backend Service
//!
//! Main entry point for the raffle backend.
//! This service provides:
//! - HTTP/JSON API for storefront and admin interactions
//! - Exactly-once ticket allocation for completed payments
//! - Verifiable winner draws and a background pool integrity monitor

use raffle_backend::config::AppConfig;
use raffle_backend::database::{create_pool, run_migrations};
use raffle_backend::error::{AppError, AppResult};
use raffle_backend::monitor::PoolMonitor;
use raffle_backend::repositories::{PgRaffleStore, RaffleStore};
use raffle_backend::services::{AuditTrailService, IntegrityService};
use raffle_backend::{http_service, AppState};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load environment variables first
    dotenv::dotenv().ok();

    // Load configuration
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        AppError::Config(e)
    })?;

    // Initialize tracing/logging with config
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("raffle_backend={},sqlx=warn,tower_http=info", config.log_level).into()
            }),
        )
        .init();

    info!("Raffle backend service starting");
    info!("Environment: {}", config.environment);
    info!("Log level: {}", config.log_level);
    info!("HTTP port: {}", config.http_port);

    // =========================================================================
    // DATABASE SETUP
    // =========================================================================
    info!("Connecting to database...");

    let pool = create_pool(&config.database).await.map_err(|e| {
        error!("Failed to create database pool: {}", e);
        AppError::Database(e)
    })?;

    info!("Database connection pool created successfully");
    info!("Max connections: {}", config.database.max_connections);

    // Run migrations
    info!("Running database migrations...");
    run_migrations(&pool, None).await.map_err(|e| {
        error!("Database migration failed: {}", e);
        AppError::Database(e)
    })?;

    info!("Database migrations completed successfully");

    // =========================================================================
    // CORE SERVICES INITIALIZATION
    // =========================================================================
    info!("Initializing core services...");

    let store: Arc<dyn RaffleStore> = Arc::new(PgRaffleStore::new(pool));
    info!("✓ PostgreSQL store initialized");

    let audit = Arc::new(AuditTrailService::new(config.audit_log_dir.clone()).map_err(|e| {
        error!("Failed to initialize audit trail: {}", e);
        AppError::Message(format!("Audit trail initialization failed: {}", e))
    })?);
    info!("✓ Audit trail service initialized");

    let app_state = Arc::new(AppState::from_config(
        store.clone(),
        Some(audit.clone()),
        &config,
    ));
    info!("✓ Application state initialized with services");

    // =========================================================================
    // BACKGROUND TASKS
    // =========================================================================
    info!("Starting background tasks...");

    let monitor = PoolMonitor::new(IntegrityService::new(store))
        .with_audit(audit)
        .with_interval(config.pool_audit_interval());

    let monitor_handle = tokio::spawn(async move {
        monitor.start().await;
    });
    info!(
        "✓ Pool monitor background task started ({}s interval)",
        config.pool_audit_interval_secs
    );

    // =========================================================================
    // START SERVER
    // =========================================================================
    let http_addr: SocketAddr = format!("0.0.0.0:{}", config.http_port)
        .parse()
        .map_err(|e| AppError::Config(format!("Invalid HTTP address: {}", e)))?;

    info!("Starting HTTP server on {}...", http_addr);

    let listener = TcpListener::bind(http_addr)
        .await
        .map_err(|e| AppError::Message(format!("Failed to bind HTTP server: {}", e)))?;

    let router = http_service::router(app_state);
    let http_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            error!("HTTP server error: {}", e);
        }
    });

    info!("✓ HTTP server started on {}", http_addr);
    info!("Raffle backend service ready. Press Ctrl+C to shutdown gracefully");

    // =========================================================================
    // SHUTDOWN HANDLING
    // =========================================================================
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received, shutting down gracefully...");
        }
        _ = http_handle => {
            error!("HTTP server exited unexpectedly");
        }
        _ = monitor_handle => {
            error!("Pool monitor task exited unexpectedly");
        }
    }

    info!("Raffle backend service shutdown complete");
    Ok(())
}
