use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::{Level, info, warn};
use tracing_subscriber::fmt::format::FmtSpan;

use eloits_engine::{
    EloitsEngine,
    api::{SecurityMiddlewareConfig, create_app},
    config::{EngineConfig, sanitize_for_logging},
    database::{DatabasePool, MemoryStore, RewardsStore},
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = EngineConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {:#}", e);
        eprintln!("Please check the ELOITS_* environment variables.");
        e
    })?;

    init_secure_logging(&config)?;
    info!("Starting Eloits rewards engine");

    let store: Arc<dyn RewardsStore> = if config.database.postgres_enabled {
        let shown_url = if config.logging.sanitize_logs {
            sanitize_for_logging(&config.database.postgres_url)
        } else {
            config.database.postgres_url.clone()
        };
        info!("Connecting to PostgreSQL at {}", shown_url);

        let pool = DatabasePool::new(&config.database.postgres_url)
            .await
            .context("Failed to connect to PostgreSQL")?;
        pool.init_schema()
            .await
            .context("Failed to initialize rewards schema")?;
        Arc::new(pool)
    } else {
        warn!("PostgreSQL disabled - using in-memory store, data is lost on restart");
        Arc::new(MemoryStore::new())
    };

    let engine = Arc::new(EloitsEngine::new(store));
    let security = SecurityMiddlewareConfig {
        enable_auth: config.security.enable_auth,
        api_keys: config.security.api_keys.clone(),
        max_request_size: config.security.max_request_size,
        sanitize_logs: config.logging.sanitize_logs,
        public_paths: vec!["/health".to_string()],
    };
    info!(
        "Security middleware: Auth={}, API keys={}, Max body={}KB",
        security.enable_auth,
        security.api_keys.len(),
        security.max_request_size / 1024
    );
    let app = create_app(engine, security);

    let bind_addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", bind_addr, e))?;
    info!("Rewards engine listening on {}", bind_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Rewards engine stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// Initialize logging from the configured level
fn init_secure_logging(config: &EngineConfig) -> Result<()> {
    let log_level = match config.logging.level.as_str() {
        "error" => Level::ERROR,
        "warn" => Level::WARN,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_span_events(if config.logging.log_requests {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to set logging subscriber: {}", e))?;

    if config.logging.sanitize_logs {
        info!("Logging initialized with data sanitization enabled");
    }

    Ok(())
}
