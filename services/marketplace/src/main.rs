use std::sync::Arc;

use anyhow::Result;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use common::database::{DatabaseConfig, health_check, init_pool, run_migrations};
use marketplace::{
    AppState, auth::TokenVerifier, config::AppConfig, create_router, store::PgStore,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting marketplace service");

    let config = AppConfig::from_env()?;

    // Initialize database connection pool
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    // Check database connectivity
    if health_check(&pool).await? {
        info!("Database connection successful");
    } else {
        anyhow::bail!("Failed to connect to database");
    }

    run_migrations(&pool).await?;
    info!("Database migrations applied");

    let verifier =
        TokenVerifier::from_source(&config.key_source()?, &config.verifier_settings()).await?;

    let store = Arc::new(PgStore::new(pool));
    let app_state = AppState::new(store, verifier, config.webhook_secret());
    let app = create_router(app_state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Marketplace service listening on {}", config.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Marketplace service shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}
