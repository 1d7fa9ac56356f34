// Copyright (C) 2025 SyncMyOrders Sp. z o.o.
// SPDX-License-Identifier: AGPL-3.0-or-later
//! Starlab Server
//!
//! Serves the scope catalog, star baskets and moderation over HTTP, and
//! receives calculation results from the compute service.

use std::sync::Arc;

use anyhow::Result;
use sqlx::postgres::PgPoolOptions;
use tokio::net::TcpListener;
use tracing::{error, info};

use starlab_core::TokenAuthority;
use starlab_core::accounts::AccountHandlerState;
use starlab_core::catalog::CatalogHandlerState;
use starlab_core::dispatch::HttpComputeClient;
use starlab_core::lifecycle::{CalculationMode, LifecycleHandlerState};
use starlab_core::persistence::{Persistence, PostgresPersistence};
use starlab_server::config::{CalculationModeConfig, Config};
use starlab_server::redis_blacklist::RedisBlacklist;
use starlab_server::s3_store::S3ObjectStore;
use starlab_server::{AppState, router};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file (from crate directory or parent directories)
    dotenvy::dotenv().ok();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().or_else(|_| {
        tracing_subscriber::EnvFilter::try_new("starlab_server=info,starlab_core=info")
    })?;
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Starlab Server");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        e
    })?;

    info!(
        http_addr = %config.http_addr,
        calculation_mode = ?config.calculation_mode,
        bucket = %config.s3_bucket,
        "Configuration loaded"
    );

    // Connect to database
    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await?;
    info!("Database connection established");

    info!("Running database migrations...");
    starlab_core::migrations::run_postgres(&pool).await?;
    info!("Migrations completed");

    // Collaborators
    let blacklist = Arc::new(RedisBlacklist::connect(&config.redis_url).await?);
    let objects = Arc::new(
        S3ObjectStore::new(&config.s3_endpoint, &config.s3_bucket, &config.s3_public_url).await,
    );
    let mode = match config.calculation_mode {
        CalculationModeConfig::Sync => CalculationMode::Sync,
        CalculationModeConfig::Async => {
            let client = HttpComputeClient::new(&config.compute_url, config.compute_timeout)?;
            info!(endpoint = client.endpoint(), "Dispatching calculations to compute service");
            CalculationMode::Async(Arc::new(client))
        }
    };

    // Shared handler states
    let persistence: Arc<dyn Persistence> = Arc::new(PostgresPersistence::new(pool.clone()));
    let tokens = Arc::new(TokenAuthority::new(
        config.jwt_secret.as_bytes(),
        config.jwt_ttl,
        blacklist,
    ));
    let state = AppState {
        lifecycle: Arc::new(LifecycleHandlerState::new(persistence.clone(), mode)),
        catalog: Arc::new(CatalogHandlerState::new(persistence.clone(), objects)),
        accounts: Arc::new(AccountHandlerState::new(persistence, tokens.clone())),
        tokens,
        callback_token: config.callback_token.as_str().into(),
    };

    info!("Starlab Server initialized successfully");

    let listener = TcpListener::bind(config.http_addr).await?;
    info!("Listening at http://{}", config.http_addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutting down...");
        })
        .await?;

    pool.close().await;
    info!("Shutdown complete");

    Ok(())
}
