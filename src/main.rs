// SPDX-License-Identifier: MIT

//! Stamp-Rally API Server
//!
//! Serves the check-in admission engine: token issuance, check-in
//! recording, contact verification and reward status.

use stamp_rally::{
    config::Config,
    db::MemoryDb,
    middleware::identity::StoredIdentityProvider,
    services::{
        ActivityCatalog, AdmissionEngine, HttpRewardBoundary, LogDispatcher, RewardService,
        TokenIssuer, VerificationGate,
    },
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");
    tracing::info!(port = config.port, "Starting Stamp-Rally API");

    // Load the activity catalog
    tracing::info!(path = %config.activities_path, "Loading activity catalog");
    let catalog = ActivityCatalog::load_from_file(&config.activities_path)
        .expect("Failed to load activity catalog");

    let db = MemoryDb::new();

    let reward_boundary = Arc::new(
        HttpRewardBoundary::new(std::time::Duration::from_secs(
            config.reward_http_timeout_secs,
        ))
        .expect("Failed to build reward API client"),
    );

    // Build shared state
    let state = Arc::new(AppState {
        config: config.clone(),
        db: db.clone(),
        catalog,
        identity: Arc::new(StoredIdentityProvider::new(db.clone())),
        issuer: TokenIssuer::new(db.clone()),
        admission: AdmissionEngine::new(db.clone()),
        verification: VerificationGate::new(db.clone(), Arc::new(LogDispatcher)),
        rewards: RewardService::new(db, reward_boundary),
    });

    // Build router
    let app = stamp_rally::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging.
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("stamp_rally=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .with(format)
        .init();
}
