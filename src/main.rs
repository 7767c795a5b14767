// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Weather Logger API Server
//!
//! Records manual weather observations and manages the observers who
//! submit them.

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use weather_logger::{config::Config, db::Database, services::GoogleVerifier, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        environment = %config.environment,
        "Starting Weather Logger API"
    );

    let db = Database::connect(config.gcp_project_id.as_deref()).await?;

    let google = GoogleVerifier::new(&config)?;

    let state = Arc::new(AppState::new(config.clone(), db, google));

    // Bootstrap the local admin account
    if let Err(e) = state.identity.ensure_default_admin(&config).await {
        tracing::error!(error = %e, "Failed to create default admin user");
    }

    let app = weather_logger::routes::create_router(state);

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

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("weather_logger=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
