// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! srg-backend API Server
//!
//! Mirrors Strava activities into Firestore (or memory for local runs) and
//! serves them to the report frontend.

use srg_backend::{
    config::{Config, StoreBackend},
    db::{FirestoreDb, MemoryStore, SharedActivityStore, SharedTokenStore},
    services::StravaClient,
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize structured JSON logging for GCP
    init_logging();

    // Load configuration from environment
    let config = Config::from_env()?;
    tracing::info!(
        port = config.port,
        backend = ?config.store_backend,
        "Starting srg-backend API"
    );

    let (token_store, activity_store): (SharedTokenStore, SharedActivityStore) =
        match config.store_backend {
            StoreBackend::Firestore => {
                let db = FirestoreDb::new(&config.gcp_project_id).await?;
                (Arc::new(db.clone()), Arc::new(db))
            }
            StoreBackend::Memory => {
                tracing::warn!("Using in-memory store; data is lost on restart");
                let store = MemoryStore::new();
                (Arc::new(store.clone()), Arc::new(store))
            }
        };

    let strava = StravaClient::new(
        config.strava_client_id.clone(),
        config.strava_client_secret.clone(),
        config.upstream_timeout,
    )?;

    // Build shared state
    let port = config.port;
    let state = Arc::new(AppState::new(
        config,
        token_store,
        activity_store,
        Arc::new(strava),
    ));

    // Build router
    let app = srg_backend::routes::create_router(state);

    // Start server
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(address = %addr, "Server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Initialize structured JSON logging (GCP-compliant).
fn init_logging() {
    let format = tracing_subscriber::fmt::layer()
        .json()
        .with_target(false)
        .with_current_span(true)
        .flatten_event(true);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("srg_backend=debug,info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(format)
        .init();
}
