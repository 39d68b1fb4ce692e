//! Application setup and initialization

pub mod routes;
pub mod server;

use crate::auth::StaticTokenAccess;
use crate::state::AppState;
use anyhow::{Context, Result};
use depot_core::{Config, TracingNotifier};
use depot_engine::Depot;
use depot_storage::DiskSpaceGate;
use std::sync::Arc;

/// Build the engine from configuration and wire the router around it.
pub async fn initialize_app(config: Config) -> Result<(Arc<AppState>, axum::Router)> {
    config
        .validate()
        .context("Configuration validation failed")?;

    let depot = Depot::from_config(
        &config,
        Arc::new(DiskSpaceGate::new(config.min_free_bytes)),
        Arc::new(StaticTokenAccess::from_config(&config)),
        Arc::new(TracingNotifier),
    )
    .await
    .context("Failed to build repositories")?;

    let repositories = depot.registry().snapshot().names().join(",");
    tracing::info!(
        storage_path = %config.storage_path.display(),
        repositories = %repositories,
        "Repositories ready"
    );

    let state = Arc::new(AppState::new(Arc::new(depot), config));
    let router = routes::setup_routes(state.clone());
    Ok((state, router))
}
