//! Listener and shutdown handling for the depot binary.

use anyhow::{Context, Result};
use axum::Router;
use depot_core::Config;
use std::net::SocketAddr;

/// Serve `app` on every interface until Ctrl+C or SIGTERM. Requests already
/// accepted, uploads included, run to completion before this returns.
pub async fn start_server(config: &Config, app: Router) -> Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server_port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(
        addr = %addr,
        environment = %config.environment,
        storage_path = %config.storage_path.display(),
        min_free_mb = config.min_free_bytes / 1024 / 1024,
        connect_timeout_secs = config.default_connect_timeout_secs,
        read_timeout_secs = config.default_read_timeout_secs,
        "Depot listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let reason = stop_requested().await;
            tracing::info!(reason, "Draining in-flight requests");
        })
        .await?;

    tracing::info!("Depot stopped");
    Ok(())
}

/// Waits for the first stop signal and names it. Panics if a handler cannot
/// be installed.
async fn stop_requested() -> &'static str {
    let interrupt = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "interrupt",
        _ = terminate => "terminate",
    }
}
