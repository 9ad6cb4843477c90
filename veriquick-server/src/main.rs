//! Veriquick Server - REST API for identity document intake
//!
//! Exposes veriquick-core functionality via HTTP endpoints:
//! - POST /intake - Store and classify a batch, return its QR manifest
//! - POST /decode - Read a manifest back from a QR image

use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;

use tracing_subscriber::EnvFilter;
use veriquick_core::{DocumentStore, DropboxConfig, DropboxStore, MemoryStore};
use veriquick_server::{create_router_with_state, AppState, Config, StorageKind};

/// Build the configured store. An unset STORAGE_ROOT falls back to DROPBOX_ROOT.
fn build_store(config: &mut Config) -> veriquick_core::Result<Arc<dyn DocumentStore>> {
    match config.storage {
        StorageKind::Memory => {
            tracing::warn!("Storage: in-memory, links are not reachable outside this process");
            Ok(Arc::new(MemoryStore::new()))
        }
        StorageKind::Dropbox => {
            let dropbox = DropboxConfig::from_env()?;
            if config.storage_root.is_empty() {
                config.storage_root = dropbox.root.clone();
            }
            Ok(Arc::new(DropboxStore::new(dropbox)?))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("veriquick_server=info,veriquick_core=info,tower_http=info")),
        )
        .init();

    let mut config = Config::from_env();

    let store = match build_store(&mut config) {
        Ok(store) => store,
        Err(e) => {
            tracing::error!(error = %e, "Failed to configure storage backend");
            return ExitCode::FAILURE;
        }
    };
    let state = AppState::new(store, &config);
    let app = create_router_with_state(&config, state);

    let addr = config.socket_addr();
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(%addr, error = %e, "Failed to bind");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!(
        %addr,
        storage = ?config.storage,
        ec_level = %config.barcode.level,
        "Veriquick server listening (docs at /docs)"
    );

    // Connect info is needed by the rate limiter's peer IP key extractor
    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await
    {
        tracing::error!(error = %e, "Server error");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
