//! Taskboard backend: config loading, store init, HTTP + push server.

pub mod api;
pub mod board_client;
pub mod config;
pub mod logging;
mod push_ws;
pub mod server;
pub mod state;

use crate::config::ConfigError;
use crate::state::AppState;
use std::path::Path;
use std::sync::Arc;
use taskboard_core::broadcast::ChangeBroadcaster;
use taskboard_core::gateway::PersistenceGateway;
use taskboard_core::storage::local::LocalCardStore;
use taskboard_core::storage::{CardStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    #[error("Invalid config: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to open card store: {0}")]
    Storage(#[from] StorageError),

    #[error("Failed to start server: {0}")]
    Io(#[from] std::io::Error),
}

/// Serve the board described by the config at `config_path` until Ctrl-C.
pub async fn run(config_path: &Path) -> Result<(), StartupError> {
    let config = config::load_config(config_path);
    config.validate()?;

    let data_file = config.data_file_path();
    let store = LocalCardStore::open(&data_file, config.columns.clone())?;
    log::info!(
        target: "taskboard.server",
        "Loaded {} cards from {}",
        store.list_cards().len(),
        data_file.display()
    );

    let app_state = AppState {
        gateway: PersistenceGateway::new(
            Arc::new(store),
            ChangeBroadcaster::new(config.event_buffer),
        ),
        port: config.port,
        bind_address: config.bind_address.clone(),
    };

    let (_port, handle) = server::spawn_server(app_state, shutdown_signal()).await?;
    if let Err(e) = handle.await {
        log::error!(target: "taskboard.server", "Server task failed: {}", e);
    }
    log::info!(target: "taskboard.server", "Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => log::info!(target: "taskboard.server", "Shutdown signal received"),
        Err(e) => {
            log::error!(target: "taskboard.server", "Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    }
}
