/// Shared application state passed to axum handlers.

use taskboard_core::broadcast::ChangeBroadcaster;
use taskboard_core::gateway::PersistenceGateway;
use taskboard_core::storage::local::LocalCardStore;

pub type BoardGateway = PersistenceGateway<LocalCardStore>;

#[derive(Clone)]
pub struct AppState {
    pub gateway: BoardGateway,
    pub port: u16,
    pub bind_address: String,
}

impl AppState {
    pub fn broadcaster(&self) -> &ChangeBroadcaster {
        self.gateway.broadcaster()
    }
}
