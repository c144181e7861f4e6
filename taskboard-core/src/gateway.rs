/// Persistence gateway: the write/read surface clients use, and the server
/// side wiring that publishes one event per successful mutation.
use std::future::Future;
use std::sync::Arc;

use crate::broadcast::ChangeBroadcaster;
use crate::config::BoardColumns;
use crate::events::BoardEvent;
use crate::storage::{CardStorage, StorageError};
use crate::types::{Card, CardPatch, NewCard, ReorderRequest};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("Persistence unavailable: {0}")]
    Retryable(String),

    #[error("Stale reference: unknown cards {0:?}")]
    StaleReference(Vec<String>),

    #[error("Card not found: {0}")]
    NotFound(String),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl GatewayError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Retryable(_))
    }
}

impl From<StorageError> for GatewayError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::CardNotFound(id) => GatewayError::NotFound(id),
            StorageError::StaleReference { missing, .. } => GatewayError::StaleReference(missing),
            StorageError::Invalid(v) => GatewayError::Rejected(v.to_string()),
            StorageError::Io(e) => GatewayError::Retryable(e.to_string()),
            StorageError::Serialization(e) => GatewayError::Retryable(e.to_string()),
        }
    }
}

/// What a client needs from the server. Implemented in-process by
/// [`PersistenceGateway`] and over HTTP by the backend's client.
pub trait CardGateway: Send + Sync {
    fn list_cards(&self) -> impl Future<Output = Result<Vec<Card>, GatewayError>> + Send;

    fn create_card(
        &self,
        new_card: NewCard,
    ) -> impl Future<Output = Result<Card, GatewayError>> + Send;

    fn update_card(
        &self,
        card_id: &str,
        patch: CardPatch,
    ) -> impl Future<Output = Result<Card, GatewayError>> + Send;

    fn delete_card(&self, card_id: &str) -> impl Future<Output = Result<(), GatewayError>> + Send;

    fn commit_order(
        &self,
        column_id: &str,
        card_ids: Vec<String>,
    ) -> impl Future<Output = Result<(), GatewayError>> + Send;
}

/// A store plus the broadcaster its commits feed.
pub struct PersistenceGateway<S> {
    storage: Arc<S>,
    broadcaster: ChangeBroadcaster,
}

impl<S> Clone for PersistenceGateway<S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            broadcaster: self.broadcaster.clone(),
        }
    }
}

impl<S: CardStorage> PersistenceGateway<S> {
    pub fn new(storage: Arc<S>, broadcaster: ChangeBroadcaster) -> Self {
        Self {
            storage,
            broadcaster,
        }
    }

    pub fn broadcaster(&self) -> &ChangeBroadcaster {
        &self.broadcaster
    }

    pub fn columns(&self) -> &BoardColumns {
        self.storage.columns()
    }

    pub fn version(&self) -> u64 {
        self.storage.version()
    }

    pub fn content_hash(&self) -> String {
        self.storage.content_hash()
    }

    pub fn list(&self) -> Vec<Card> {
        self.storage.list_cards()
    }

    pub fn create(&self, new_card: NewCard) -> Result<Card, StorageError> {
        let card = self.storage.create_card(new_card)?;
        self.broadcaster
            .publish(BoardEvent::CardChanged { card: card.clone() });
        Ok(card)
    }

    /// A patch that repositioned cards is announced as an ordering change,
    /// since neighbours moved too.
    pub fn update(&self, card_id: &str, patch: &CardPatch) -> Result<Card, StorageError> {
        let updated = self.storage.update_card(card_id, patch)?;
        let event = if updated.repositioned {
            BoardEvent::OrderingChanged
        } else {
            BoardEvent::CardChanged {
                card: updated.card.clone(),
            }
        };
        self.broadcaster.publish(event);
        Ok(updated.card)
    }

    pub fn delete(&self, card_id: &str) -> Result<(), StorageError> {
        let removed = self.storage.delete_card(card_id)?;
        self.broadcaster.publish(BoardEvent::CardRemoved {
            card_id: removed.id,
        });
        Ok(())
    }

    pub fn reorder(&self, request: &ReorderRequest) -> Result<(), StorageError> {
        self.storage.commit_order(request)?;
        self.broadcaster.publish(BoardEvent::OrderingChanged);
        Ok(())
    }
}

impl<S: CardStorage> CardGateway for PersistenceGateway<S> {
    async fn list_cards(&self) -> Result<Vec<Card>, GatewayError> {
        Ok(self.list())
    }

    async fn create_card(&self, new_card: NewCard) -> Result<Card, GatewayError> {
        Ok(self.create(new_card)?)
    }

    async fn update_card(&self, card_id: &str, patch: CardPatch) -> Result<Card, GatewayError> {
        Ok(self.update(card_id, &patch)?)
    }

    async fn delete_card(&self, card_id: &str) -> Result<(), GatewayError> {
        Ok(self.delete(card_id)?)
    }

    async fn commit_order(&self, column_id: &str, card_ids: Vec<String>) -> Result<(), GatewayError> {
        let request = ReorderRequest {
            column_id: column_id.to_string(),
            card_ids,
        };
        Ok(self.reorder(&request)?)
    }
}
