pub mod local;

use crate::config::BoardColumns;
use crate::types::{Card, CardPatch, NewCard, ReorderRequest, ValidationError};

/// Durable card store. The single source of truth for `column_id`/`order`.
/// Every mutation is all-or-nothing and leaves each column dense.
pub trait CardStorage: Send + Sync {
    fn columns(&self) -> &BoardColumns;

    /// All cards, sorted by column (configured order) then rank.
    fn list_cards(&self) -> Vec<Card>;

    fn get_card(&self, card_id: &str) -> Option<Card>;

    /// Counter bumped on every effective change. Restarts with the process.
    fn version(&self) -> u64;

    /// Hash of the current card set. Stable across restarts, so it is what
    /// HTTP ETags are built from.
    fn content_hash(&self) -> String;

    /// Insert a card at the end of its column.
    fn create_card(&self, new_card: NewCard) -> Result<Card, StorageError>;

    /// Patch a card. A patch carrying `order` is applied as a planned move.
    fn update_card(&self, card_id: &str, patch: &CardPatch) -> Result<UpdatedCard, StorageError>;

    /// Remove a card and close the gap it leaves in its column.
    fn delete_card(&self, card_id: &str) -> Result<Card, StorageError>;

    /// Rewrite one column's full ordering as a single batch.
    /// Returns the number of cards whose position changed.
    fn commit_order(&self, request: &ReorderRequest) -> Result<usize, StorageError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct UpdatedCard {
    pub card: Card,
    /// True when the patch moved the card (and shifted its neighbours).
    pub repositioned: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Stale reference in column {column_id}: unknown cards {missing:?}")]
    StaleReference {
        column_id: String,
        missing: Vec<String>,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Failures of the persistence layer itself; the request may succeed later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Io(_))
    }
}
