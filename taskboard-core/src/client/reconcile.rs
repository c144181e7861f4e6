use super::snapshot::BoardSnapshot;
use crate::events::BoardEvent;
use crate::position::densify_column;

/// What applying a push event did to a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    Applied,
    /// The event was already reflected (duplicate or echo of our own write).
    Unchanged,
    /// The event carries no data; the caller must re-fetch the board.
    ReloadRequired,
}

impl BoardSnapshot {
    /// Merge one push event. Fine-grained events are idempotent;
    /// `OrderingChanged` is left to the caller's full reload.
    pub fn apply_event(&mut self, event: &BoardEvent) -> Reconciliation {
        match event {
            BoardEvent::CardChanged { card } => {
                match self.cards.iter_mut().find(|c| c.id == card.id) {
                    Some(existing) if existing == card => Reconciliation::Unchanged,
                    Some(existing) => {
                        *existing = card.clone();
                        Reconciliation::Applied
                    }
                    None => {
                        self.cards.push(card.clone());
                        Reconciliation::Applied
                    }
                }
            }
            BoardEvent::CardRemoved { card_id } => {
                let Some(index) = self.cards.iter().position(|c| &c.id == card_id) else {
                    return Reconciliation::Unchanged;
                };
                let removed = self.cards.remove(index);
                // The store closes the gap in the same write; mirror it.
                densify_column(&mut self.cards, &removed.column_id);
                Reconciliation::Applied
            }
            BoardEvent::OrderingChanged => Reconciliation::ReloadRequired,
        }
    }
}
