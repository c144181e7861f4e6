use crate::planner::{plan_move, DragMove, PlanError, ReorderPlan};
use crate::position::{apply_assignment, column_cards};
use crate::types::Card;

/// A client's cached copy of the board.
///
/// Owned by exactly one session. Changes only through [`apply_plan`]
/// (optimistic moves), [`apply_event`] (push events) and [`replace_all`]
/// (authoritative reload).
///
/// [`apply_plan`]: BoardSnapshot::apply_plan
/// [`apply_event`]: BoardSnapshot::apply_event
/// [`replace_all`]: BoardSnapshot::replace_all
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BoardSnapshot {
    pub(super) cards: Vec<Card>,
}

impl BoardSnapshot {
    pub fn new(cards: Vec<Card>) -> Self {
        Self { cards }
    }

    pub fn cards(&self) -> &[Card] {
        &self.cards
    }

    pub fn get(&self, card_id: &str) -> Option<&Card> {
        self.cards.iter().find(|c| c.id == card_id)
    }

    /// Cards of one column in display order.
    pub fn column(&self, column_id: &str) -> Vec<&Card> {
        column_cards(&self.cards, column_id)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// `(card id, column, order)` for every card, sorted by id. Two snapshots
    /// that agree here render the same board.
    pub fn positions(&self) -> Vec<(String, String, u32)> {
        let mut positions: Vec<_> = self
            .cards
            .iter()
            .map(|c| (c.id.clone(), c.column_id.clone(), c.order))
            .collect();
        positions.sort();
        positions
    }

    pub fn plan(&self, drag: &DragMove) -> Result<Option<ReorderPlan>, PlanError> {
        plan_move(&self.cards, drag)
    }

    /// Apply a plan locally, before the store has confirmed it.
    /// Applying the same plan again changes nothing.
    pub fn apply_plan(&mut self, plan: &ReorderPlan) -> bool {
        let mut changed = false;
        for assignment in plan.assignments() {
            changed |= apply_assignment(&mut self.cards, assignment);
        }
        changed
    }

    /// Drop every local guess and take the server's card set as-is.
    pub fn replace_all(&mut self, cards: Vec<Card>) {
        self.cards = cards;
    }
}
