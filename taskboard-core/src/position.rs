/// Card positions: `(column_id, order)` pairs where, per column, the orders
/// are exactly `0..n`.
///
/// Every writer in the crate (store, optimistic snapshot, reconciler) goes
/// through the helpers here so the density rule lives in one place.
use serde::{Deserialize, Serialize};

use crate::config::BoardColumns;
use crate::types::Card;

/// Normalized ordering of one column: card ids paired with their rank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnAssignment {
    pub column_id: String,
    pub ranks: Vec<(String, u32)>,
}

impl ColumnAssignment {
    pub fn card_ids(&self) -> Vec<String> {
        self.ranks.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn rank_of(&self, card_id: &str) -> Option<u32> {
        self.ranks
            .iter()
            .find(|(id, _)| id == card_id)
            .map(|(_, rank)| *rank)
    }

    pub fn len(&self) -> usize {
        self.ranks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranks.is_empty()
    }
}

/// Map a column's desired card sequence to ranks: rank = index.
pub fn normalize<S: AsRef<str>>(column_id: &str, ordered_card_ids: &[S]) -> ColumnAssignment {
    ColumnAssignment {
        column_id: column_id.to_string(),
        ranks: ordered_card_ids
            .iter()
            .enumerate()
            .map(|(rank, id)| (id.as_ref().to_string(), rank as u32))
            .collect(),
    }
}

/// Cards of one column in display order. Ties keep their slice order.
pub fn column_cards<'a>(cards: &'a [Card], column_id: &str) -> Vec<&'a Card> {
    let mut column: Vec<&Card> = cards.iter().filter(|c| c.column_id == column_id).collect();
    column.sort_by_key(|c| c.order);
    column
}

/// Card ids of one column in display order.
pub fn column_sequence(cards: &[Card], column_id: &str) -> Vec<String> {
    column_cards(cards, column_id)
        .into_iter()
        .map(|c| c.id.clone())
        .collect()
}

pub fn is_dense(cards: &[Card], column_id: &str) -> bool {
    column_cards(cards, column_id)
        .iter()
        .enumerate()
        .all(|(index, card)| card.order as usize == index)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PositionViolation {
    NotDense { column_id: String, orders: Vec<u32> },
    UnknownColumn { card_id: String, column_id: String },
}

/// Check density per column and column membership of every card.
pub fn check_board(cards: &[Card], columns: &BoardColumns) -> Vec<PositionViolation> {
    let mut violations = Vec::new();
    for card in cards {
        if !columns.contains(&card.column_id) {
            violations.push(PositionViolation::UnknownColumn {
                card_id: card.id.clone(),
                column_id: card.column_id.clone(),
            });
        }
    }
    let mut seen: Vec<&str> = Vec::new();
    for card in cards {
        if seen.contains(&card.column_id.as_str()) {
            continue;
        }
        seen.push(&card.column_id);
        if !is_dense(cards, &card.column_id) {
            violations.push(PositionViolation::NotDense {
                column_id: card.column_id.clone(),
                orders: column_cards(cards, &card.column_id)
                    .iter()
                    .map(|c| c.order)
                    .collect(),
            });
        }
    }
    violations
}

/// Write an assignment onto the cards it names. Ids not present in `cards`
/// are skipped. Returns true if any card changed.
pub fn apply_assignment(cards: &mut [Card], assignment: &ColumnAssignment) -> bool {
    let mut changed = false;
    for (id, rank) in &assignment.ranks {
        if let Some(card) = cards.iter_mut().find(|c| &c.id == id) {
            if card.column_id != assignment.column_id || card.order != *rank {
                card.column_id = assignment.column_id.clone();
                card.order = *rank;
                changed = true;
            }
        }
    }
    changed
}

/// Re-rank one column to `0..n`, keeping relative order.
pub fn densify_column(cards: &mut [Card], column_id: &str) -> bool {
    let sequence = column_sequence(cards, column_id);
    apply_assignment(cards, &normalize(column_id, &sequence))
}

/// Re-rank every column present in `cards`.
pub fn densify_all(cards: &mut [Card]) -> bool {
    let mut columns: Vec<String> = cards.iter().map(|c| c.column_id.clone()).collect();
    columns.sort();
    columns.dedup();
    let mut changed = false;
    for column_id in &columns {
        changed |= densify_column(cards, column_id);
    }
    changed
}
