/// Reorder planner: turns a drag-and-drop move into the full, normalized
/// ordering of every column it touches.
///
/// Pure: reads the pre-move cards, never mutates them. The result is what
/// the optimistic snapshot applies and what the client sends to the store
/// (one commit per assignment).
use serde::{Deserialize, Serialize};

use crate::position::{column_sequence, normalize, ColumnAssignment};
use crate::types::Card;

/// A completed drag: the card, where it was picked up, and where it landed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DragMove {
    pub card_id: String,
    pub source_column: String,
    pub destination_column: String,
    pub destination_index: usize,
}

impl DragMove {
    pub fn new(card_id: &str, source: &str, destination: &str, index: usize) -> Self {
        Self {
            card_id: card_id.to_string(),
            source_column: source.to_string(),
            destination_column: destination.to_string(),
            destination_index: index,
        }
    }
}

/// New orderings produced by one move. `source` is only present for
/// cross-column moves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReorderPlan {
    pub destination: ColumnAssignment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<ColumnAssignment>,
}

impl ReorderPlan {
    /// Assignments in commit order: destination first, then source.
    pub fn assignments(&self) -> impl Iterator<Item = &ColumnAssignment> {
        std::iter::once(&self.destination).chain(self.source.iter())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlanError {
    #[error("Stale move: card {card_id} is not in column {column_id}")]
    StaleMove { card_id: String, column_id: String },
}

/// Compute the plan for `drag` over `cards`.
///
/// Returns `Ok(None)` when the card would land where it already is. An index
/// past the end of the destination clamps to append. A card missing from
/// `cards`, or not found in the stated source column, is a stale move.
pub fn plan_move(cards: &[Card], drag: &DragMove) -> Result<Option<ReorderPlan>, PlanError> {
    let moved = cards
        .iter()
        .find(|c| c.id == drag.card_id && c.column_id == drag.source_column)
        .ok_or_else(|| PlanError::StaleMove {
            card_id: drag.card_id.clone(),
            column_id: drag.source_column.clone(),
        })?;

    let current_index = column_sequence(cards, &moved.column_id)
        .iter()
        .position(|id| id == &moved.id)
        .unwrap_or_default();

    let remaining: Vec<Card> = cards
        .iter()
        .filter(|c| c.id != drag.card_id)
        .cloned()
        .collect();

    let mut destination = column_sequence(&remaining, &drag.destination_column);
    let index = drag.destination_index.min(destination.len());

    if drag.destination_column == moved.column_id && index == current_index {
        return Ok(None);
    }

    destination.insert(index, drag.card_id.clone());
    let destination = normalize(&drag.destination_column, &destination);

    let source = (drag.source_column != drag.destination_column).then(|| {
        normalize(
            &drag.source_column,
            &column_sequence(&remaining, &drag.source_column),
        )
    });

    Ok(Some(ReorderPlan {
        destination,
        source,
    }))
}
