/// Push-channel messages sent from the server to every connected client.
///
/// One event per successful mutation, published after the store commit.
/// `OrderingChanged` carries no diff: receivers re-fetch the full card list.
use serde::{Deserialize, Serialize};

use crate::types::Card;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BoardEvent {
    CardChanged {
        card: Card,
    },
    CardRemoved {
        #[serde(rename = "cardId")]
        card_id: String,
    },
    OrderingChanged,
}

impl BoardEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            BoardEvent::CardChanged { .. } => "cardChanged",
            BoardEvent::CardRemoved { .. } => "cardRemoved",
            BoardEvent::OrderingChanged => "orderingChanged",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_format() {
        let removed = serde_json::to_value(BoardEvent::CardRemoved {
            card_id: "c1".into(),
        })
        .unwrap();
        assert_eq!(removed, serde_json::json!({"type": "cardRemoved", "cardId": "c1"}));

        let ordering = serde_json::to_string(&BoardEvent::OrderingChanged).unwrap();
        assert_eq!(ordering, r#"{"type":"orderingChanged"}"#);

        let changed = serde_json::to_value(BoardEvent::CardChanged {
            card: Card::new("c2", "Task", "Done", 1),
        })
        .unwrap();
        assert_eq!(changed["type"], "cardChanged");
        assert_eq!(changed["card"]["columnId"], "Done");
    }

    #[test]
    fn test_parse_from_json() {
        let event: BoardEvent = serde_json::from_str(r#"{"type":"orderingChanged"}"#).unwrap();
        assert_eq!(event, BoardEvent::OrderingChanged);
        assert_eq!(event.kind(), "orderingChanged");
    }
}
