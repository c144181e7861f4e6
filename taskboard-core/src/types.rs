use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::BoardColumns;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

/// A card as persisted by the store and seen by every client.
///
/// `column_id` and `order` are the only fields the ordering core reads;
/// everything else is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub column_id: String,
    pub order: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Card {
    pub fn new(id: &str, title: &str, column_id: &str, order: u32) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            title: title.to_string(),
            description: None,
            column_id: column_id.to_string(),
            order,
            assignee: None,
            due_date: None,
            priority: Priority::default(),
            tags: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Title must not be empty")]
    BlankTitle,

    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Moving card {card_id} from {from} to {to} requires an explicit order")]
    AmbiguousMove {
        card_id: String,
        from: String,
        to: String,
    },

    #[error("Card {0} listed more than once")]
    DuplicateCardId(String),
}

/// Body of a create request. Position is always assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct NewCard {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
}

impl NewCard {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            ..Self::default()
        }
    }

    pub fn in_column(mut self, column_id: &str) -> Self {
        self.column_id = Some(column_id.to_string());
        self
    }

    /// Check the request against the configured columns and resolve the
    /// target column (first configured column when none was given).
    pub fn validate(&self, columns: &BoardColumns) -> Result<String, ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::BlankTitle);
        }
        match &self.column_id {
            Some(column_id) if columns.contains(column_id) => Ok(column_id.clone()),
            Some(column_id) => Err(ValidationError::UnknownColumn(column_id.clone())),
            None => columns
                .first()
                .map(|c| c.id.clone())
                .ok_or_else(|| ValidationError::UnknownColumn(String::new())),
        }
    }

    /// Build the stored card. `order` is the current length of the column.
    pub fn into_card(self, id: String, column_id: String, order: u32) -> Card {
        let now = Utc::now();
        Card {
            id,
            title: self.title.trim().to_string(),
            description: non_blank(self.description),
            column_id,
            order,
            assignee: non_blank(self.assignee),
            due_date: self.due_date,
            priority: self.priority.unwrap_or_default(),
            tags: clean_tags(self.tags.unwrap_or_default()),
            created_at: now,
            updated_at: now,
        }
    }
}

/// Body of an update request. Absent fields are left unchanged; an empty
/// string clears an optional text field and `"dueDate": null` clears the date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct CardPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_or_null",
        skip_serializing_if = "Option::is_none"
    )]
    pub due_date: Option<Option<NaiveDate>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<u32>,
}

impl CardPatch {
    /// Validate against the card being patched. Returns the requested
    /// position `(column, index)` when the patch repositions the card.
    pub fn validate(
        &self,
        current: &Card,
        columns: &BoardColumns,
    ) -> Result<Option<(String, usize)>, ValidationError> {
        if let Some(title) = &self.title {
            if title.trim().is_empty() {
                return Err(ValidationError::BlankTitle);
            }
        }
        if let Some(column_id) = &self.column_id {
            if !columns.contains(column_id) {
                return Err(ValidationError::UnknownColumn(column_id.clone()));
            }
        }
        let target_column = self
            .column_id
            .clone()
            .unwrap_or_else(|| current.column_id.clone());
        match self.order {
            Some(order) => Ok(Some((target_column, order as usize))),
            None if target_column != current.column_id => Err(ValidationError::AmbiguousMove {
                card_id: current.id.clone(),
                from: current.column_id.clone(),
                to: target_column,
            }),
            None => Ok(None),
        }
    }

    /// Copy the content fields onto `card`. Position fields are ignored here;
    /// the store routes them through the reorder planner.
    pub fn apply_content(&self, card: &mut Card) {
        if let Some(title) = &self.title {
            card.title = title.trim().to_string();
        }
        if let Some(description) = &self.description {
            card.description = non_blank(Some(description.clone()));
        }
        if let Some(assignee) = &self.assignee {
            card.assignee = non_blank(Some(assignee.clone()));
        }
        if let Some(due_date) = self.due_date {
            card.due_date = due_date;
        }
        if let Some(priority) = self.priority {
            card.priority = priority;
        }
        if let Some(tags) = &self.tags {
            card.tags = clean_tags(tags.clone());
        }
        card.updated_at = Utc::now();
    }
}

/// Body of a reorder request: the full post-move sequence of one column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReorderRequest {
    pub column_id: String,
    pub card_ids: Vec<String>,
}

impl ReorderRequest {
    pub fn validate(&self, columns: &BoardColumns) -> Result<(), ValidationError> {
        if !columns.contains(&self.column_id) {
            return Err(ValidationError::UnknownColumn(self.column_id.clone()));
        }
        let mut seen = std::collections::HashSet::new();
        for id in &self.card_ids {
            if !seen.insert(id.as_str()) {
                return Err(ValidationError::DuplicateCardId(id.clone()));
            }
        }
        Ok(())
    }
}

/// A field that was present: `Some(None)` for an explicit null. Absent
/// fields never reach this and fall back to `default` (`None`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn clean_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().to_string();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}
