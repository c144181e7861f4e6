/// Column configuration shared by the server and its clients.
use serde::{Deserialize, Serialize};

/// One board lane. Columns are configured, never created by the board itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub id: String,
    pub title: String,
}

impl ColumnDef {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            title: id.to_string(),
        }
    }
}

/// The fixed, ordered set of columns a board shows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BoardColumns(Vec<ColumnDef>);

impl BoardColumns {
    pub fn new(columns: Vec<ColumnDef>) -> Self {
        Self(columns)
    }

    pub fn contains(&self, column_id: &str) -> bool {
        self.0.iter().any(|c| c.id == column_id)
    }

    pub fn first(&self) -> Option<&ColumnDef> {
        self.0.first()
    }

    /// Display position of a column; unknown columns sort last.
    pub fn position(&self, column_id: &str) -> usize {
        self.0
            .iter()
            .position(|c| c.id == column_id)
            .unwrap_or(self.0.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDef> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for BoardColumns {
    fn default() -> Self {
        Self(vec![
            ColumnDef::new("To Do"),
            ColumnDef::new("In Progress"),
            ColumnDef::new("Done"),
        ])
    }
}
