use serde::{Deserialize, Serialize};

/// Who a history entry is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryRole {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub role: HistoryRole,
    pub content: String,
}

/// Conversational context handed to the planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: HistoryRole, content: impl Into<String>) {
        self.entries.push(HistoryEntry {
            role,
            content: content.into(),
        });
    }

    pub fn user(&mut self, content: impl Into<String>) {
        self.push(HistoryRole::User, content);
    }

    pub fn assistant(&mut self, content: impl Into<String>) {
        self.push(HistoryRole::Assistant, content);
    }

    pub fn system(&mut self, content: impl Into<String>) {
        self.push(HistoryRole::System, content);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn last(&self) -> Option<&HistoryEntry> {
        self.entries.last()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
