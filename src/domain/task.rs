use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use super::timeutil::Timestamp;

/// Opaque task identifier. Seeded tasks use short numeric ids, tasks created
/// at runtime get a UUID; both are plain strings on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

impl From<String> for TaskId {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Incomplete,
    Complete,
}

impl TaskStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Incomplete => Self::Complete,
            Self::Complete => Self::Incomplete,
        }
    }

    pub fn is_complete(self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Incomplete => "Incomplete",
            Self::Complete => "Complete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn label(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Priority as written in the stored record. Levels are matched ignoring
/// case and surrounding space; other values are kept and carry no level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoredPriority(String);

impl StoredPriority {
    pub fn level(&self) -> Option<Priority> {
        match self.0.trim().to_lowercase().as_str() {
            "low" => Some(Priority::Low),
            "medium" => Some(Priority::Medium),
            "high" => Some(Priority::High),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<Priority> for StoredPriority {
    fn from(level: Priority) -> Self {
        Self(level.label().to_owned())
    }
}

impl From<&str> for StoredPriority {
    fn from(raw: &str) -> Self {
        Self(raw.to_owned())
    }
}

/// One record of the persisted collection.
///
/// Field names follow the stored JSON shape (`_id`, `dueDate`, `updatedAt`).
/// Fields this type does not know about are kept in `extra` and written back
/// untouched, so a collection written by another client survives a round trip.
/// Priority and timestamps keep their stored text for the same reason.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id")]
    pub id: TaskId,
    pub title: String,
    pub description: String,
    pub status: TaskStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<StoredPriority>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<Timestamp>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<Timestamp>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: TaskId::generate(),
            title: title.into(),
            description: description.into(),
            status: TaskStatus::Incomplete,
            priority: None,
            due_date: None,
            updated_at: None,
            extra: Map::new(),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status.is_complete()
    }
}

/// The whole collection as one unit: what gets written to the slot and what
/// travels in a change announcement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot(Vec<Task>);

impl Snapshot {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }

    pub fn tasks(&self) -> &[Task] {
        &self.0
    }

    pub fn into_tasks(self) -> Vec<Task> {
        self.0
    }

    /// First id that appears more than once, in collection order.
    pub fn duplicate_id(&self) -> Option<&TaskId> {
        let mut seen = HashSet::with_capacity(self.0.len());
        self.0.iter().map(|t| &t.id).find(|id| !seen.insert(*id))
    }
}

impl From<Vec<Task>> for Snapshot {
    fn from(tasks: Vec<Task>) -> Self {
        Self(tasks)
    }
}
