use thiserror::Error;

use crate::domain::task::{Task, TaskId};
use crate::repo::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DraftField {
    Title,
    Description,
}

impl DraftField {
    pub fn other(self) -> Self {
        match self {
            Self::Title => Self::Description,
            Self::Description => Self::Title,
        }
    }
}

/// Unsaved copy of the editable fields of one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Draft {
    pub task_id: TaskId,
    pub title: String,
    pub description: String,
}

impl Draft {
    pub fn field(&self, field: DraftField) -> &str {
        match field {
            DraftField::Title => &self.title,
            DraftField::Description => &self.description,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EditError {
    #[error("no task is being edited")]
    NotEditing,
    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

/// At most one task is edited at a time. Starting a new edit replaces the
/// current draft without asking.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum EditSession {
    #[default]
    Idle,
    Editing(Draft),
}

impl EditSession {
    /// Opens a draft for `task`, returning the draft it replaced, if any.
    pub fn start(&mut self, task: &Task) -> Option<Draft> {
        let next = Self::Editing(Draft {
            task_id: task.id.clone(),
            title: task.title.clone(),
            description: task.description.clone(),
        });
        match std::mem::replace(self, next) {
            Self::Editing(prev) => Some(prev),
            Self::Idle => None,
        }
    }

    /// Returns `false` when idle.
    pub fn update_field(&mut self, field: DraftField, value: impl Into<String>) -> bool {
        let Self::Editing(draft) = self else {
            return false;
        };
        match field {
            DraftField::Title => draft.title = value.into(),
            DraftField::Description => draft.description = value.into(),
        }
        true
    }

    /// Discards the draft.
    pub fn cancel(&mut self) -> Option<Draft> {
        match std::mem::take(self) {
            Self::Editing(draft) => Some(draft),
            Self::Idle => None,
        }
    }

    pub fn draft(&self) -> Option<&Draft> {
        match self {
            Self::Editing(draft) => Some(draft),
            Self::Idle => None,
        }
    }

    pub fn is_editing(&self, id: &TaskId) -> bool {
        self.draft().is_some_and(|d| &d.task_id == id)
    }
}
