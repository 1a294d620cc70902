use std::sync::Arc;

use thiserror::Error;
use time::OffsetDateTime;

use crate::domain::seed::seed_tasks;
use crate::domain::task::{Snapshot, Task, TaskId};
use crate::domain::timeutil::{Clock, SystemClock, Timestamp, next_stamp, truncate_to_millis};
use crate::edit::{DraftField, EditError, EditSession};
use crate::store::{StoreError, TaskStore};

#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Task title cannot be empty")]
    EmptyTitle,
}

/// New values for the editable fields of a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEdit {
    pub title: String,
    pub description: String,
}

/// Owner of the canonical task list and the edit session.
///
/// Every mutation is applied in memory first, then the full collection is
/// handed to the store, which announces it to other views and queues the
/// write. A failed write is logged and never rolls the list back. Mutations
/// naming an unknown id leave the list as it is but are still persisted.
pub struct TaskRepository {
    tasks: Vec<Task>,
    session: EditSession,
    store: TaskStore,
    clock: Arc<dyn Clock>,
}

impl TaskRepository {
    pub async fn initialize(store: TaskStore) -> Result<Self, StoreError> {
        Self::initialize_with_clock(store, Arc::new(SystemClock)).await
    }

    /// Adopts the stored collection, or seeds the defaults and waits for them
    /// to be written when the slot is empty.
    pub async fn initialize_with_clock(
        store: TaskStore,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, StoreError> {
        if let Some(snapshot) = store.load().await? {
            tracing::info!(key = store.key(), count = snapshot.tasks().len(), "adopted stored tasks");
            return Ok(Self::adopt(store, snapshot.into_tasks(), clock));
        }

        let seed = seed_tasks(truncate_to_millis(clock.now()));
        tracing::info!(key = store.key(), count = seed.len(), "slot empty, seeding defaults");
        let repo = Self::adopt(store, seed, clock);
        repo.persist();
        if let Err(err) = repo.store.flush().await {
            tracing::warn!(error = %err, "seed was not confirmed written");
        }
        Ok(repo)
    }

    /// Wraps an already loaded collection without touching the store.
    pub fn adopt(store: TaskStore, tasks: Vec<Task>, clock: Arc<dyn Clock>) -> Self {
        Self {
            tasks,
            session: EditSession::Idle,
            store,
            clock,
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| &t.id == id)
    }

    pub fn session(&self) -> &EditSession {
        &self.session
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot::new(self.tasks.clone())
    }

    pub fn toggle_status(&mut self, id: &TaskId) -> &[Task] {
        let now = self.clock.now();
        match self.tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                task.status = task.status.toggled();
                task.updated_at = Some(restamp(now, task.updated_at.as_ref()));
                tracing::debug!(%id, status = task.status.label(), "toggled status");
            }
            None => tracing::debug!(%id, "toggle for unknown task"),
        }
        self.persist();
        &self.tasks
    }

    /// Rejects a blank title without touching the list or the store.
    pub fn apply_edit(&mut self, id: &TaskId, edit: TaskEdit) -> Result<&[Task], ValidationError> {
        if edit.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let now = self.clock.now();
        match self.tasks.iter_mut().find(|t| &t.id == id) {
            Some(task) => {
                task.title = edit.title;
                task.description = edit.description;
                task.updated_at = Some(restamp(now, task.updated_at.as_ref()));
                tracing::debug!(%id, "applied edit");
            }
            None => tracing::debug!(%id, "edit for unknown task"),
        }
        self.persist();
        Ok(&self.tasks)
    }

    /// Appends a new incomplete task and returns its id.
    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<TaskId, ValidationError> {
        let title = title.into();
        if title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        let mut task = Task::new(title, description);
        task.updated_at = Some(restamp(self.clock.now(), None));
        let id = task.id.clone();
        tracing::debug!(%id, "added task");
        self.tasks.push(task);
        self.persist();
        Ok(id)
    }

    /// Removes the task, closing its edit session if it had one.
    pub fn delete_task(&mut self, id: &TaskId) -> &[Task] {
        self.tasks.retain(|t| &t.id != id);
        if self.session.is_editing(id) {
            self.session.cancel();
        }
        tracing::debug!(%id, "deleted task");
        self.persist();
        &self.tasks
    }

    pub fn clear_completed(&mut self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|t| !t.is_complete());
        let removed = before - self.tasks.len();
        if let Some(draft) = self.session.draft()
            && !self.tasks.iter().any(|t| t.id == draft.task_id)
        {
            self.session.cancel();
        }
        tracing::debug!(removed, "cleared completed tasks");
        self.persist();
        removed
    }

    /// Returns `false` when `id` is unknown.
    pub fn start_editing(&mut self, id: &TaskId) -> bool {
        let Some(task) = self.tasks.iter().find(|t| &t.id == id) else {
            tracing::debug!(%id, "cannot edit unknown task");
            return false;
        };
        if let Some(prev) = self.session.start(task) {
            tracing::debug!(discarded = %prev.task_id, editing = %id, "switched edit");
        }
        true
    }

    pub fn update_draft_field(&mut self, field: DraftField, value: impl Into<String>) -> bool {
        self.session.update_field(field, value)
    }

    pub fn cancel_editing(&mut self) -> bool {
        self.session.cancel().is_some()
    }

    /// Commits the draft. On a blank title the session stays open.
    pub fn save_edit(&mut self) -> Result<&[Task], EditError> {
        let Some(draft) = self.session.draft().cloned() else {
            return Err(EditError::NotEditing);
        };
        self.apply_edit(
            &draft.task_id,
            TaskEdit {
                title: draft.title,
                description: draft.description,
            },
        )?;
        self.session = EditSession::Idle;
        Ok(&self.tasks)
    }

    /// Replaces the whole list with a snapshot from another writer.
    pub fn replace_all(&mut self, snapshot: Snapshot) {
        self.tasks = snapshot.into_tasks();
    }

    /// Applies pending external changes; the last one wins.
    pub fn sync_external(&mut self) -> usize {
        let mut latest = None;
        let applied = self
            .store
            .drain_external_changes(|snapshot| latest = Some(snapshot));
        if let Some(snapshot) = latest {
            self.replace_all(snapshot);
            tracing::debug!(applied, count = self.tasks.len(), "adopted external change");
        }
        applied
    }

    pub async fn flush(&self) -> Result<(), StoreError> {
        self.store.flush().await
    }

    fn persist(&self) {
        if let Err(err) = self.store.save(&self.tasks) {
            tracing::warn!(error = %err, "snapshot not persisted");
        }
    }
}

/// A stored stamp that does not parse is treated as absent.
fn restamp(now: OffsetDateTime, previous: Option<&Timestamp>) -> Timestamp {
    Timestamp::at(next_stamp(now, previous.and_then(Timestamp::parse)))
}
