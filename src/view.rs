//! One live view over the task store: the repository once loaded, the search
//! term, and everything derived from the two.

use std::sync::Arc;

use crate::domain::task::{Task, TaskId};
use crate::domain::timeutil::{Clock, SystemClock};
use crate::edit::{Draft, DraftField, EditError};
use crate::repo::{TaskRepository, ValidationError};
use crate::store::TaskStore;
use crate::usecase::search;

enum ViewState {
    Loading,
    Ready(TaskRepository),
    Error(String),
}

/// What a renderer needs for one frame.
#[derive(Debug)]
pub struct Presentation<'a> {
    pub loading: bool,
    pub error: Option<&'a str>,
    pub search_term: &'a str,
    pub visible_tasks: Vec<&'a Task>,
    pub total: usize,
    pub edit_session: Option<&'a Draft>,
}

pub struct TaskView {
    state: ViewState,
    search_term: String,
}

impl Default for TaskView {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskView {
    pub fn new() -> Self {
        Self {
            state: ViewState::Loading,
            search_term: String::new(),
        }
    }

    pub async fn initialize(&mut self, store: TaskStore) {
        self.initialize_with_clock(store, Arc::new(SystemClock)).await;
    }

    /// Loads (or seeds) the collection. Also used to recover from `Error`;
    /// the search term is kept.
    pub async fn initialize_with_clock(&mut self, store: TaskStore, clock: Arc<dyn Clock>) {
        self.state = ViewState::Loading;
        self.state = match TaskRepository::initialize_with_clock(store, clock).await {
            Ok(repo) => ViewState::Ready(repo),
            Err(err) => {
                tracing::error!(error = %err, "failed to load tasks");
                ViewState::Error(format!("Failed to load tasks: {err}"))
            }
        };
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.state, ViewState::Loading)
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            ViewState::Error(msg) => Some(msg),
            _ => None,
        }
    }

    pub fn repository(&self) -> Option<&TaskRepository> {
        match &self.state {
            ViewState::Ready(repo) => Some(repo),
            _ => None,
        }
    }

    pub fn search_term(&self) -> &str {
        &self.search_term
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.search_term = term.into();
    }

    /// Recomputed from the current list and term on every call.
    pub fn visible_tasks(&self) -> Vec<&Task> {
        self.repository()
            .map(|repo| search::filter(repo.tasks(), &self.search_term))
            .unwrap_or_default()
    }

    pub fn edit_session(&self) -> Option<&Draft> {
        self.repository().and_then(|repo| repo.session().draft())
    }

    pub fn presentation(&self) -> Presentation<'_> {
        Presentation {
            loading: self.is_loading(),
            error: self.error(),
            search_term: &self.search_term,
            visible_tasks: self.visible_tasks(),
            total: self.repository().map_or(0, |repo| repo.tasks().len()),
            edit_session: self.edit_session(),
        }
    }

    pub fn toggle_status(&mut self, id: &TaskId) -> bool {
        self.ready_mut()
            .map(|repo| {
                repo.toggle_status(id);
            })
            .is_some()
    }

    pub fn start_editing(&mut self, id: &TaskId) -> bool {
        self.ready_mut().is_some_and(|repo| repo.start_editing(id))
    }

    pub fn update_draft_field(&mut self, field: DraftField, value: impl Into<String>) -> bool {
        self.ready_mut()
            .is_some_and(|repo| repo.update_draft_field(field, value))
    }

    pub fn cancel_editing(&mut self) -> bool {
        self.ready_mut().is_some_and(TaskRepository::cancel_editing)
    }

    pub fn save_edit(&mut self) -> Result<(), EditError> {
        let repo = self.ready_mut().ok_or(EditError::NotEditing)?;
        repo.save_edit()?;
        Ok(())
    }

    /// `Ok(None)` when the view is not ready.
    pub fn add_task(
        &mut self,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<Option<TaskId>, ValidationError> {
        self.ready_mut()
            .map(|repo| repo.add_task(title, description))
            .transpose()
    }

    pub fn delete_task(&mut self, id: &TaskId) -> bool {
        self.ready_mut()
            .map(|repo| {
                repo.delete_task(id);
            })
            .is_some()
    }

    pub fn clear_completed(&mut self) -> usize {
        self.ready_mut().map_or(0, TaskRepository::clear_completed)
    }

    /// Adopts whatever other views announced since the last call.
    pub fn sync_external(&mut self) -> usize {
        self.ready_mut().map_or(0, TaskRepository::sync_external)
    }

    pub async fn flush(&self) {
        if let Some(repo) = self.repository()
            && let Err(err) = repo.flush().await
        {
            tracing::warn!(error = %err, "pending writes not flushed");
        }
    }

    fn ready_mut(&mut self) -> Option<&mut TaskRepository> {
        match &mut self.state {
            ViewState::Ready(repo) => Some(repo),
            ViewState::Loading => {
                tracing::debug!("action ignored while loading");
                None
            }
            ViewState::Error(_) => {
                tracing::debug!("action ignored after load failure");
                None
            }
        }
    }
}
