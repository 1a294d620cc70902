use crate::domain::task::TaskId;
use crate::edit::{DraftField, EditError};
use crate::repo::ValidationError;
use crate::store::Storage;
use crate::view::TaskView;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    Search,
    Adding,
    Editing(DraftField),
}

pub struct Pane {
    pub view: TaskView,
    /// Index into the pane's visible tasks.
    pub selected: usize,
}

impl Pane {
    fn selected_id(&self) -> Option<TaskId> {
        self.view
            .visible_tasks()
            .get(self.selected)
            .map(|t| t.id.clone())
    }

    fn clamp_selection(&mut self) {
        let len = self.view.visible_tasks().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }
}

pub struct App {
    storage: Storage,
    key: String,
    pub panes: Vec<Pane>,
    pub focused: usize,
    pub mode: InputMode,
    pub input: String,
    pub status: Option<String>,
    reload_requested: bool,
}

impl App {
    pub fn new(storage: Storage, key: impl Into<String>, views: usize) -> Self {
        let panes = (0..views.max(1))
            .map(|_| Pane {
                view: TaskView::new(),
                selected: 0,
            })
            .collect();
        Self {
            storage,
            key: key.into(),
            panes,
            focused: 0,
            mode: InputMode::Normal,
            input: String::new(),
            status: None,
            reload_requested: false,
        }
    }

    /// Each pane gets its own adapter, so each is a separate observer of the
    /// store.
    pub async fn initialize(&mut self) {
        let storage = &self.storage;
        let key = &self.key;
        for pane in &mut self.panes {
            pane.view.initialize(storage.open(key.as_str())).await;
            pane.clamp_selection();
        }
    }

    pub fn request_reload(&mut self) {
        self.reload_requested = true;
    }

    pub async fn reload_if_requested(&mut self) {
        if !std::mem::take(&mut self.reload_requested) {
            return;
        }
        let store = self.storage.open(self.key.as_str());
        let pane = self.pane_mut();
        pane.view.initialize(store).await;
        pane.clamp_selection();
        self.mode = InputMode::Normal;
        self.set_status("Reloaded");
    }

    /// Picks up changes from other views and, through the writer, from other
    /// processes sharing the same database.
    pub fn poll_sync(&mut self) {
        self.storage.poll_external(&self.key);
        for pane in &mut self.panes {
            if pane.view.sync_external() > 0 {
                pane.clamp_selection();
            }
        }
        if let InputMode::Editing(_) = self.mode
            && self.pane().view.edit_session().is_none()
        {
            self.mode = InputMode::Normal;
        }
    }

    pub async fn flush(&self) {
        for pane in &self.panes {
            pane.view.flush().await;
        }
    }

    pub fn pane(&self) -> &Pane {
        &self.panes[self.focused]
    }

    fn pane_mut(&mut self) -> &mut Pane {
        &mut self.panes[self.focused]
    }

    pub fn focus_next(&mut self) {
        self.focused = (self.focused + 1) % self.panes.len();
    }

    pub fn select_next(&mut self) {
        let pane = self.pane_mut();
        let len = pane.view.visible_tasks().len();
        if len > 0 {
            pane.selected = (pane.selected + 1).min(len - 1);
        }
    }

    pub fn select_previous(&mut self) {
        let pane = self.pane_mut();
        pane.selected = pane.selected.saturating_sub(1);
    }

    pub fn toggle_selected(&mut self) {
        let pane = self.pane_mut();
        if let Some(id) = pane.selected_id() {
            pane.view.toggle_status(&id);
            pane.clamp_selection();
            self.set_status("Toggled completion");
        }
    }

    pub fn begin_edit(&mut self) {
        let pane = self.pane_mut();
        if let Some(id) = pane.selected_id()
            && pane.view.start_editing(&id)
        {
            self.mode = InputMode::Editing(DraftField::Title);
            self.set_status("Editing (Tab switch field ; Enter save ; Esc cancel)");
        }
    }

    pub fn edit_input(&mut self, c: char) {
        self.rewrite_draft(|value| value.push(c));
    }

    pub fn edit_backspace(&mut self) {
        self.rewrite_draft(|value| {
            value.pop();
        });
    }

    pub fn switch_edit_field(&mut self) {
        if let InputMode::Editing(field) = self.mode {
            self.mode = InputMode::Editing(field.other());
        }
    }

    fn rewrite_draft(&mut self, change: impl FnOnce(&mut String)) {
        let InputMode::Editing(field) = self.mode else {
            return;
        };
        let pane = self.pane_mut();
        let Some(mut value) = pane.view.edit_session().map(|d| d.field(field).to_owned()) else {
            self.mode = InputMode::Normal;
            return;
        };
        change(&mut value);
        pane.view.update_draft_field(field, value);
    }

    pub fn save_edit(&mut self) {
        let result = self.pane_mut().view.save_edit();
        match result {
            Ok(()) => {
                self.mode = InputMode::Normal;
                self.pane_mut().clamp_selection();
                self.set_status("Saved");
            }
            Err(EditError::Invalid(err)) => self.set_status(&err.to_string()),
            Err(EditError::NotEditing) => self.mode = InputMode::Normal,
        }
    }

    pub fn cancel_edit(&mut self) {
        self.pane_mut().view.cancel_editing();
        self.mode = InputMode::Normal;
        self.set_status("Canceled");
    }

    pub fn begin_search(&mut self) {
        self.mode = InputMode::Search;
        self.set_status("Type to filter ; Enter keep ; Esc clear");
    }

    pub fn search_input(&mut self, c: char) {
        let mut term = self.pane().view.search_term().to_owned();
        term.push(c);
        self.set_search_term(term);
    }

    pub fn search_backspace(&mut self) {
        let mut term = self.pane().view.search_term().to_owned();
        term.pop();
        self.set_search_term(term);
    }

    pub fn finish_search(&mut self, keep: bool) {
        if !keep {
            self.set_search_term(String::new());
        }
        self.mode = InputMode::Normal;
    }

    fn set_search_term(&mut self, term: String) {
        let pane = self.pane_mut();
        pane.view.set_search_term(term);
        pane.clamp_selection();
    }

    pub fn begin_add(&mut self) {
        self.mode = InputMode::Adding;
        self.input.clear();
        self.set_status("Type new task and press Enter");
    }

    pub fn add_todo(&mut self) {
        let title = self.input.trim().to_owned();
        match self.pane_mut().view.add_task(title, "") {
            Err(ValidationError::EmptyTitle) => {
                self.set_status("Cannot add an empty task");
                return;
            }
            Ok(None) => {}
            Ok(Some(_)) => {
                let pane = self.pane_mut();
                pane.selected = pane.view.visible_tasks().len().saturating_sub(1);
                self.set_status("Added");
            }
        }
        self.input.clear();
        self.mode = InputMode::Normal;
    }

    pub fn cancel_add(&mut self) {
        self.input.clear();
        self.mode = InputMode::Normal;
        self.set_status("Canceled");
    }

    pub fn delete_selected(&mut self) {
        let pane = self.pane_mut();
        if let Some(id) = pane.selected_id() {
            pane.view.delete_task(&id);
            pane.clamp_selection();
            self.set_status("Deleted");
        }
    }

    pub fn clear_done(&mut self) {
        let pane = self.pane_mut();
        let removed = pane.view.clear_completed();
        pane.clamp_selection();
        if removed > 0 {
            self.set_status(&format!("Cleared {removed} completed"));
        } else {
            self.set_status("No completed items");
        }
    }

    pub fn set_status(&mut self, msg: &str) {
        self.status = Some(msg.to_string());
    }
}
