use std::io::{Stdout, stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{
    Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap},
};
use time::macros::format_description;

use crate::app::{App, InputMode, Pane};
use crate::domain::task::{Priority, Task};
use crate::edit::{Draft, DraftField};
use crate::view::Presentation;

pub async fn run(mut app: App, tick_rate: Duration) -> Result<()> {
    enable_raw_mode()?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // First frame shows every pane as loading.
    terminal.draw(|f| draw(f, &app))?;
    app.initialize().await;

    let mut last_tick = Instant::now();
    let res = loop {
        app.reload_if_requested().await;
        app.poll_sync();
        terminal.draw(|f| draw(f, &app))?;

        let timeout = tick_rate
            .checked_sub(last_tick.elapsed())
            .unwrap_or_else(|| Duration::from_secs(0));

        if event::poll(timeout)?
            && let Event::Key(key) = event::read()?
            && key.kind == KeyEventKind::Press
            && handle_key(&mut app, key.code)
        {
            break Ok(());
        }

        if last_tick.elapsed() >= tick_rate {
            last_tick = Instant::now();
        }
    };

    app.flush().await;
    cleanup_terminal(&mut terminal)?;
    res
}

/// Returns true when the app should quit.
fn handle_key(app: &mut App, code: KeyCode) -> bool {
    match app.mode {
        InputMode::Normal => match code {
            KeyCode::Char('q') => return true,
            KeyCode::Char('j') | KeyCode::Down => app.select_next(),
            KeyCode::Char('k') | KeyCode::Up => app.select_previous(),
            KeyCode::Tab => app.focus_next(),
            KeyCode::Enter | KeyCode::Char(' ') => app.toggle_selected(),
            KeyCode::Char('e') => app.begin_edit(),
            KeyCode::Char('/') => app.begin_search(),
            KeyCode::Char('a') | KeyCode::Char('n') => app.begin_add(),
            KeyCode::Char('d') | KeyCode::Delete => app.delete_selected(),
            KeyCode::Char('c') => app.clear_done(),
            KeyCode::Char('r') => app.request_reload(),
            KeyCode::Esc => app.finish_search(false),
            _ => {}
        },
        InputMode::Editing(_) => match code {
            KeyCode::Esc => app.cancel_edit(),
            KeyCode::Enter => app.save_edit(),
            KeyCode::Tab => app.switch_edit_field(),
            KeyCode::Backspace => app.edit_backspace(),
            KeyCode::Char(c) => app.edit_input(c),
            _ => {}
        },
        InputMode::Search => match code {
            KeyCode::Esc => app.finish_search(false),
            KeyCode::Enter => app.finish_search(true),
            KeyCode::Backspace => app.search_backspace(),
            KeyCode::Char(c) => app.search_input(c),
            _ => {}
        },
        InputMode::Adding => match code {
            KeyCode::Esc => app.cancel_add(),
            KeyCode::Enter => app.add_todo(),
            KeyCode::Backspace => {
                app.input.pop();
            }
            KeyCode::Char(c) => app.input.push(c),
            _ => {}
        },
    }

    false
}

fn draw(f: &mut ratatui::Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(f.area());

    f.render_widget(render_header(app), chunks[0]);

    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints(vec![
            Constraint::Ratio(1, app.panes.len() as u32);
            app.panes.len()
        ])
        .split(chunks[1]);
    for (idx, (pane, area)) in app.panes.iter().zip(columns.iter()).enumerate() {
        draw_pane(f, pane, idx, idx == app.focused, app.mode, *area);
    }

    f.render_widget(render_footer(app), chunks[2]);
}

fn render_header(app: &App) -> Paragraph<'static> {
    let mut spans = vec![Span::styled(
        "yarukoto - tasks",
        Style::default().fg(Color::Cyan),
    )];
    if let Some(repo) = app.pane().view.repository() {
        let total = repo.tasks().len();
        let done = repo.tasks().iter().filter(|t| t.is_complete()).count();
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("Open: {} / All: {}", total - done, total),
            Style::default().fg(Color::Yellow),
        ));
    }
    if app.panes.len() > 1 {
        spans.push(Span::raw("  |  "));
        spans.push(Span::styled(
            format!("View {}/{}", app.focused + 1, app.panes.len()),
            Style::default().fg(Color::Magenta),
        ));
    }
    Paragraph::new(Line::from(spans))
        .block(Block::default().title("Overview").borders(Borders::ALL))
        .wrap(Wrap { trim: true })
}

fn draw_pane(
    f: &mut ratatui::Frame,
    pane: &Pane,
    idx: usize,
    focused: bool,
    mode: InputMode,
    area: Rect,
) {
    let p = pane.view.presentation();
    let border = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .title(pane_title(idx, &p))
        .borders(Borders::ALL)
        .border_style(border);

    if p.loading {
        f.render_widget(Paragraph::new("Loading tasks...").block(block), area);
        return;
    }
    if let Some(err) = p.error {
        let lines = vec![
            Line::styled(err.to_string(), Style::default().fg(Color::Red)),
            Line::raw(""),
            Line::raw("Press r to retry"),
        ];
        f.render_widget(
            Paragraph::new(lines)
                .block(block)
                .wrap(Wrap { trim: true }),
            area,
        );
        return;
    }
    if p.visible_tasks.is_empty() {
        let msg = if p.total == 0 {
            "No tasks available".to_string()
        } else {
            format!("No tasks match {:?}", p.search_term)
        };
        f.render_widget(Paragraph::new(msg).block(block), area);
        return;
    }

    let edit_field = match mode {
        InputMode::Editing(field) if focused => Some(field),
        _ => None,
    };
    let items: Vec<ListItem> = p
        .visible_tasks
        .iter()
        .enumerate()
        .map(|(row, task)| render_row(task, row == pane.selected && focused, &p, edit_field))
        .collect();

    let mut list_state = ListState::default();
    list_state.select(Some(pane.selected));
    let list = List::new(items).block(block).highlight_symbol("➤ ");
    f.render_stateful_widget(list, area, &mut list_state);
}

fn pane_title(idx: usize, p: &Presentation<'_>) -> String {
    let mut title = format!("Tasks #{} ({}/{})", idx + 1, p.visible_tasks.len(), p.total);
    if !p.search_term.is_empty() {
        title.push_str(&format!(" search: {}", p.search_term));
    }
    title
}

fn render_row<'a>(
    task: &'a Task,
    selected: bool,
    p: &'a Presentation<'a>,
    edit_field: Option<DraftField>,
) -> ListItem<'a> {
    if let Some(draft) = p.edit_session.filter(|d| d.task_id == task.id) {
        return render_draft(draft, edit_field);
    }

    let symbol = if task.is_complete() { "✔" } else { "•" };
    let mut spans = vec![Span::raw(format!(" {symbol} {}", task.title))];
    if let Some(priority) = &task.priority {
        spans.push(Span::raw("  "));
        spans.push(match priority.level() {
            Some(level) => Span::styled(level.label(), priority_style(level)),
            None => Span::styled(priority.as_str(), Style::default().fg(Color::DarkGray)),
        });
    }
    if let Some(due) = due_label(task) {
        spans.push(Span::styled(
            format!("  due {due}"),
            Style::default().fg(Color::Blue),
        ));
    }
    spans.push(Span::styled(
        format!("  {}", task.status.label()),
        if task.is_complete() {
            Style::default().fg(Color::Green)
        } else {
            Style::default().fg(Color::Yellow)
        },
    ));

    let mut lines = vec![Line::from(spans)];
    if !task.description.is_empty() {
        lines.push(Line::styled(
            format!("     {}", task.description),
            Style::default().fg(Color::Gray),
        ));
    }

    let style = if selected {
        Style::default()
            .fg(Color::Cyan)
            .add_modifier(Modifier::BOLD | Modifier::REVERSED)
    } else if task.is_complete() {
        Style::default()
            .fg(Color::DarkGray)
            .add_modifier(Modifier::CROSSED_OUT)
    } else {
        Style::default()
    };
    ListItem::new(lines).style(style)
}

/// `None` without a due date; a stored value that is not a date reads
/// "Invalid date".
fn due_label(task: &Task) -> Option<String> {
    let due = task.due_date.as_ref()?;
    let label = due
        .parse()
        .and_then(|ts| ts.format(format_description!("[year]-[month]-[day]")).ok())
        .unwrap_or_else(|| "Invalid date".to_string());
    Some(label)
}

fn render_draft(draft: &Draft, active: Option<DraftField>) -> ListItem<'_> {
    let line = move |label: &'static str, field: DraftField| {
        let style = if active == Some(field) {
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
        } else {
            Style::default()
        };
        let mut spans = vec![
            Span::raw(format!("   {label}: ")),
            Span::styled(draft.field(field), style),
        ];
        if active == Some(field) {
            spans.push(Span::raw("█"));
        }
        Line::from(spans)
    };
    ListItem::new(vec![
        line("Title", DraftField::Title),
        line("Description", DraftField::Description),
    ])
    .style(Style::default().bg(Color::Black))
}

fn priority_style(priority: Priority) -> Style {
    match priority {
        Priority::High => Style::default().fg(Color::Red),
        Priority::Medium => Style::default().fg(Color::Yellow),
        Priority::Low => Style::default().fg(Color::Green),
    }
}

fn render_footer(app: &App) -> Paragraph<'_> {
    match app.mode {
        InputMode::Normal => {
            let msg = app.status.as_deref().unwrap_or(
                "q quit ; j/k move ; Space toggle ; e edit ; / search ; a add ; d delete ; c clear done ; Tab next view",
            );
            Paragraph::new(msg).block(Block::default().title("Normal").borders(Borders::ALL))
        }
        InputMode::Editing(field) => {
            let title = match field {
                DraftField::Title => "Editing title",
                DraftField::Description => "Editing description",
            };
            let msg = app
                .status
                .as_deref()
                .unwrap_or("Tab switch field ; Enter save ; Esc cancel");
            Paragraph::new(msg).block(Block::default().title(title).borders(Borders::ALL))
        }
        InputMode::Search => {
            let line = Line::from(vec![
                Span::raw("Search: "),
                Span::styled(app.pane().view.search_term(), Style::default().fg(Color::Yellow)),
                Span::raw("█"),
            ]);
            Paragraph::new(line).block(
                Block::default()
                    .title("Search (Enter to keep / Esc to clear)")
                    .borders(Borders::ALL),
            )
        }
        InputMode::Adding => {
            let line = Line::from(vec![
                Span::raw("New task: "),
                Span::styled(&app.input, Style::default().fg(Color::Yellow)),
                Span::raw("█"),
            ]);
            Paragraph::new(line).block(
                Block::default()
                    .title("Input (Enter to add / Esc to cancel)")
                    .borders(Borders::ALL),
            )
        }
    }
}

fn cleanup_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::domain::timeutil::Timestamp;
    use crate::kv::memory::InMemoryKv;
    use crate::store::{DEFAULT_SLOT, Storage};

    #[tokio::test]
    async fn key_bindings_drive_the_app() {
        let storage = Storage::new(Arc::new(InMemoryKv::default())).unwrap();
        let mut app = App::new(storage, DEFAULT_SLOT, 1);
        app.initialize().await;

        assert!(!handle_key(&mut app, KeyCode::Char('/')));
        for c in "bug".chars() {
            handle_key(&mut app, KeyCode::Char(c));
        }
        // Typed characters go to the search term, not to commands.
        assert!(!handle_key(&mut app, KeyCode::Char('q')));
        handle_key(&mut app, KeyCode::Backspace);
        handle_key(&mut app, KeyCode::Enter);
        assert_eq!(app.mode, InputMode::Normal);
        assert_eq!(app.pane().view.search_term(), "bug");

        handle_key(&mut app, KeyCode::Char('e'));
        assert_eq!(app.mode, InputMode::Editing(DraftField::Title));
        handle_key(&mut app, KeyCode::Tab);
        assert_eq!(app.mode, InputMode::Editing(DraftField::Description));
        handle_key(&mut app, KeyCode::Esc);
        assert_eq!(app.mode, InputMode::Normal);
        assert!(app.pane().view.edit_session().is_none());

        handle_key(&mut app, KeyCode::Esc);
        assert_eq!(app.pane().view.search_term(), "");
        assert!(handle_key(&mut app, KeyCode::Char('q')));
    }

    #[tokio::test]
    async fn row_with_description_spans_two_lines() {
        let storage = Storage::new(Arc::new(InMemoryKv::default())).unwrap();
        let mut app = App::new(storage, DEFAULT_SLOT, 1);
        app.initialize().await;

        let p = app.pane().view.presentation();
        let item = render_row(p.visible_tasks[0], false, &p, None);
        assert_eq!(item.height(), 2);
        assert_eq!(due_label(p.visible_tasks[0]).map(|d| d.len()), Some(10));
    }

    #[test]
    fn unparseable_due_date_reads_invalid() {
        let mut task = Task::new("t", "");
        assert_eq!(due_label(&task), None);

        task.due_date = Some(Timestamp::from("Invalid Date"));
        assert_eq!(due_label(&task).as_deref(), Some("Invalid date"));

        task.due_date = Some(Timestamp::from("2026-10-16T23:30:00Z"));
        assert_eq!(due_label(&task).as_deref(), Some("2026-10-16"));
    }
}
