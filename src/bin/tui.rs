use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossterm::{event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind}, execute, terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen}};
use ratatui::{backend::CrosstermBackend, Terminal, widgets::{Block, Borders, List, ListItem, Paragraph, ListState}, layout::{Layout, Constraint, Direction}, style::{Style, Modifier, Color}};
use tokio::sync::mpsc;

use todo_app::client::{cache::{CachedTodo, ListKey, QueryCache}, filter::{FilterCounts, TodoFilter}, reconciler::{Mutation, Reconciler}, remote::HttpTodoApi};
use todo_app::domain::todo::{CreateTodo, UpdateTodo};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let api_url = std::env::var("API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000".to_string());
    let token = std::env::var("SESSION_TOKEN").context("SESSION_TOKEN must be set")?;

    let api = HttpTodoApi::new(api_url.clone(), token);
    // Fails fast on an unreachable server or a stale token, before the terminal is taken over.
    let profile = api.session().await.with_context(|| format!("checking the session against {api_url}"))?;
    let reconciler = Reconciler::new(api, Arc::new(QueryCache::new()));

    // Terminal setup
    enable_raw_mode()?;
    let mut stdout = std::io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, reconciler, api_url, profile.display_name().to_string()).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    res
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mode { View, Create, Edit }

#[derive(Clone, Copy, PartialEq, Eq)]
enum ActiveField { Title, Description }

const FAILURE_NOTICE: &str = "Something went wrong, your change was reverted.";
const LOAD_FAILURE_NOTICE: &str = "Could not load todos, press r to retry.";

struct App {
    reconciler: Reconciler<HttpTodoApi>,
    items: Vec<CachedTodo>,
    selected: usize,
    last_tick: Instant,
    mode: Mode,
    list_state: ListState,
    filter: TodoFilter,
    filtered_indices: Vec<usize>,
    field: ActiveField,
    draft_title: String,
    draft_desc: String,
    notice: Option<String>,
    failures: mpsc::UnboundedSender<&'static str>,
    user: String,
}

impl App {
    fn refresh(&mut self) {
        self.items = self.reconciler.todos();
        self.filtered_indices = self.filter.indices(&self.items);
        // Clamp selection within filtered bounds
        let len = self.filtered_indices.len();
        if len == 0 { self.selected = 0; self.list_state.select(None); }
        else { if self.selected >= len { self.selected = len - 1; } self.list_state.select(Some(self.selected)); }
    }

    fn selected_entry(&self) -> Option<&CachedTodo> {
        self.filtered_indices.get(self.selected).and_then(|&idx| self.items.get(idx))
    }

    fn loaded(&self) -> bool { self.reconciler.cache().is_loaded(ListKey::TODOS) }

    fn reload(&self) {
        let reconciler = self.reconciler.clone();
        let failures = self.failures.clone();
        tokio::spawn(async move { if reconciler.refetch().await.is_err() { let _ = failures.send(LOAD_FAILURE_NOTICE); } });
    }

    /// Outcomes are only reported as a generic notice; the list itself already reflects them.
    fn track<T: Send + 'static>(&self, mutation: Mutation<T>) {
        let failures = self.failures.clone();
        tokio::spawn(async move {
            if mutation.await.is_err() { let _ = failures.send(FAILURE_NOTICE); }
        });
    }
}

fn describe(e: &CachedTodo) -> String {
    let desc = e.description.clone().unwrap_or_else(|| "(no description)".to_string());
    let status = if e.completed { "Completed" } else { "Active" };
    let saved = if e.is_pending() { "\n\n(saving...)" } else { "" };
    format!("Title:\n{}\n\nStatus: {}\n\nDescription:\n{}{}", e.title, status, desc, saved)
}

async fn run_app(terminal: &mut Terminal<CrosstermBackend<std::io::Stdout>>, reconciler: Reconciler<HttpTodoApi>, api_url: String, user: String) -> Result<()> {
    let tick_rate = Duration::from_millis(200);
    let (failures, mut failure_rx) = mpsc::unbounded_channel();
    let mut app = App { reconciler, items: vec![], selected: 0, last_tick: Instant::now(), mode: Mode::View, list_state: ListState::default(), filter: TodoFilter::All, filtered_indices: Vec::new(), field: ActiveField::Title, draft_title: String::new(), draft_desc: String::new(), notice: None, failures, user };
    app.reload();

    loop {
        while let Ok(notice) = failure_rx.try_recv() { app.notice = Some(notice.to_string()); }
        app.refresh();

        let counts = FilterCounts::of(&app.items);
        let tabs = [TodoFilter::All, TodoFilter::Active, TodoFilter::Completed]
            .map(|flt| if flt == app.filter { format!("[{} {}]", flt.label(), counts.get(flt)) } else { format!("{} {}", flt.label(), counts.get(flt)) })
            .join("  ");
        // Details pane for selected item (shows description)
        let loaded = app.loaded();
        let detail = if loaded { app.selected_entry().map(describe).unwrap_or_default() } else { "Loading todos...".to_string() };
        let list_title = if loaded { tabs } else { "loading...".to_string() };
        let header_title = format!("todo-app  |  {}", app.user);
        let field_name = match app.field { ActiveField::Title => "Title", ActiveField::Description => "Desc" };
        let draft = match app.field { ActiveField::Title => &app.draft_title, ActiveField::Description => &app.draft_desc };
        let footer_text = match app.mode {
            Mode::View => app.notice.clone().unwrap_or_else(|| format!("API_URL={}  |  Filter=[{}]", api_url, app.filter.label())),
            Mode::Create => format!("Create: {}: {}_  |  (Tab to switch, Enter to save, Esc to cancel)", field_name, draft),
            Mode::Edit => format!("Edit: {}: {}_  |  (Tab to switch, Enter to save, Esc to cancel)", field_name, draft),
        };
        let footer_style = if app.notice.is_some() && app.mode == Mode::View { Style::default().fg(Color::Red) } else { Style::default() };
        let footer_title = match app.mode { Mode::View => "info", Mode::Create => "create", Mode::Edit => "edit" };
        let list_items: Vec<ListItem> = app.filtered_indices.iter().filter_map(|&idx| app.items.get(idx)).map(|e| {
            let mark = if e.completed { "[x]" } else { "[ ]" };
            let item = ListItem::new(format!("{} {}", mark, e.title));
            if e.is_pending() { item.style(Style::default().fg(Color::DarkGray)) } else { item }
        }).collect();

        terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(3),
                    Constraint::Min(1),
                    Constraint::Length(3),
                ])
                .split(f.size());

            let header = Paragraph::new("Todos (Enter: toggle, n: new, e: edit, d: delete, f: filter, r: reload, q: quit)  |  New/Edit: Tab to switch field, Enter to save, Esc to cancel")
                .block(Block::default().borders(Borders::ALL).title(header_title));
            f.render_widget(header, chunks[0]);

            let middle = Layout::default()
                .direction(Direction::Horizontal)
                .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
                .split(chunks[1]);

            let list = List::new(list_items)
                .block(Block::default().borders(Borders::ALL).title(list_title))
                .highlight_style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD | Modifier::REVERSED))
                .highlight_symbol(">> ");
            f.render_stateful_widget(list, middle[0], &mut app.list_state);

            let details = Paragraph::new(detail)
                .block(Block::default().borders(Borders::ALL).title("details"));
            f.render_widget(details, middle[1]);

            let footer = Paragraph::new(footer_text).style(footer_style)
                .block(Block::default().borders(Borders::ALL).title(footer_title));
            f.render_widget(footer, chunks[2]);
        })?;

        let timeout = tick_rate.saturating_sub(app.last_tick.elapsed());
        if event::poll(timeout)? {
            if let Event::Key(key) = event::read()? {
                // Only act on key presses; ignore repeats and releases to prevent duplicate input
                if key.kind != KeyEventKind::Press { continue; }
                match app.mode {
                    Mode::View => {
                        app.notice = None;
                        match key.code {
                            KeyCode::Char('q') => break,
                            KeyCode::Up => { if app.selected > 0 { app.selected -= 1; } }
                            KeyCode::Down => { let len = app.filtered_indices.len(); if app.selected + 1 < len { app.selected += 1; } }
                            KeyCode::Enter | KeyCode::Char(' ') => {
                                if let Some(id) = app.selected_entry().and_then(CachedTodo::saved_id) {
                                    app.track(app.reconciler.toggle(id));
                                }
                            }
                            KeyCode::Char('n') => {
                                app.mode = Mode::Create;
                                app.field = ActiveField::Title;
                                app.draft_title.clear();
                                app.draft_desc.clear();
                            }
                            KeyCode::Char('e') => {
                                if let Some(entry) = app.selected_entry().filter(|e| !e.is_pending()) {
                                    let (title, desc) = (entry.title.clone(), entry.description.clone().unwrap_or_default());
                                    app.mode = Mode::Edit;
                                    app.field = ActiveField::Title;
                                    app.draft_title = title;
                                    app.draft_desc = desc;
                                }
                            }
                            KeyCode::Char('d') => {
                                if let Some(id) = app.selected_entry().and_then(CachedTodo::saved_id) {
                                    app.track(app.reconciler.delete(id));
                                    if app.selected > 0 { app.selected -= 1; }
                                }
                            }
                            KeyCode::Char('f') => { app.filter = app.filter.next(); app.selected = 0; }
                            KeyCode::Char('r') => app.reload(),
                            _ => {}
                        }
                    }
                    Mode::Create => match key.code {
                        KeyCode::Esc => { app.mode = Mode::View; app.draft_title.clear(); app.draft_desc.clear(); }
                        KeyCode::Enter => {
                            let title = app.draft_title.trim();
                            let desc = app.draft_desc.trim();
                            if !title.is_empty() {
                                let desc_opt = if desc.is_empty() { None } else { Some(desc.to_string()) };
                                app.track(app.reconciler.create(CreateTodo { title: title.to_string(), description: desc_opt }));
                            }
                            app.mode = Mode::View;
                            app.draft_title.clear();
                            app.draft_desc.clear();
                        }
                        KeyCode::Backspace => { match app.field { ActiveField::Title => { app.draft_title.pop(); }, ActiveField::Description => { app.draft_desc.pop(); } } }
                        KeyCode::Char(c) => { match app.field { ActiveField::Title => app.draft_title.push(c), ActiveField::Description => app.draft_desc.push(c) } }
                        KeyCode::Tab => { app.field = match app.field { ActiveField::Title => ActiveField::Description, ActiveField::Description => ActiveField::Title }; }
                        _ => {}
                    },
                    Mode::Edit => match key.code {
                        KeyCode::Esc => { app.mode = Mode::View; app.draft_title.clear(); app.draft_desc.clear(); }
                        KeyCode::Enter => {
                            if let Some(id) = app.selected_entry().and_then(CachedTodo::saved_id) {
                                let title = app.draft_title.trim().to_string();
                                let desc = app.draft_desc.trim().to_string();
                                let title_opt = if title.is_empty() { None } else { Some(title) };
                                // An emptied description field clears the description.
                                let desc_opt = if desc.is_empty() { Some(None) } else { Some(Some(desc)) };
                                app.track(app.reconciler.update(id, UpdateTodo { title: title_opt, description: desc_opt, completed: None }));
                            }
                            app.mode = Mode::View;
                            app.draft_title.clear();
                            app.draft_desc.clear();
                        }
                        KeyCode::Backspace => { match app.field { ActiveField::Title => { app.draft_title.pop(); }, ActiveField::Description => { app.draft_desc.pop(); } } }
                        KeyCode::Char(c) => { match app.field { ActiveField::Title => app.draft_title.push(c), ActiveField::Description => app.draft_desc.push(c) } }
                        KeyCode::Tab => { app.field = match app.field { ActiveField::Title => ActiveField::Description, ActiveField::Description => ActiveField::Title }; }
                        _ => {}
                    },
                }
            }
        }
        if app.last_tick.elapsed() >= tick_rate {
            app.last_tick = Instant::now();
        }
    }
    Ok(())
}
