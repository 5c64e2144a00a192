use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use camino::Utf8PathBuf;
use crossterm::ExecutableCommand;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use miette::IntoDiagnostic;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Alignment, Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Paragraph, Wrap};
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};

use crate::app::App;
use crate::archive::ArchiveWriter;
use crate::domain::RepositoryRecord;
use crate::downloads::DownloadsController;
use crate::events::{Notification, PathRequest};
use crate::github::GithubClient;
use crate::search::{SearchController, SearchState};

const EVENTS_MAX: usize = 8;
const POLL_INTERVAL: Duration = Duration::from_millis(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum View {
    Search,
    Downloads,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Query,
    /// The search controller is waiting for a storage directory.
    Path,
}

/// Two-screen terminal front end over the search and downloads controllers.
pub struct Tui<'a, G: GithubClient, W: ArchiveWriter> {
    app: &'a App<G, W>,
    search: SearchController<G, W>,
    downloads: DownloadsController<G, W>,
    search_state: watch::Receiver<SearchState>,
    notifications: broadcast::Receiver<Notification>,
    path_requests: broadcast::Receiver<PathRequest>,
    view: View,
    input_mode: InputMode,
    query: String,
    path_input: String,
    selected: usize,
    events: VecDeque<String>,
}

impl<'a, G, W> Tui<'a, G, W>
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    pub fn new(app: &'a App<G, W>) -> Self {
        let search = app.search_controller();
        let downloads = app.downloads_controller();
        let search_state = search.state();
        let notifications = search.subscribe_notifications();
        let path_requests = search.subscribe_path_requests();
        Self {
            app,
            search,
            downloads,
            search_state,
            notifications,
            path_requests,
            view: View::Search,
            input_mode: InputMode::Query,
            query: String::new(),
            path_input: String::new(),
            selected: 0,
            events: VecDeque::new(),
        }
    }

    /// Runs until the user quits. Controller tasks are spawned on `handle`.
    pub fn run(&mut self, handle: &Handle) -> miette::Result<()> {
        let _runtime = handle.enter();
        self.downloads.start();

        let mut stdout = io::stdout();
        enable_raw_mode().into_diagnostic()?;
        stdout.execute(EnterAlternateScreen).into_diagnostic()?;

        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend).into_diagnostic()?;
        terminal.clear().into_diagnostic()?;

        let result = self.event_loop(&mut terminal);

        disable_raw_mode().into_diagnostic()?;
        let mut stdout = io::stdout();
        stdout.execute(LeaveAlternateScreen).into_diagnostic()?;
        result
    }

    fn event_loop(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> miette::Result<()> {
        loop {
            self.drain_channels();
            let tui = &*self;
            terminal
                .draw(|frame| draw_ui(frame, tui))
                .into_diagnostic()?;

            if event::poll(POLL_INTERVAL).into_diagnostic()? {
                if let Event::Key(key) = event::read().into_diagnostic()? {
                    if self.handle_key(key) {
                        return Ok(());
                    }
                }
            }
        }
    }

    fn drain_channels(&mut self) {
        loop {
            match self.notifications.try_recv() {
                Ok(notification) => push_event(&mut self.events, notification.message()),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
        loop {
            match self.path_requests.try_recv() {
                Ok(_) => {
                    self.input_mode = InputMode::Path;
                    self.path_input.clear();
                    push_event(&mut self.events, "choose a directory for the archive");
                }
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => break,
            }
        }
    }

    fn visible(&self) -> Vec<RepositoryRecord> {
        match self.view {
            View::Downloads => self.downloads.visible(),
            _ => self.search.visible(),
        }
    }

    fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return true;
        }

        match key.code {
            KeyCode::Esc => {
                if self.input_mode == InputMode::Path {
                    self.input_mode = InputMode::Query;
                    push_event(&mut self.events, "download waits for a storage location");
                    return false;
                }
                if self.view == View::Help {
                    self.view = View::Search;
                    return false;
                }
                return true;
            }
            KeyCode::F(1) => self.view = View::Help,
            KeyCode::Tab => {
                self.view = match self.view {
                    View::Search => View::Downloads,
                    _ => View::Search,
                };
                self.selected = 0;
            }
            KeyCode::Up => self.selected = self.selected.saturating_sub(1),
            KeyCode::Down => {
                let len = self.visible().len();
                if self.selected + 1 < len {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.submit(),
            KeyCode::Backspace => {
                match self.input_mode {
                    InputMode::Query => {
                        self.query.pop();
                        self.search.on_query_changed(&self.query);
                    }
                    InputMode::Path => {
                        self.path_input.pop();
                    }
                }
            }
            KeyCode::Char(ch) => match self.input_mode {
                InputMode::Query => {
                    self.query.push(ch);
                    self.selected = 0;
                    self.search.on_query_changed(&self.query);
                }
                InputMode::Path => self.path_input.push(ch),
            },
            _ => {}
        }
        false
    }

    fn submit(&mut self) {
        match self.input_mode {
            InputMode::Path => {
                let Some(dir) = self.chosen_dir() else {
                    push_event(&mut self.events, "enter a directory path");
                    return;
                };
                match self.app.location_for(&dir) {
                    Ok(location) => self.search.spawn_location_chosen(location),
                    Err(err) => {
                        push_event(&mut self.events, &err.to_string());
                        return;
                    }
                }
                self.input_mode = InputMode::Query;
                self.path_input.clear();
            }
            InputMode::Query => {
                if self.view != View::Search {
                    return;
                }
                if let Some(record) = self.visible().get(self.selected).cloned() {
                    self.search.spawn_download(record);
                }
            }
        }
    }

    fn chosen_dir(&self) -> Option<Utf8PathBuf> {
        let raw = self.path_input.trim();
        if raw.is_empty() {
            return None;
        }
        match (raw.strip_prefix("~/"), self.app.store().home_dir()) {
            (Some(rest), Some(home)) => Some(home.join(rest)),
            _ => Some(Utf8PathBuf::from(raw)),
        }
    }
}

fn draw_ui<G, W>(frame: &mut ratatui::Frame, tui: &Tui<'_, G, W>)
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    if tui.view == View::Help {
        draw_help(frame);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(8),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let state = *tui.search_state.borrow();
    frame.render_widget(draw_header(tui.view, state), chunks[0]);

    let main = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
        .split(chunks[1]);

    let records = tui.visible();
    frame.render_widget(draw_records(tui.view, &records, tui.selected), main[0]);
    frame.render_widget(draw_events(&tui.events), main[1]);

    draw_input_line(frame, tui, chunks[2]);
}

fn draw_header(view: View, state: SearchState) -> Paragraph<'static> {
    let (state_label, state_color) = match state {
        SearchState::Idle => ("idle", Color::Gray),
        SearchState::Loading => ("loading", Color::Yellow),
        SearchState::Ready => ("ready", Color::Green),
    };
    let screen = match view {
        View::Search => "Search",
        View::Downloads => "Downloads",
        View::Help => "Help",
    };
    let line = Line::from(vec![
        Span::styled(
            "GHV",
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::raw(" "),
        Span::styled(env!("CARGO_PKG_VERSION"), Style::default().fg(Color::Gray)),
        Span::raw("   Screen: "),
        Span::styled(screen, Style::default().fg(Color::Cyan)),
        Span::raw("   Search: "),
        Span::styled(state_label, Style::default().fg(state_color)),
    ]);
    let keys = Line::from(Span::styled(
        "Tab switch screen · Enter download · F1 help · Esc quit",
        Style::default().fg(Color::DarkGray),
    ));
    Paragraph::new(vec![line, keys])
        .alignment(Alignment::Left)
        .block(Block::default().borders(Borders::BOTTOM))
}

fn draw_records(view: View, records: &[RepositoryRecord], selected: usize) -> Paragraph<'static> {
    let title = match view {
        View::Downloads => " Downloaded ",
        _ => " Repositories ",
    };
    let lines: Vec<Line<'static>> = if records.is_empty() {
        vec![Line::from(Span::styled(
            "nothing to show",
            Style::default().fg(Color::DarkGray),
        ))]
    } else {
        records
            .iter()
            .enumerate()
            .map(|(index, record)| record_line(record, index == selected))
            .collect()
    };
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: true })
}

fn record_line(record: &RepositoryRecord, selected: bool) -> Line<'static> {
    let marker = if record.is_downloaded() { "●" } else { " " };
    let name_style = if selected {
        Style::default()
            .fg(Color::Black)
            .bg(Color::Cyan)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(Color::White)
    };
    let mut spans = vec![
        Span::styled(format!("{marker} "), Style::default().fg(Color::Green)),
        Span::styled(
            format!("{}/{}", record.owner_login, record.project_name),
            name_style,
        ),
        Span::styled(
            format!("  ★{}", record.project_stars_count),
            Style::default().fg(Color::Yellow),
        ),
    ];
    if !record.project_description.is_empty() {
        spans.push(Span::styled(
            format!("  {}", record.project_description),
            Style::default().fg(Color::Gray),
        ));
    }
    Line::from(spans)
}

fn draw_events(events: &VecDeque<String>) -> Paragraph<'static> {
    let lines: Vec<Line<'static>> = events
        .iter()
        .map(|event| Line::from(event.clone()))
        .collect();
    Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Events "))
        .wrap(Wrap { trim: true })
}

fn draw_input_line<G, W>(frame: &mut ratatui::Frame, tui: &Tui<'_, G, W>, area: Rect)
where
    G: GithubClient + 'static,
    W: ArchiveWriter + 'static,
{
    let (prefix, input) = match tui.input_mode {
        InputMode::Query => ("login> ", tui.query.as_str()),
        InputMode::Path => ("save to> ", tui.path_input.as_str()),
    };
    let line = Line::from(vec![
        Span::styled(
            prefix,
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        ),
        Span::styled(input.to_string(), Style::default().fg(Color::White)),
    ]);
    frame.render_widget(
        Paragraph::new(line).block(Block::default().borders(Borders::TOP)),
        area,
    );

    let width = (prefix.chars().count() + input.chars().count()) as u16;
    let cursor_x = area
        .x
        .saturating_add(width)
        .min(area.x.saturating_add(area.width.saturating_sub(1)));
    frame.set_cursor_position((cursor_x, area.y.saturating_add(1)));
}

fn draw_help(frame: &mut ratatui::Frame) {
    let lines = vec![
        Line::from("Type a GitHub login to search its repositories."),
        Line::from("Results from the local cache show first, then the network."),
        Line::from(""),
        Line::from("Up/Down   select a repository"),
        Line::from("Enter     download the selected repository"),
        Line::from("Tab       switch between Search and Downloads"),
        Line::from("Esc       close help, cancel a path prompt, or quit"),
    ];
    let help = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(" Help "))
        .wrap(Wrap { trim: true });
    frame.render_widget(help, frame.area());
}

fn push_event(buffer: &mut VecDeque<String>, message: &str) {
    buffer.push_back(format!("[{}] {message}", timestamp()));
    while buffer.len() > EVENTS_MAX {
        buffer.pop_front();
    }
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}
