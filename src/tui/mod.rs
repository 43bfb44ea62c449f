//! Terminal User Interface for `proxtop watch`

use std::io::{self, Write};
use std::sync::Arc;
use std::time::Duration;

use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::{Backend, CrosstermBackend},
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
    Frame, Terminal,
};
use tokio::sync::{mpsc, watch};

use crate::error::{ProxtopError, Result};
use crate::models::{ConsolidationFunction, Metric, Timeframe};
use crate::monitor::{Collector, GuestFilter, RankedEntry, Snapshot};

/// What the live view shows
#[derive(Debug, Clone)]
pub struct ViewOptions {
    pub host: String,
    pub timeframe: Timeframe,
    pub cf: ConsolidationFunction,
    pub limit: usize,
    pub metrics: Vec<Metric>,
    pub group_by_node: bool,
    pub interval: Duration,
}

/// Message from the collector task
#[derive(Debug, Clone)]
pub enum Update {
    /// First round still running
    Pending,
    Snapshot(Arc<Snapshot>),
    Error(String),
}

/// TUI application state
pub struct App {
    view: ViewOptions,
    selected: usize,
    group_by_node: bool,
    snapshot: Option<Arc<Snapshot>>,
    status: String,
}

impl App {
    /// Create a new app state
    pub fn new(view: ViewOptions) -> Self {
        let group_by_node = view.group_by_node;
        Self {
            view,
            selected: 0,
            group_by_node,
            snapshot: None,
            status: "Collecting...".to_string(),
        }
    }

    /// Currently selected metric
    pub fn metric(&self) -> Metric {
        self.view
            .metrics
            .get(self.selected)
            .copied()
            .unwrap_or(Metric::Cpu)
    }

    pub fn next_metric(&mut self) {
        if !self.view.metrics.is_empty() {
            self.selected = (self.selected + 1) % self.view.metrics.len();
        }
    }

    pub fn previous_metric(&mut self) {
        let len = self.view.metrics.len();
        if len > 0 {
            self.selected = (self.selected + len - 1) % len;
        }
    }

    pub fn toggle_grouping(&mut self) {
        self.group_by_node = !self.group_by_node;
    }

    /// Take in a collector update; an error keeps the last good snapshot
    pub fn apply(&mut self, update: Update) {
        match update {
            Update::Pending => self.status = "Collecting...".to_string(),
            Update::Snapshot(snapshot) => {
                self.status = format!(
                    "Updated {}",
                    snapshot
                        .taken_at
                        .with_timezone(&chrono::Local)
                        .format("%H:%M:%S")
                );
                self.snapshot = Some(snapshot);
            }
            Update::Error(e) => self.status = format!("Error: {}", e),
        }
    }

    /// Handle a key press; returns false when the view should close
    pub fn on_key(&mut self, key: KeyEvent, refresh: &mpsc::Sender<()>) -> bool {
        // Raw mode turns Ctrl-C into a key event
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return false,
            KeyCode::Tab | KeyCode::Right | KeyCode::Char('l') => self.next_metric(),
            KeyCode::BackTab | KeyCode::Left | KeyCode::Char('h') => self.previous_metric(),
            KeyCode::Char('g') => self.toggle_grouping(),
            KeyCode::Char('r') => {
                if refresh.try_send(()).is_ok() {
                    self.status = "Refreshing...".to_string();
                }
            }
            _ => {}
        }
        true
    }
}

/// Run the live view until the user quits
pub async fn run(collector: Collector, filter: GuestFilter, view: ViewOptions) -> Result<()> {
    let (update_tx, update_rx) = watch::channel(Update::Pending);
    let (refresh_tx, mut refresh_rx) = mpsc::channel::<()>(1);

    let interval = view.interval;
    let timeframe = view.timeframe;
    let cf = view.cf;
    let worker = tokio::spawn(async move {
        loop {
            let update = match collector.collect(&filter, timeframe, cf, None).await {
                Ok(snapshot) => Update::Snapshot(Arc::new(snapshot)),
                Err(e) => Update::Error(e.to_string()),
            };
            if update_tx.send(update).is_err() {
                break;
            }
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                request = refresh_rx.recv() => {
                    if request.is_none() {
                        break;
                    }
                }
            }
        }
    });

    let app = App::new(view);
    let ui = tokio::task::spawn_blocking(move || run_terminal(app, update_rx, refresh_tx));
    let result = ui
        .await
        .map_err(|e| ProxtopError::Terminal(e.to_string()))?;

    worker.abort();
    result
}

/// Raw mode and the alternate screen, undone on drop whatever the exit path
struct TerminalGuard<W: Write> {
    out: W,
    raw: bool,
    alternate: bool,
}

impl<W: Write> TerminalGuard<W> {
    fn enter(out: W) -> Result<Self> {
        enable_raw_mode()?;
        let mut guard = Self {
            out,
            raw: true,
            alternate: false,
        };
        execute!(guard.out, EnterAlternateScreen)?;
        guard.alternate = true;
        Ok(guard)
    }
}

impl<W: Write> Drop for TerminalGuard<W> {
    fn drop(&mut self) {
        if self.alternate {
            let _ = execute!(self.out, LeaveAlternateScreen, cursor::Show);
        }
        if self.raw {
            let _ = disable_raw_mode();
        }
    }
}

fn run_terminal(mut app: App, mut updates: watch::Receiver<Update>, refresh: mpsc::Sender<()>) -> Result<()> {
    let _guard = TerminalGuard::enter(io::stdout())?;
    let mut terminal = Terminal::new(CrosstermBackend::new(io::stdout()))?;

    event_loop(&mut terminal, &mut app, &mut updates, &refresh)
}

fn event_loop<B: Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    updates: &mut watch::Receiver<Update>,
    refresh: &mpsc::Sender<()>,
) -> Result<()> {
    loop {
        if updates.has_changed().unwrap_or(false) {
            let update = updates.borrow_and_update().clone();
            app.apply(update);
        }

        terminal.draw(|f| ui(f, app))?;

        if event::poll(Duration::from_millis(250))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press && !app.on_key(key, refresh) {
                    return Ok(());
                }
            }
        }
    }
}

fn ranking_lines(entries: &[RankedEntry<'_>], metric: Metric) -> Vec<Line<'static>> {
    entries
        .iter()
        .map(|entry| {
            let res = &entry.guest.resource;
            Line::from(vec![
                Span::raw(format!("{:>4}  ", entry.rank)),
                Span::styled(
                    format!("{:>12}  ", metric.format(entry.stats.avg)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    format!("{:>12}  ", metric.format(entry.stats.max)),
                    Style::default().fg(Color::DarkGray),
                ),
                Span::raw(format!(
                    "{} ({})",
                    res.display_name(),
                    res.vmid.map_or_else(|| "-".to_string(), |id| id.to_string())
                )),
                Span::styled(
                    format!(" @ {}", res.node.as_deref().unwrap_or("?")),
                    Style::default().fg(Color::DarkGray),
                ),
            ])
        })
        .collect()
}

fn ui(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(
            [
                Constraint::Length(3), // Header
                Constraint::Length(3), // Metric tabs
                Constraint::Min(5),    // Ranking
                Constraint::Length(3), // Status
            ]
            .as_ref(),
        )
        .split(f.size());

    // Header
    let guests = app
        .snapshot
        .as_ref()
        .map_or_else(|| "-".to_string(), |s| s.guests.len().to_string());
    let failed = app.snapshot.as_ref().map_or(0, |s| s.failures.len());
    let header = Paragraph::new(Line::from(vec![
        Span::styled("proxtop ", Style::default().add_modifier(Modifier::BOLD)),
        Span::styled(app.view.host.clone(), Style::default().fg(Color::Cyan)),
        Span::raw(format!(
            "  last {}  guests {}  failed {}",
            app.view.timeframe, guests, failed
        )),
    ]))
    .block(Block::default().borders(Borders::ALL));
    f.render_widget(header, chunks[0]);

    // Metric tabs
    let titles: Vec<Line> = app
        .view
        .metrics
        .iter()
        .map(|m| Line::from(m.label()))
        .collect();
    let tabs = Tabs::new(titles)
        .select(app.selected)
        .block(Block::default().borders(Borders::ALL))
        .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
    f.render_widget(tabs, chunks[1]);

    // Ranking
    let metric = app.metric();
    let mut lines = vec![Line::from(Span::styled(
        format!("{:>4}  {:>12}  {:>12}  {}", "#", "AVG", "MAX", "GUEST"),
        Style::default().add_modifier(Modifier::DIM),
    ))];
    match app.snapshot {
        Some(ref snapshot) if app.group_by_node => {
            for (node, entries) in snapshot.top_by_node(metric, app.view.limit) {
                lines.push(Line::from(Span::styled(
                    node,
                    Style::default().add_modifier(Modifier::BOLD),
                )));
                lines.extend(ranking_lines(&entries, metric));
            }
        }
        Some(ref snapshot) => {
            lines.extend(ranking_lines(&snapshot.top(metric, app.view.limit), metric));
        }
        None => {}
    }
    if lines.len() == 1 {
        lines.push(Line::from("  (no data)"));
    }
    let title = if app.group_by_node {
        format!("{} by node", metric.label())
    } else {
        metric.label().to_string()
    };
    let ranking = Paragraph::new(lines).block(Block::default().title(title).borders(Borders::ALL));
    f.render_widget(ranking, chunks[2]);

    // Status
    let status = Paragraph::new(format!(
        "{}  |  q quit  tab/h/l metric  g group  r refresh",
        app.status
    ))
    .block(Block::default().title("Status").borders(Borders::ALL));
    f.render_widget(status, chunks[3]);
}
