use std::io::{self, Stdout};
use std::sync::Arc;

use crossterm::{
    event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use futures::StreamExt;
use itertools::Itertools;
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
    Terminal,
};
use tokio::sync::{mpsc, watch};
use tracing::info;

use super::history::Movement;
use super::poller::{ControlChange, Controls, Frame, PollLoop, Status, Viewer};
use super::render::{MatchView, OddsView};
use super::source::HttpSnapshotSource;
use crate::config::{ViewerSettings, MIN_POLL_INTERVAL_MS};

const INTERVAL_STEP_MS: u64 = 250;

#[derive(Debug, PartialEq)]
pub enum KeyOutcome {
    Quit,
    Change(ControlChange),
    Redraw,
}

/// Local mirror of the controls plus input state.
pub struct App {
    controls: Controls,
    sports: Vec<String>,
    editing_filter: bool,
    scroll: u16,
}

impl App {
    pub fn new(controls: Controls, sports: Vec<String>) -> Self {
        let sports = if sports.is_empty() { vec![controls.sport.clone()] } else { sports };
        Self { controls, sports, editing_filter: false, scroll: 0 }
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> KeyOutcome {
        if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
            return KeyOutcome::Quit;
        }
        if self.editing_filter {
            return match key.code {
                KeyCode::Enter | KeyCode::Esc => {
                    self.editing_filter = false;
                    KeyOutcome::Redraw
                }
                KeyCode::Backspace => {
                    self.controls.filter.pop();
                    KeyOutcome::Change(ControlChange::Filter(self.controls.filter.clone()))
                }
                KeyCode::Char(c) => {
                    self.controls.filter.push(c);
                    KeyOutcome::Change(ControlChange::Filter(self.controls.filter.clone()))
                }
                _ => KeyOutcome::Redraw,
            };
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => KeyOutcome::Quit,
            KeyCode::Char('s') => {
                let next = self
                    .sports
                    .iter()
                    .position(|s| *s == self.controls.sport)
                    .map_or(0, |i| (i + 1) % self.sports.len());
                self.controls.sport = self.sports[next].clone();
                KeyOutcome::Change(ControlChange::Sport(self.controls.sport.clone()))
            }
            KeyCode::Char('o') => {
                self.controls.odds = if self.controls.odds == "0" { "1".into() } else { "0".into() };
                KeyOutcome::Change(ControlChange::Odds(self.controls.odds.clone()))
            }
            KeyCode::Char('+') | KeyCode::Char('=') => {
                self.controls.interval_ms = self.effective_interval_ms() + INTERVAL_STEP_MS;
                KeyOutcome::Change(ControlChange::IntervalMs(self.controls.interval_ms))
            }
            KeyCode::Char('-') => {
                self.controls.interval_ms = self
                    .effective_interval_ms()
                    .saturating_sub(INTERVAL_STEP_MS)
                    .max(MIN_POLL_INTERVAL_MS);
                KeyOutcome::Change(ControlChange::IntervalMs(self.controls.interval_ms))
            }
            KeyCode::Char('r') => KeyOutcome::Change(ControlChange::Refresh),
            KeyCode::Char('/') => {
                self.editing_filter = true;
                KeyOutcome::Redraw
            }
            KeyCode::Down => {
                self.scroll = self.scroll.saturating_add(1);
                KeyOutcome::Redraw
            }
            KeyCode::Up => {
                self.scroll = self.scroll.saturating_sub(1);
                KeyOutcome::Redraw
            }
            _ => KeyOutcome::Redraw,
        }
    }

    fn effective_interval_ms(&self) -> u64 {
        self.controls.interval().as_millis() as u64
    }
}

pub async fn run(settings: &ViewerSettings) -> anyhow::Result<()> {
    let controls = Controls {
        sport: settings.sports.first().cloned().unwrap_or_else(|| "soccer".into()),
        odds: settings.odds.clone(),
        interval_ms: settings.interval_ms,
        filter: String::new(),
    };
    let source = Arc::new(HttpSnapshotSource::new(&settings.base_url, settings.request_timeout())?);
    let (changes_tx, changes_rx) = mpsc::channel(32);
    let (frames_tx, frames_rx) = watch::channel(Viewer::new(controls.clone()).frame().clone());
    let poller = tokio::spawn(
        PollLoop::new(source, controls.clone(), settings.filter_debounce())
            .with_fetch_timeout(settings.request_timeout())
            .run(changes_rx, frames_tx),
    );
    info!(base_url = %settings.base_url, "viewer started");

    let mut terminal = setup_terminal()?;
    let app = App::new(controls, settings.sports.clone());
    let result = event_loop(&mut terminal, app, changes_tx, frames_rx).await;
    restore_terminal(&mut terminal)?;
    poller.abort();
    result
}

fn setup_terminal() -> io::Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<Stdout>>) -> io::Result<()> {
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()
}

async fn event_loop(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    mut app: App,
    changes: mpsc::Sender<ControlChange>,
    mut frames: watch::Receiver<Frame>,
) -> anyhow::Result<()> {
    let mut events = EventStream::new();
    loop {
        terminal.draw(|f| {
            let frame = frames.borrow();
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([Constraint::Length(4), Constraint::Min(3), Constraint::Length(1)])
                .split(f.area());

            f.render_widget(header(&app, &frame), chunks[0]);
            f.render_widget(
                Paragraph::new(body_lines(&frame.matches))
                    .block(Block::default().title(" Live ").borders(Borders::ALL))
                    .scroll((app.scroll, 0)),
                chunks[1],
            );
            f.render_widget(
                Paragraph::new(" q quit  s sport  o odds  +/- interval  / filter  r refresh  ↑↓ scroll")
                    .style(Style::default().fg(Color::DarkGray)),
                chunks[2],
            );
        })?;

        tokio::select! {
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    match app.handle_key(key) {
                        KeyOutcome::Quit => break,
                        KeyOutcome::Change(change) => {
                            if changes.send(change).await.is_err() {
                                break;
                            }
                        }
                        KeyOutcome::Redraw => {}
                    }
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
                None => break,
            }
        }
    }
    Ok(())
}

fn header<'a>(app: &App, frame: &Frame) -> Paragraph<'a> {
    let status_style = match frame.status {
        Status::Ok => Style::default().fg(Color::Green),
        Status::Error(_) => Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        _ => Style::default().fg(Color::Yellow),
    };
    let latency = frame
        .latency
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "—".into());
    let cursor = if app.editing_filter { "_" } else { "" };

    let lines = vec![
        Line::from(vec![
            Span::styled(frame.status.label(), status_style),
            Span::raw(format!(
                "  latency {}  last {}  live {}",
                latency,
                frame.last_update.as_deref().unwrap_or("—"),
                frame.count()
            )),
        ]),
        Line::from(format!(
            "sport {}  odds {}  every {}ms  filter: {}{}",
            app.controls.sport,
            if app.controls.odds == "0" { "off" } else { "on" },
            app.effective_interval_ms(),
            app.controls.filter,
            cursor
        )),
    ];
    Paragraph::new(lines).block(Block::default().title(" liverelay ").borders(Borders::ALL))
}

fn body_lines(matches: &[MatchView]) -> Vec<Line<'static>> {
    let dim = Style::default().fg(Color::DarkGray);
    let mut lines = Vec::new();

    for m in matches {
        lines.push(Line::from(vec![
            Span::styled(m.title.clone(), Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(format!("  [{}]  {}", m.score, clock_line(m))),
            Span::styled(format!("  id: {}", m.id), dim),
        ]));
        if !m.league.is_empty() {
            lines.push(Line::from(Span::styled(format!("  {}", m.league), dim)));
        }

        match &m.odds {
            OddsView::Disabled => lines.push(Line::from(Span::styled("  odds: disabled", dim))),
            OddsView::Empty => lines.push(Line::from(Span::styled("  no odds available", dim))),
            OddsView::Markets(markets) => {
                for market in markets {
                    lines.push(Line::from(Span::styled(
                        format!("  {}", market.name),
                        Style::default().fg(Color::Cyan),
                    )));
                    if market.selections.is_empty() {
                        lines.push(Line::from(Span::styled("    no selections", dim)));
                        continue;
                    }
                    let mut spans = vec![Span::raw("   ")];
                    for sel in &market.selections {
                        spans.push(Span::raw(format!(" {} ", sel.name)));
                        spans.push(price_span(&sel.price, sel.movement));
                    }
                    lines.push(Line::from(spans));
                }
            }
        }
        lines.push(Line::default());
    }
    lines
}

fn clock_line(m: &MatchView) -> String {
    [m.time.as_str(), m.period.as_str()].into_iter().filter(|s| !s.is_empty()).join(" • ")
}

fn price_span(price: &str, movement: Movement) -> Span<'static> {
    match movement {
        Movement::Up => Span::styled(format!("{price}▲"), Style::default().fg(Color::Green)),
        Movement::Down => Span::styled(format!("{price}▼"), Style::default().fg(Color::Red)),
        Movement::Unchanged => Span::raw(format!("{price} ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn app() -> App {
        let controls = Controls {
            sport: "soccer".into(),
            odds: "1".into(),
            interval_ms: 1000,
            filter: String::new(),
        };
        App::new(controls, vec!["soccer".into(), "basketball".into()])
    }

    fn change(outcome: KeyOutcome) -> ControlChange {
        match outcome {
            KeyOutcome::Change(c) => c,
            other => panic!("expected a change, got {other:?}"),
        }
    }

    #[test]
    fn test_sport_cycles_through_list() {
        let mut app = app();
        assert!(matches!(change(app.handle_key(key(KeyCode::Char('s')))), ControlChange::Sport(s) if s == "basketball"));
        assert!(matches!(change(app.handle_key(key(KeyCode::Char('s')))), ControlChange::Sport(s) if s == "soccer"));
    }

    #[test]
    fn test_odds_toggle_and_interval_steps() {
        let mut app = app();
        assert!(matches!(change(app.handle_key(key(KeyCode::Char('o')))), ControlChange::Odds(o) if o == "0"));
        assert!(matches!(change(app.handle_key(key(KeyCode::Char('+')))), ControlChange::IntervalMs(1250)));
        for _ in 0..10 {
            app.handle_key(key(KeyCode::Char('-')));
        }
        assert_eq!(app.controls.interval_ms, MIN_POLL_INTERVAL_MS);
    }

    #[test]
    fn test_filter_editing() {
        let mut app = app();
        assert_eq!(app.handle_key(key(KeyCode::Char('/'))), KeyOutcome::Redraw);
        // 'q' is text while editing, not quit
        assert!(matches!(change(app.handle_key(key(KeyCode::Char('q')))), ControlChange::Filter(f) if f == "q"));
        assert!(matches!(change(app.handle_key(key(KeyCode::Backspace))), ControlChange::Filter(f) if f.is_empty()));
        assert_eq!(app.handle_key(key(KeyCode::Enter)), KeyOutcome::Redraw);
        assert_eq!(app.handle_key(key(KeyCode::Char('q'))), KeyOutcome::Quit);
    }

    #[test]
    fn test_body_placeholders() {
        let m = MatchView {
            id: "7".into(),
            title: "A v B".into(),
            league: String::new(),
            time: "10:00".into(),
            score: "—".into(),
            period: "1st".into(),
            odds: OddsView::Disabled,
        };
        let lines = body_lines(&[m]);
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[1].spans[0].content, "  odds: disabled");
    }
}
