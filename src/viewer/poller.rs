//! Poll scheduling and per-cycle state.
//!
//! [`PollLoop`] owns the only timer. A cycle runs to completion inside the
//! loop, so there is never more than one outstanding. Sport, odds mode and
//! interval changes restart the timer, which fetches immediately; filter
//! edits restart only after the debounce delay has passed quietly.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::history::OddsHistory;
use super::record::{apply_filter, parse_snapshot};
use super::render::{render_records, MatchView};
use super::source::{LiveQuery, SnapshotSource};
use super::ViewerError;
use crate::config::{DEFAULT_POLL_INTERVAL_MS, DEFAULT_VIEWER_TIMEOUT_MS, MIN_POLL_INTERVAL_MS};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Controls {
    pub sport: String,
    pub odds: String,
    pub interval_ms: u64,
    pub filter: String,
}

impl Controls {
    /// Zero means "use the default"; anything under the floor is raised to it.
    pub fn interval(&self) -> Duration {
        let ms = if self.interval_ms == 0 { DEFAULT_POLL_INTERVAL_MS } else { self.interval_ms };
        Duration::from_millis(ms.max(MIN_POLL_INTERVAL_MS))
    }

    pub fn query(&self) -> LiveQuery {
        LiveQuery { sport: self.sport.clone(), odds: self.odds.clone() }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlChange {
    Sport(String),
    Odds(String),
    IntervalMs(u64),
    Filter(String),
    Refresh,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub enum Status {
    #[default]
    Idle,
    Updating,
    Ok,
    Error(String),
}

impl Status {
    pub fn label(&self) -> String {
        match self {
            Status::Idle => "idle".into(),
            Status::Updating => "updating…".into(),
            Status::Ok => "ok".into(),
            Status::Error(e) => format!("error: {e}"),
        }
    }
}

/// Everything the UI needs to draw one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub matches: Vec<MatchView>,
    pub status: Status,
    pub latency: Option<Duration>,
    pub last_update: Option<String>,
    pub controls: Controls,
}

impl Frame {
    pub fn count(&self) -> usize {
        self.matches.len()
    }
}

pub struct Viewer {
    history: OddsHistory,
    frame: Frame,
}

impl Viewer {
    pub fn new(controls: Controls) -> Self {
        Self {
            history: OddsHistory::new(),
            frame: Frame {
                matches: Vec::new(),
                status: Status::Idle,
                latency: None,
                last_update: None,
                controls,
            },
        }
    }

    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    pub fn history(&self) -> &OddsHistory {
        &self.history
    }

    pub fn begin_cycle(&mut self, controls: &Controls) {
        self.frame.status = Status::Updating;
        self.frame.controls = controls.clone();
    }

    /// A failed cycle only touches status, latency and clock: the last good
    /// render and the history stay exactly as they were.
    pub fn finish_cycle(&mut self, result: Result<Value, ViewerError>, latency: Duration) {
        metrics::counter!("viewer_cycles_total").increment(1);
        self.frame.latency = Some(latency);
        self.frame.last_update = Some(chrono::Local::now().format("%H:%M:%S").to_string());

        match result {
            Ok(body) => {
                let records = apply_filter(parse_snapshot(body), &self.frame.controls.filter);
                self.frame.matches = render_records(&records, &mut self.history);
                self.frame.status = Status::Ok;
                debug!(count = self.frame.matches.len(), tracked = self.history.len(), "cycle rendered");
            }
            Err(e) => {
                warn!(error = %e, "poll cycle failed");
                metrics::counter!("viewer_cycle_failures_total").increment(1);
                self.frame.status = Status::Error(e.to_string());
            }
        }
    }
}

pub struct PollLoop {
    source: Arc<dyn SnapshotSource>,
    controls: Controls,
    debounce: Duration,
    fetch_timeout: Duration,
}

impl PollLoop {
    pub fn new(source: Arc<dyn SnapshotSource>, controls: Controls, debounce: Duration) -> Self {
        Self {
            source,
            controls,
            debounce,
            fetch_timeout: Duration::from_millis(DEFAULT_VIEWER_TIMEOUT_MS),
        }
    }

    /// A fetch still pending after `timeout` ends the cycle as an error.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    async fn fetch(&self) -> Result<Value, ViewerError> {
        let query = self.controls.query();
        match tokio::time::timeout(self.fetch_timeout, self.source.fetch(&query)).await {
            Ok(result) => result,
            Err(_) => Err(ViewerError::Timeout(self.fetch_timeout)),
        }
    }

    /// Runs until the change sender is dropped.
    pub async fn run(mut self, mut changes: mpsc::Receiver<ControlChange>, frames: watch::Sender<Frame>) {
        let mut viewer = Viewer::new(self.controls.clone());
        let mut debounce_at: Option<Instant> = None;

        loop {
            let mut ticker = tokio::time::interval(self.controls.interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(
                sport = %self.controls.sport,
                odds = %self.controls.odds,
                interval_ms = self.controls.interval().as_millis() as u64,
                "poll timer (re)started"
            );

            loop {
                let restart = tokio::select! {
                    _ = ticker.tick() => {
                        viewer.begin_cycle(&self.controls);
                        frames.send_replace(viewer.frame().clone());

                        let started = Instant::now();
                        let result = self.fetch().await;
                        viewer.finish_cycle(result, started.elapsed());
                        frames.send_replace(viewer.frame().clone());
                        false
                    }
                    change = changes.recv() => {
                        let Some(change) = change else {
                            info!("control channel closed, poller stopping");
                            return;
                        };
                        match self.apply(change) {
                            Restart::Now => {
                                debounce_at = None;
                                true
                            }
                            Restart::Debounced => {
                                debounce_at = Some(Instant::now() + self.debounce);
                                false
                            }
                        }
                    }
                    _ = sleep_until_opt(debounce_at) => {
                        debounce_at = None;
                        true
                    }
                };
                if restart {
                    break;
                }
            }
        }
    }

    fn apply(&mut self, change: ControlChange) -> Restart {
        match change {
            ControlChange::Sport(sport) => self.controls.sport = sport,
            ControlChange::Odds(odds) => self.controls.odds = odds,
            ControlChange::IntervalMs(ms) => self.controls.interval_ms = ms,
            ControlChange::Refresh => {}
            ControlChange::Filter(filter) => {
                self.controls.filter = filter;
                return Restart::Debounced;
            }
        }
        Restart::Now
    }
}

enum Restart {
    Now,
    Debounced,
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
