//! Runtime settings for the relay and the viewer.
//!
//! Layering, lowest priority first: built-in defaults, an optional
//! `liverelay.toml` (or the file passed with `--config`), then environment
//! variables such as `LIVERELAY__RELAY__CONTROL_ADDR`.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};

/// Endpoint written to durable storage on first run.
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8485/data";

/// Durable storage key holding the relay destination.
pub const API_URL_KEY: &str = "apiUrl";

/// Host readiness probe period.
pub const DEFAULT_HOOK_INTERVAL_MS: u64 = 1000;

/// Viewer poll interval floor.
pub const MIN_POLL_INTERVAL_MS: u64 = 250;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

pub const DEFAULT_FILTER_DEBOUNCE_MS: u64 = 250;

/// Upper bound on one viewer fetch; a stalled collector becomes an error cycle.
pub const DEFAULT_VIEWER_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub log_filter: String,
    pub metrics_addr: SocketAddr,
    pub relay: RelaySettings,
    pub viewer: ViewerSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelaySettings {
    /// WebSocket feed consumed by the host transport. Unset = no host.
    pub feed_url: Option<String>,
    /// Text frame sent once the feed connection is open.
    pub subscribe: Option<String>,
    pub control_addr: SocketAddr,
    pub storage_path: PathBuf,
    pub hook_interval_ms: u64,
    pub request_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewerSettings {
    pub base_url: String,
    pub sports: Vec<String>,
    pub odds: String,
    pub interval_ms: u64,
    pub filter_debounce_ms: u64,
    pub request_timeout_ms: u64,
    pub log_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_filter: "info".into(),
            metrics_addr: SocketAddr::from(([0, 0, 0, 0], 9000)),
            relay: RelaySettings::default(),
            viewer: ViewerSettings::default(),
        }
    }
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            feed_url: None,
            subscribe: None,
            control_addr: SocketAddr::from(([127, 0, 0, 1], 8486)),
            storage_path: PathBuf::from("liverelay-store.json"),
            hook_interval_ms: DEFAULT_HOOK_INTERVAL_MS,
            request_timeout_ms: 10_000,
        }
    }
}

impl Default for ViewerSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8485".into(),
            sports: vec!["soccer".into()],
            odds: "1".into(),
            interval_ms: DEFAULT_POLL_INTERVAL_MS,
            filter_debounce_ms: DEFAULT_FILTER_DEBOUNCE_MS,
            request_timeout_ms: DEFAULT_VIEWER_TIMEOUT_MS,
            log_dir: PathBuf::from("logs"),
        }
    }
}

impl RelaySettings {
    pub fn hook_interval(&self) -> Duration {
        Duration::from_millis(self.hook_interval_ms.max(1))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ViewerSettings {
    pub fn filter_debounce(&self) -> Duration {
        Duration::from_millis(self.filter_debounce_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms.max(1))
    }
}

impl Settings {
    /// Load settings. `path` must exist when given; otherwise `liverelay.toml`
    /// in the working directory is used if present.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let file = match path {
            Some(p) => config::File::from(p).required(true),
            None => config::File::with_name("liverelay").required(false),
        };

        let cfg = config::Config::builder()
            .add_source(
                config::Config::try_from(&Settings::default())
                    .context("failed to seed default settings")?,
            )
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("LIVERELAY")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("viewer.sports"),
            )
            .build()
            .context("failed to build settings")?;

        cfg.try_deserialize().context("invalid settings")
    }
}
