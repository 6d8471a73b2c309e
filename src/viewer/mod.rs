// Live viewer: polls the collector's /live snapshot and renders it with
// per-price movement flags.
pub mod history;   // composite-key -> last numeric price
pub mod poller;    // timer, control changes, one cycle at a time
pub mod price;     // decimal/fractional price parsing and display
pub mod record;    // lenient LiveRecord decoding
pub mod render;    // snapshot -> view model with display caps
pub mod source;    // where snapshots come from (HTTP in production)
pub mod tui;       // ratatui front-end

pub use history::{Movement, OddsHistory};
pub use poller::{ControlChange, Controls, Frame, Status, Viewer};
pub use record::{LiveRecord, Selection};
pub use render::{MarketView, MatchView, OddsView, SelectionView};
pub use source::{HttpSnapshotSource, LiveQuery, SnapshotSource};

#[derive(Debug, thiserror::Error)]
pub enum ViewerError {
    #[error("HTTP {0}")]
    Status(u16),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("bad response body: {0}")]
    Decode(String),
    #[error("no response within {0:?}")]
    Timeout(std::time::Duration),
}
