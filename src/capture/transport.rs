// Host feed transport: owns the websocket and pushes every data frame through
// the method slot. Its own callback only lands in the slot once the socket is
// open, so anything that wants to hook it has to wait.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

use super::interceptor::{DataCallback, HostError, MethodSlot};

/// Delay between a dropped connection and the next attempt.
pub const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// The host's own handling of a frame: count it and report the running total.
#[derive(Default)]
pub struct FrameCounter {
    frames: AtomicU64,
}

impl FrameCounter {
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl DataCallback for FrameCounter {
    fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        let n = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(frame = n, argc = args.len(), "host frame");
        Ok(Value::from(n))
    }
}

pub struct FeedTransport {
    pub ws_url: String,
    pub subscribe: Option<String>,
    slot: Arc<MethodSlot>,
    host_callback: Arc<FrameCounter>,
}

impl FeedTransport {
    pub fn new(ws_url: &str, subscribe: Option<String>, slot: Arc<MethodSlot>) -> Self {
        Self {
            ws_url: ws_url.to_string(),
            subscribe,
            slot,
            host_callback: Arc::new(FrameCounter::default()),
        }
    }

    pub fn frames_seen(&self) -> u64 {
        self.host_callback.frames()
    }

    /// Connect, read until the socket drops, wait, repeat. Never returns.
    pub async fn run(&self) {
        loop {
            if let Err(e) = self.stream_once().await {
                error!(url = %self.ws_url, error = %e, "feed connection failed");
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    async fn stream_once(&self) -> anyhow::Result<()> {
        info!(url = %self.ws_url, "connecting to feed");
        let (ws_stream, response) = tokio_tungstenite::connect_async(self.ws_url.as_str()).await?;
        info!(status = %response.status(), "feed connected");
        let (mut write, mut read) = ws_stream.split();

        if let Some(sub) = &self.subscribe {
            write.send(Message::Text(sub.clone())).await?;
            debug!("subscription sent");
        }

        // a reconnect must not clobber a wrapper installed around our callback
        if !self.slot.is_installed() {
            self.slot.install(self.host_callback.clone());
            info!("host data callback registered");
        }

        while let Some(msg) = read.next().await {
            match msg? {
                Message::Close(_) => {
                    warn!("feed closed by server");
                    break;
                }
                other => {
                    if let Some(frame) = frame_payload(other) {
                        if let Some(Err(e)) = self.slot.dispatch(&[frame]) {
                            warn!(error = %e, "host callback rejected frame");
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

/// Data frames become callback arguments; control frames are not data.
pub fn frame_payload(msg: Message) -> Option<Value> {
    match msg {
        Message::Text(text) => Some(Value::String(text)),
        Message::Binary(bytes) => Some(Value::from(bytes)),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => None,
    }
}
