//! Hand-off between the capture point and the relay.
//!
//! The interceptor runs inside the host's call path and must not touch the
//! network, so every captured payload becomes one [`BridgeEnvelope`] on an
//! unbounded channel with exactly one consumer. Envelopes are never merged or
//! deduplicated and arrive in emission order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use super::CapturedMessage;

/// Bumped whenever the envelope layout changes.
pub const BRIDGE_VERSION: u8 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum BridgeEvent {
    Captured(CapturedMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeEnvelope {
    pub version: u8,
    pub seq: u64,
    pub event: BridgeEvent,
}

#[derive(Clone)]
pub struct BridgeEmitter {
    tx: mpsc::UnboundedSender<BridgeEnvelope>,
    next_seq: Arc<AtomicU64>,
}

pub struct BridgeListener {
    rx: mpsc::UnboundedReceiver<BridgeEnvelope>,
}

pub fn channel() -> (BridgeEmitter, BridgeListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    let emitter = BridgeEmitter { tx, next_seq: Arc::new(AtomicU64::new(0)) };
    (emitter, BridgeListener { rx })
}

impl BridgeEmitter {
    /// Never blocks. Returns the sequence number, or `None` when the listener
    /// is gone (the payload is dropped).
    pub fn emit(&self, data: CapturedMessage) -> Option<u64> {
        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        let envelope = BridgeEnvelope {
            version: BRIDGE_VERSION,
            seq,
            event: BridgeEvent::Captured(data),
        };
        match self.tx.send(envelope) {
            Ok(()) => {
                metrics::counter!("capture_frames_total").increment(1);
                Some(seq)
            }
            Err(_) => {
                debug!(seq, "bridge listener closed, dropping capture");
                None
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl BridgeListener {
    pub async fn recv(&mut self) -> Option<BridgeEnvelope> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<BridgeEnvelope> {
        self.rx.try_recv().ok()
    }
}
