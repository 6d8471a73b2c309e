//! Background runtime: the one place that talks to the outside world.
//!
//! Callers post [`RuntimeMessage`]s through a [`RuntimeHandle`]. The service
//! loop handles them one at a time in arrival order: forwards are issued (not
//! awaited) and endpoint changes are applied before the next message, so the
//! last SET_API_URL received is the one that sticks.

use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::forwarder::Relay;
use super::{RelayError, RelayResult};
use crate::capture::bridge::{BridgeEvent, BridgeListener, BRIDGE_VERSION};
use crate::capture::CapturedMessage;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuntimeMessage {
    SendHttp {
        data: CapturedMessage,
    },
    SetApiUrl {
        #[serde(rename = "apiUrl")]
        api_url: String,
    },
    GetApiUrl,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeResponse {
    pub success: bool,
    #[serde(rename = "apiUrl", default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RuntimeResponse {
    pub fn ok() -> Self {
        Self { success: true, api_url: None, error: None }
    }

    pub fn with_url(url: String) -> Self {
        Self { success: true, api_url: Some(url), error: None }
    }

    pub fn failed(e: &RelayError) -> Self {
        Self { success: false, api_url: None, error: Some(e.to_string()) }
    }
}

type Envelope = (RuntimeMessage, Option<oneshot::Sender<RuntimeResponse>>);

#[derive(Clone)]
pub struct RuntimeHandle {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl RuntimeHandle {
    /// Fire and forget.
    pub fn post(&self, msg: RuntimeMessage) -> RelayResult<()> {
        self.tx.send((msg, None)).map_err(|_| RelayError::RuntimeClosed)
    }

    /// Send and wait for the service's answer.
    pub async fn request(&self, msg: RuntimeMessage) -> RelayResult<RuntimeResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx.send((msg, Some(reply_tx))).map_err(|_| RelayError::RuntimeClosed)?;
        reply_rx.await.map_err(|_| RelayError::RuntimeClosed)
    }
}

/// Start the background service. It runs until every handle is dropped.
pub fn spawn_background(relay: Relay) -> (RuntimeHandle, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<Envelope>();

    let task = tokio::spawn(async move {
        while let Some((msg, reply)) = rx.recv().await {
            match msg {
                RuntimeMessage::SendHttp { data } => {
                    // in-order issue; completion is whatever the network does
                    let _ = relay.forward(data).await;
                    respond(reply, RuntimeResponse::ok());
                }
                RuntimeMessage::SetApiUrl { api_url } => {
                    let response = match relay.store().set_endpoint(&api_url).await {
                        Ok(()) => RuntimeResponse::ok(),
                        Err(e) => {
                            error!(error = %e, "SET_API_URL failed");
                            RuntimeResponse::failed(&e)
                        }
                    };
                    respond(reply, response);
                }
                RuntimeMessage::GetApiUrl => {
                    let response = match relay.store().current().await {
                        Ok(url) => RuntimeResponse::with_url(url),
                        Err(e) => RuntimeResponse::failed(&e),
                    };
                    respond(reply, response);
                }
            }
        }
        info!("background runtime stopped");
    });

    (RuntimeHandle { tx }, task)
}

fn respond(reply: Option<oneshot::Sender<RuntimeResponse>>, response: RuntimeResponse) {
    if let Some(reply) = reply {
        if reply.send(response).is_err() {
            debug!("requester went away before the response");
        }
    }
}

/// Drain the bridge into the runtime, one SEND_HTTP per captured payload.
/// Ends when every emitter is dropped or the runtime is gone.
pub async fn pump_bridge(mut listener: BridgeListener, runtime: RuntimeHandle) -> u64 {
    let mut relayed = 0u64;
    while let Some(envelope) = listener.recv().await {
        if envelope.version != BRIDGE_VERSION {
            warn!(version = envelope.version, seq = envelope.seq, "unknown bridge version, skipping");
            continue;
        }
        match envelope.event {
            BridgeEvent::Captured(data) => {
                if let Err(e) = runtime.post(RuntimeMessage::SendHttp { data }) {
                    error!(error = %e, seq = envelope.seq, "runtime closed, stopping bridge pump");
                    break;
                }
                relayed += 1;
            }
        }
    }
    relayed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::API_URL_KEY;
    use crate::relay::{EndpointStore, MemoryStorage};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_message_wire_format() {
        let set: RuntimeMessage =
            serde_json::from_value(json!({"type": "SET_API_URL", "apiUrl": "http://x/data"})).unwrap();
        assert_eq!(set, RuntimeMessage::SetApiUrl { api_url: "http://x/data".into() });

        let send: RuntimeMessage =
            serde_json::from_value(json!({"type": "SEND_HTTP", "data": "F|CL;"})).unwrap();
        assert_eq!(send, RuntimeMessage::SendHttp { data: json!("F|CL;") });

        let get: RuntimeMessage = serde_json::from_value(json!({"type": "GET_API_URL"})).unwrap();
        assert_eq!(get, RuntimeMessage::GetApiUrl);

        assert!(serde_json::from_value::<RuntimeMessage>(json!({"type": "NOPE"})).is_err());
    }

    #[test]
    fn test_response_wire_format() {
        assert_eq!(serde_json::to_value(RuntimeResponse::ok()).unwrap(), json!({"success": true}));
        assert_eq!(
            serde_json::to_value(RuntimeResponse::with_url("http://x".into())).unwrap(),
            json!({"success": true, "apiUrl": "http://x"})
        );
        let failed = RuntimeResponse::failed(&RelayError::Uninitialized);
        assert!(!failed.success);
        assert!(failed.error.is_some());
    }

    #[tokio::test]
    async fn test_pump_posts_one_send_per_capture_in_order() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let runtime = RuntimeHandle { tx };
        let (emitter, listener) = crate::capture::bridge::channel();

        for i in 0..50 {
            emitter.emit(json!({"frame": i}));
        }
        emitter.emit(json!({"frame": 0}));
        drop(emitter);

        assert_eq!(pump_bridge(listener, runtime).await, 51);

        let mut sent = Vec::new();
        while let Ok((msg, reply)) = rx.try_recv() {
            assert!(reply.is_none());
            sent.push(msg);
        }
        let mut expected: Vec<_> = (0..50)
            .map(|i| RuntimeMessage::SendHttp { data: json!({"frame": i}) })
            .collect();
        expected.push(RuntimeMessage::SendHttp { data: json!({"frame": 0}) });
        assert_eq!(sent, expected);
    }

    #[tokio::test]
    async fn test_pump_stops_when_runtime_is_gone() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let (emitter, listener) = crate::capture::bridge::channel();
        emitter.emit(json!(1));
        emitter.emit(json!(2));

        assert_eq!(pump_bridge(listener, RuntimeHandle { tx }).await, 0);
    }

    async fn ready_relay(url: &str) -> Relay {
        let storage = Arc::new(MemoryStorage::with_value(API_URL_KEY, url));
        let store = Arc::new(EndpointStore::new(storage, url));
        store.initialize().await.unwrap();
        Relay::new(store, Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_back_to_back_endpoint_changes_keep_the_last() {
        let (runtime, _task) = spawn_background(ready_relay("http://127.0.0.1:1/a").await);

        for i in 0..20 {
            runtime.post(RuntimeMessage::SetApiUrl { api_url: format!("http://127.0.0.1:1/{i}") }).unwrap();
        }
        let current = runtime.request(RuntimeMessage::GetApiUrl).await.unwrap();
        assert_eq!(current.api_url.as_deref(), Some("http://127.0.0.1:1/19"));
    }

    #[tokio::test]
    async fn test_rejected_change_answers_failure() {
        let (runtime, _task) = spawn_background(ready_relay("http://127.0.0.1:1/a").await);

        let response = runtime.request(RuntimeMessage::SetApiUrl { api_url: "ftp://x".into() }).await.unwrap();
        assert!(!response.success);
        let current = runtime.request(RuntimeMessage::GetApiUrl).await.unwrap();
        assert_eq!(current.api_url.as_deref(), Some("http://127.0.0.1:1/a"));
    }
}
