// Relay side: durable endpoint config, outbound forwarding, the background
// runtime that serves runtime messages, and its loopback control surface.
pub mod control;    // axum surface + client for runtime messages
pub mod endpoint;   // uninitialized -> ready endpoint cache
pub mod forwarder;  // fire-and-forget POST of captured payloads
pub mod runtime;    // message types, background service, bridge pump
pub mod storage;    // durable key/value storage backing the endpoint

pub use endpoint::{EndpointState, EndpointStore};
pub use forwarder::Relay;
pub use runtime::{RuntimeHandle, RuntimeMessage, RuntimeResponse};
pub use storage::{DurableStorage, JsonFileStorage, MemoryStorage};

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("endpoint store is not initialized")]
    Uninitialized,
    #[error("invalid endpoint url {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
    #[error("storage I/O failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage format mismatch: {0}")]
    Format(#[from] serde_json::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("background runtime is gone")]
    RuntimeClosed,
}

pub type RelayResult<T> = Result<T, RelayError>;
