// Capture side: the host callback slot, the interceptor that wraps it, and
// the bridge that carries captured payloads out to the relay.
pub mod bridge;        // versioned single-consumer channel (emitter/listener)
pub mod interceptor;   // pass-through wrapping of the host data callback
pub mod transport;     // host feed: websocket reader that dispatches through the slot

/// Whatever the host passed to its data callback. Never inspected here.
pub type CapturedMessage = serde_json::Value;

pub use bridge::{BridgeEmitter, BridgeEnvelope, BridgeEvent, BridgeListener, BRIDGE_VERSION};
pub use interceptor::{install_when_ready, wrap, DataCallback, HostError, HostProbe, MethodSlot};
