//! Pass-through wrapping of the host's data callback.
//!
//! The host owns a [`MethodSlot`] and routes every frame through whatever
//! callback the slot currently holds. [`wrap`] swaps that callback for an
//! [`Intercepted`] one that reports the first argument to the bridge and then
//! defers to the original, so the host sees the same results and errors.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, info, instrument};

use super::bridge::BridgeEmitter;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HostError {
    #[error("host callback failed: {0}")]
    Callback(String),
    #[error("frame rejected: {0}")]
    Rejected(String),
}

/// Host-side data callback (`socket_data_callback` on the host transport).
pub trait DataCallback: Send + Sync {
    fn call(&self, args: &[Value]) -> Result<Value, HostError>;
}

impl<F> DataCallback for F
where
    F: Fn(&[Value]) -> Result<Value, HostError> + Send + Sync,
{
    fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        self(args)
    }
}

/// Shared, late-bound home of the host callback.
#[derive(Default)]
pub struct MethodSlot {
    target: RwLock<Option<Arc<dyn DataCallback>>>,
}

impl MethodSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called by the host once it is ready to receive frames.
    pub fn install(&self, callback: Arc<dyn DataCallback>) {
        *self.target.write() = Some(callback);
    }

    pub fn current(&self) -> Option<Arc<dyn DataCallback>> {
        self.target.read().clone()
    }

    pub fn is_installed(&self) -> bool {
        self.target.read().is_some()
    }

    /// Route one call through the slot. `None` while nothing is installed.
    pub fn dispatch(&self, args: &[Value]) -> Option<Result<Value, HostError>> {
        // clone out so the lock is not held across the callback
        let callback = self.current()?;
        Some(callback.call(args))
    }
}

pub struct Intercepted {
    original: Arc<dyn DataCallback>,
    emitter: BridgeEmitter,
}

impl Intercepted {
    pub fn new(original: Arc<dyn DataCallback>, emitter: BridgeEmitter) -> Self {
        Self { original, emitter }
    }
}

impl DataCallback for Intercepted {
    fn call(&self, args: &[Value]) -> Result<Value, HostError> {
        self.emitter.emit(args.first().cloned().unwrap_or(Value::Null));
        self.original.call(args)
    }
}

/// Replace the slot's callback with an intercepting wrapper.
/// Returns `false` (and changes nothing) when the slot is still empty.
pub fn wrap(slot: &MethodSlot, emitter: &BridgeEmitter) -> bool {
    let mut target = slot.target.write();
    match target.take() {
        Some(original) => {
            *target = Some(Arc::new(Intercepted::new(original, emitter.clone())));
            true
        }
        None => false,
    }
}

/// Readiness predicate for [`install_when_ready`].
pub trait HostProbe: Send + Sync {
    /// The slot to wrap, once the host has put a callback into it.
    fn locate(&self) -> Option<&MethodSlot>;
}

impl HostProbe for MethodSlot {
    fn locate(&self) -> Option<&MethodSlot> {
        self.is_installed().then_some(self)
    }
}

impl<P: HostProbe + ?Sized> HostProbe for Arc<P> {
    fn locate(&self) -> Option<&MethodSlot> {
        (**self).locate()
    }
}

/// Probe every `period` until the host is present, then wrap it once.
/// There is no retry limit; the interceptor is inert while the host is absent.
/// Returns the number of probes it took.
#[instrument(skip(probe, emitter), fields(period_ms = period.as_millis() as u64))]
pub async fn install_when_ready<P: HostProbe>(
    probe: &P,
    emitter: &BridgeEmitter,
    period: Duration,
) -> u64 {
    let mut attempts = 0u64;
    loop {
        tokio::time::sleep(period).await;
        attempts += 1;
        if let Some(slot) = probe.locate() {
            if wrap(slot, emitter) {
                info!(attempts, "host data callback hooked");
                return attempts;
            }
        }
        debug!(attempts, "host not ready yet");
    }
}
