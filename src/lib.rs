//! Capture, relay and render for a live odds feed.
//!
//! * [`capture`] hooks the host feed's data callback and bridges every frame out.
//! * [`relay`] forwards captured frames to the collector and owns the endpoint.
//! * [`viewer`] polls the collector and renders a change-highlighted snapshot.

pub mod capture;
pub mod config;
pub mod relay;
pub mod telemetry;
pub mod viewer;
