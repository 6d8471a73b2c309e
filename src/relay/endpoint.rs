//! Process-wide relay destination.
//!
//! `Uninitialized -> Ready(url)` happens once, in [`EndpointStore::initialize`].
//! After that [`EndpointStore::set_endpoint`] only ever moves `Ready -> Ready`,
//! persisting first and swapping the cache under the same write lock, so a
//! forward issued after `set_endpoint` returns never sees the old value.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::storage::DurableStorage;
use super::{RelayError, RelayResult};
use crate::config::API_URL_KEY;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Uninitialized,
    Ready(String),
}

pub struct EndpointStore {
    storage: Arc<dyn DurableStorage>,
    default_url: String,
    state: RwLock<EndpointState>,
}

impl EndpointStore {
    pub fn new(storage: Arc<dyn DurableStorage>, default_url: &str) -> Self {
        Self {
            storage,
            default_url: default_url.to_string(),
            state: RwLock::new(EndpointState::Uninitialized),
        }
    }

    /// Load from durable storage, writing the default there when absent.
    /// Calling it again on a ready store is a no-op.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> RelayResult<String> {
        let mut state = self.state.write().await;
        if let EndpointState::Ready(url) = &*state {
            return Ok(url.clone());
        }

        let url = match self.storage.get(API_URL_KEY).await? {
            Some(url) if !url.trim().is_empty() => url,
            _ => {
                self.storage.set(API_URL_KEY, &self.default_url).await?;
                info!(endpoint = %self.default_url, "default endpoint stored");
                self.default_url.clone()
            }
        };
        info!(endpoint = %url, "endpoint store ready");
        *state = EndpointState::Ready(url.clone());
        Ok(url)
    }

    pub async fn state(&self) -> EndpointState {
        self.state.read().await.clone()
    }

    pub async fn current(&self) -> RelayResult<String> {
        match &*self.state.read().await {
            EndpointState::Ready(url) => Ok(url.clone()),
            EndpointState::Uninitialized => Err(RelayError::Uninitialized),
        }
    }

    /// Validate, persist, then cache. On any error the cached value is unchanged.
    #[instrument(skip(self))]
    pub async fn set_endpoint(&self, url: &str) -> RelayResult<()> {
        let url = validate_endpoint(url)?;
        let mut state = self.state.write().await;
        if *state == EndpointState::Uninitialized {
            return Err(RelayError::Uninitialized);
        }
        if let Err(e) = self.storage.set(API_URL_KEY, &url).await {
            warn!(error = %e, "failed to persist endpoint");
            return Err(e);
        }
        info!(endpoint = %url, "endpoint updated");
        *state = EndpointState::Ready(url);
        Ok(())
    }
}

pub fn validate_endpoint(raw: &str) -> RelayResult<String> {
    let url = raw.trim();
    let invalid = |reason: &str| RelayError::InvalidEndpoint {
        url: raw.to_string(),
        reason: reason.to_string(),
    };
    if url.is_empty() {
        return Err(invalid("empty"));
    }
    let parsed = reqwest::Url::parse(url).map_err(|e| invalid(&e.to_string()))?;
    match parsed.scheme() {
        "http" | "https" => Ok(url.to_string()),
        other => Err(invalid(&format!("unsupported scheme {other}"))),
    }
}
