use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CACHE_CONTROL, PRAGMA};
use serde_json::Value;
use tracing::{debug, instrument};

use super::ViewerError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveQuery {
    pub sport: String,
    pub odds: String,
}

#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// One read of the live snapshot. Non-2xx is an error.
    async fn fetch(&self, query: &LiveQuery) -> Result<Value, ViewerError>;
}

pub struct HttpSnapshotSource {
    client: reqwest::Client,
    live_url: String,
}

impl HttpSnapshotSource {
    /// `timeout` bounds the whole request, connect to last body byte.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ViewerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            live_url: format!("{}/live", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl SnapshotSource for HttpSnapshotSource {
    #[instrument(skip(self), fields(url = %self.live_url))]
    async fn fetch(&self, query: &LiveQuery) -> Result<Value, ViewerError> {
        let res = self
            .client
            .get(&self.live_url)
            .query(&[("sport", query.sport.as_str()), ("odds", query.odds.as_str())])
            .header(CACHE_CONTROL, "no-cache, no-store")
            .header(PRAGMA, "no-cache")
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            return Err(ViewerError::Status(status.as_u16()));
        }
        let body = res.bytes().await?;
        debug!(bytes = body.len(), "snapshot received");
        serde_json::from_slice(&body).map_err(|e| ViewerError::Decode(e.to_string()))
    }
}
