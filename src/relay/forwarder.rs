use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use super::endpoint::EndpointStore;
use super::RelayResult;
use crate::capture::CapturedMessage;

/// Outbound body: `{"data": <payload>}`.
#[derive(Serialize)]
struct Outbound {
    data: CapturedMessage,
}

/// Posts captured payloads to the current endpoint. One attempt per payload,
/// failures are logged and dropped.
#[derive(Clone)]
pub struct Relay {
    client: reqwest::Client,
    store: Arc<EndpointStore>,
}

impl Relay {
    pub fn new(store: Arc<EndpointStore>, timeout: Duration) -> RelayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, store })
    }

    pub fn store(&self) -> &Arc<EndpointStore> {
        &self.store
    }

    /// Resolve the endpoint now and send on a detached task. The handle is
    /// only useful to callers that want to wait for the attempt to finish.
    pub async fn forward(&self, data: CapturedMessage) -> JoinHandle<()> {
        metrics::counter!("relay_forward_total").increment(1);
        let endpoint = self.store.current().await;
        let client = self.client.clone();

        tokio::spawn(async move {
            let endpoint = match endpoint {
                Ok(url) => url,
                Err(e) => {
                    error!(error = %e, "dropping capture, no endpoint");
                    metrics::counter!("relay_forward_failed_total").increment(1);
                    return;
                }
            };

            let result = async {
                let res = client.post(&endpoint).json(&Outbound { data }).send().await?;
                let status = res.status();
                let body = res.text().await?;
                Ok::<_, reqwest::Error>((status, body))
            }
            .await;

            match result {
                Ok((status, body)) if status.is_success() => {
                    debug!(%endpoint, %status, response = %body, "relayed capture");
                }
                Ok((status, body)) => {
                    warn!(%endpoint, %status, response = %body, "collector refused capture");
                    metrics::counter!("relay_forward_failed_total").increment(1);
                }
                Err(e) => {
                    warn!(%endpoint, error = %e, "relay request failed");
                    metrics::counter!("relay_forward_failed_total").increment(1);
                }
            }
        })
    }
}
