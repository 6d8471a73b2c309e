// Loopback control surface for the background runtime, plus the client the
// CLI uses to reach it.

use std::net::SocketAddr;

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::runtime::{RuntimeHandle, RuntimeMessage, RuntimeResponse};
use super::RelayError;

pub const MESSAGE_PATH: &str = "/runtime/message";

pub fn router(runtime: RuntimeHandle) -> Router {
    Router::new()
        .route(MESSAGE_PATH, post(handle_message))
        .layer(TraceLayer::new_for_http())
        .with_state(runtime)
}

async fn handle_message(
    State(runtime): State<RuntimeHandle>,
    Json(msg): Json<RuntimeMessage>,
) -> (StatusCode, Json<RuntimeResponse>) {
    match runtime.request(msg).await {
        Ok(response) => (StatusCode::OK, Json(response)),
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, Json(RuntimeResponse::failed(&e))),
    }
}

pub async fn bind(addr: SocketAddr) -> std::io::Result<TcpListener> {
    TcpListener::bind(addr).await
}

pub async fn serve(listener: TcpListener, runtime: RuntimeHandle) -> std::io::Result<()> {
    info!(addr = %listener.local_addr()?, "control channel listening");
    axum::serve(listener, router(runtime)).await
}

pub struct ControlClient {
    url: String,
    client: reqwest::Client,
}

impl ControlClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { url: format!("http://{addr}{MESSAGE_PATH}"), client: reqwest::Client::new() }
    }

    pub async fn send(&self, msg: &RuntimeMessage) -> Result<RuntimeResponse, RelayError> {
        let response = self.client.post(&self.url).json(msg).send().await?;
        Ok(response.json::<RuntimeResponse>().await?)
    }
}
