// End-to-end: host callback -> interceptor -> bridge -> runtime -> collector,
// plus the control channel and the viewer's HTTP source, against local axum
// servers.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{extract::Query, extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};

use liverelay::capture::bridge;
use liverelay::capture::interceptor::{wrap, HostError, MethodSlot};
use liverelay::config::API_URL_KEY;
use liverelay::relay::control::{self, ControlClient};
use liverelay::relay::runtime::{pump_bridge, spawn_background, RuntimeHandle, RuntimeMessage};
use liverelay::relay::{EndpointStore, MemoryStorage, Relay};
use liverelay::viewer::{HttpSnapshotSource, LiveQuery, SnapshotSource, ViewerError};

type Inbox = Arc<Mutex<Vec<Value>>>;

async fn collector() -> (String, Inbox) {
    async fn collect(State(inbox): State<Inbox>, Json(body): Json<Value>) -> &'static str {
        inbox.lock().push(body);
        "1"
    }

    let inbox: Inbox = Arc::new(Mutex::new(Vec::new()));
    let app = Router::new().route("/data", post(collect)).with_state(inbox.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    (format!("http://{addr}/data"), inbox)
}

async fn runtime_for(url: &str) -> (RuntimeHandle, Arc<EndpointStore>) {
    let storage = Arc::new(MemoryStorage::with_value(API_URL_KEY, url));
    let store = Arc::new(EndpointStore::new(storage, "http://127.0.0.1:9/unused"));
    store.initialize().await.unwrap();
    let relay = Relay::new(store.clone(), Duration::from_secs(5)).unwrap();
    let (handle, _task) = spawn_background(relay);
    (handle, store)
}

async fn wait_for(inbox: &Inbox, n: usize) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while inbox.lock().len() < n {
        assert!(tokio::time::Instant::now() < deadline, "collector got {} of {n}", inbox.lock().len());
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn host(args: &[Value]) -> Result<Value, HostError> {
    match args.first() {
        Some(Value::String(s)) if s == "bad" => Err(HostError::Rejected(s.clone())),
        _ => Ok(json!("handled")),
    }
}

#[tokio::test]
async fn test_every_host_call_reaches_collector_once() {
    let (url, inbox) = collector().await;
    let (runtime, _store) = runtime_for(&url).await;

    let (emitter, listener) = bridge::channel();
    tokio::spawn(pump_bridge(listener, runtime));

    let slot = MethodSlot::new();
    slot.install(Arc::new(host));
    assert!(wrap(&slot, &emitter));

    const N: usize = 25;
    for i in 0..N {
        let out = slot.dispatch(&[json!(format!("frame-{i}"))]).unwrap();
        assert_eq!(out, Ok(json!("handled")));
    }
    // errors still reach the host caller, and the frame is still captured
    assert_eq!(slot.dispatch(&[json!("bad")]).unwrap(), Err(HostError::Rejected("bad".into())));

    wait_for(&inbox, N + 1).await;
    tokio::time::sleep(Duration::from_millis(100)).await;

    let mut received: Vec<String> = inbox
        .lock()
        .iter()
        .map(|body| body["data"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(received.len(), N + 1);
    received.sort();
    let mut expected: Vec<String> = (0..N).map(|i| format!("frame-{i}")).collect();
    expected.push("bad".into());
    expected.sort();
    assert_eq!(received, expected);
}

#[tokio::test]
async fn test_set_endpoint_applies_to_next_forward() {
    let (url_a, inbox_a) = collector().await;
    let (url_b, inbox_b) = collector().await;
    let (runtime, store) = runtime_for(&url_a).await;

    let response = runtime.request(RuntimeMessage::SetApiUrl { api_url: url_b.clone() }).await.unwrap();
    assert!(response.success);
    assert_eq!(store.current().await.unwrap(), url_b);

    runtime.post(RuntimeMessage::SendHttp { data: json!({"k": 1}) }).unwrap();
    wait_for(&inbox_b, 1).await;
    assert_eq!(inbox_b.lock()[0], json!({"data": {"k": 1}}));
    assert!(inbox_a.lock().is_empty());
}

#[tokio::test]
async fn test_forward_to_dead_endpoint_is_silent() {
    let dead = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap()
    };
    let storage = Arc::new(MemoryStorage::with_value(API_URL_KEY, &format!("http://{dead}/data")));
    let store = Arc::new(EndpointStore::new(storage, "http://127.0.0.1:9/unused"));
    store.initialize().await.unwrap();
    let relay = Relay::new(store, Duration::from_secs(2)).unwrap();

    // the attempt completes without panicking and nothing is retried
    relay.forward(json!("lost")).await.await.unwrap();
}

async fn control_server(runtime: RuntimeHandle) -> SocketAddr {
    let listener = control::bind("127.0.0.1:0".parse().unwrap()).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(control::serve(listener, runtime));
    addr
}

#[tokio::test]
async fn test_control_channel_over_http() {
    let (url_a, _inbox_a) = collector().await;
    let (url_b, inbox_b) = collector().await;
    let (runtime, _store) = runtime_for(&url_a).await;
    let client = ControlClient::new(control_server(runtime).await);

    let current = client.send(&RuntimeMessage::GetApiUrl).await.unwrap();
    assert_eq!(current.api_url.as_deref(), Some(url_a.as_str()));

    let bad = client.send(&RuntimeMessage::SetApiUrl { api_url: "   ".into() }).await.unwrap();
    assert!(!bad.success);
    let still = client.send(&RuntimeMessage::GetApiUrl).await.unwrap();
    assert_eq!(still.api_url.as_deref(), Some(url_a.as_str()));

    let ok = client.send(&RuntimeMessage::SetApiUrl { api_url: url_b.clone() }).await.unwrap();
    assert!(ok.success);

    let sent = client.send(&RuntimeMessage::SendHttp { data: json!("via-control") }).await.unwrap();
    assert!(sent.success);
    wait_for(&inbox_b, 1).await;
    assert_eq!(inbox_b.lock()[0], json!({"data": "via-control"}));
}

#[tokio::test]
async fn test_http_snapshot_source() {
    async fn live(Query(q): Query<Vec<(String, String)>>) -> Json<Value> {
        Json(json!([{"id": 1, "query": q}]))
    }
    async fn broken() -> (StatusCode, &'static str) {
        (StatusCode::INTERNAL_SERVER_ERROR, "nope")
    }

    let ok_app = Router::new().route("/live", get(live));
    let bad_app = Router::new().route("/live", get(broken));
    let ok_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let bad_listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ok_addr = ok_listener.local_addr().unwrap();
    let bad_addr = bad_listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(ok_listener, ok_app).await.unwrap() });
    tokio::spawn(async move { axum::serve(bad_listener, bad_app).await.unwrap() });

    let query = LiveQuery { sport: "soccer".into(), odds: "0".into() };

    let timeout = Duration::from_secs(5);
    let body = HttpSnapshotSource::new(&format!("http://{ok_addr}/"), timeout)
        .unwrap()
        .fetch(&query)
        .await
        .unwrap();
    assert_eq!(body[0]["query"], json!([["sport", "soccer"], ["odds", "0"]]));

    let err = HttpSnapshotSource::new(&format!("http://{bad_addr}"), timeout)
        .unwrap()
        .fetch(&query)
        .await
        .unwrap_err();
    assert!(matches!(err, ViewerError::Status(500)));
}

#[tokio::test]
async fn test_silent_collector_times_out() {
    // accepts connections, reads nothing, never answers
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });

    let source = HttpSnapshotSource::new(&format!("http://{addr}"), Duration::from_millis(300)).unwrap();
    let query = LiveQuery { sport: "soccer".into(), odds: "1".into() };

    let started = std::time::Instant::now();
    let err = tokio::time::timeout(Duration::from_secs(5), source.fetch(&query))
        .await
        .expect("fetch must give up on its own")
        .unwrap_err();
    assert!(matches!(&err, ViewerError::Request(e) if e.is_timeout()), "{err}");
    assert!(started.elapsed() < Duration::from_secs(5));
}
