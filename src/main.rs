use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};

use liverelay::capture::bridge;
use liverelay::capture::interceptor::{install_when_ready, MethodSlot};
use liverelay::capture::transport::FeedTransport;
use liverelay::config::{Settings, DEFAULT_API_URL};
use liverelay::relay::control::{self, ControlClient};
use liverelay::relay::endpoint::validate_endpoint;
use liverelay::relay::runtime::{pump_bridge, spawn_background, RuntimeMessage};
use liverelay::relay::{EndpointStore, JsonFileStorage, Relay};
use liverelay::{telemetry, viewer};

#[derive(Parser)]
#[command(name = "liverelay", version, about = "Capture a live odds feed, relay it, watch it move")]
struct Cli {
    /// Settings file (defaults to ./liverelay.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Hook the host feed and relay every frame to the configured endpoint
    Relay,
    /// Poll the collector and show live events in the terminal
    Viewer,
    /// Change the relay destination of a running relay
    SetEndpoint { url: String },
    /// Print the relay destination of a running relay
    GetEndpoint,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok(); // load .env

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    match cli.command {
        Command::Relay => run_relay(settings).await,
        Command::Viewer => run_viewer(settings).await,
        Command::SetEndpoint { url } => set_endpoint(settings, &url).await,
        Command::GetEndpoint => get_endpoint(settings).await,
    }
}

async fn run_relay(settings: Settings) -> anyhow::Result<()> {
    telemetry::init_tracing(&settings.log_filter);
    telemetry::init_metrics(settings.metrics_addr)?;
    let relay_settings = settings.relay;

    // endpoint store: uninitialized -> ready before anything can forward
    let storage = Arc::new(JsonFileStorage::new(&relay_settings.storage_path));
    let store = Arc::new(EndpointStore::new(storage, DEFAULT_API_URL));
    store
        .initialize()
        .await
        .with_context(|| format!("failed to load endpoint from {}", relay_settings.storage_path.display()))?;

    let relay = Relay::new(store, relay_settings.request_timeout())?;
    let (runtime, _background) = spawn_background(relay);

    let listener = control::bind(relay_settings.control_addr)
        .await
        .with_context(|| format!("failed to bind control channel on {}", relay_settings.control_addr))?;
    let control_task = tokio::spawn(control::serve(listener, runtime.clone()));

    let (emitter, bridge_listener) = bridge::channel();
    tokio::spawn(pump_bridge(bridge_listener, runtime));

    let slot = Arc::new(MethodSlot::new());
    let hook_slot = slot.clone();
    let hook_period = relay_settings.hook_interval();
    tokio::spawn(async move {
        install_when_ready(&hook_slot, &emitter, hook_period).await;
    });

    match relay_settings.feed_url {
        Some(url) => {
            let transport = FeedTransport::new(&url, relay_settings.subscribe, slot);
            tokio::spawn(async move { transport.run().await });
        }
        None => warn!("no relay.feed_url configured, interceptor will wait for a host"),
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("shutting down"),
        res = control_task => match res {
            Ok(Ok(())) => info!("control channel closed"),
            Ok(Err(e)) => error!(error = %e, "control channel failed"),
            Err(e) => error!(error = %e, "control task panicked"),
        },
    }
    Ok(())
}

async fn run_viewer(settings: Settings) -> anyhow::Result<()> {
    let log_dir = &settings.viewer.log_dir;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log dir {}", log_dir.display()))?;
    let _guard = telemetry::init_file_tracing(&settings.log_filter, log_dir);
    telemetry::init_metrics(settings.metrics_addr)?;

    viewer::tui::run(&settings.viewer).await
}

async fn set_endpoint(settings: Settings, url: &str) -> anyhow::Result<()> {
    telemetry::init_tracing("warn");
    let url = validate_endpoint(url).context("please enter a valid API URL")?;

    let client = ControlClient::new(settings.relay.control_addr);
    let response = client
        .send(&RuntimeMessage::SetApiUrl { api_url: url.clone() })
        .await
        .context("relay control channel unreachable")?;

    if !response.success {
        bail!("failed to update API URL: {}", response.error.unwrap_or_default());
    }
    println!("API URL updated to {url}");
    Ok(())
}

async fn get_endpoint(settings: Settings) -> anyhow::Result<()> {
    telemetry::init_tracing("warn");
    let client = ControlClient::new(settings.relay.control_addr);
    let response = client
        .send(&RuntimeMessage::GetApiUrl)
        .await
        .context("relay control channel unreachable")?;

    match response.api_url {
        Some(url) if response.success => println!("{url}"),
        _ => bail!("relay did not report an endpoint: {}", response.error.unwrap_or_default()),
    }
    Ok(())
}
