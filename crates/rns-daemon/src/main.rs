//! rns-daemon entry point.
//!
//! Loads config and secrets, builds the engine and its IO
//! adapters, hydrates from the persistence backend and starts the HTTP server.
//! Handlers live in `routes.rs`; the engine actor lives in `runtime.rs`.

use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use clap::Parser;
use rns_config::{
    load_layered_yaml, load_layered_yaml_from_strings, report_unused_keys, resolve_secrets,
    ConfigConsumer, TransportKind, UnusedKeyPolicy,
};
use rns_daemon::{routes, runtime, state};
use rns_gateway::{HttpPersistenceGateway, PersistenceGateway};
use rns_transport::{mqtt, BridgeCredentials, HttpBridgeTransport, MqttInbound, MqttSettings, Transport};
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};
use tracing::{info, warn, Level};

const MQTT_INBOUND_CAPACITY: usize = 256;

#[derive(Parser)]
#[command(name = "rns-daemon")]
#[command(about = "RackNova slot reconciliation daemon", long_about = None)]
struct Args {
    /// Layered config paths in merge order. Defaults apply when none are given.
    #[arg(long = "config")]
    config_paths: Vec<PathBuf>,

    /// Fail start-up on config keys the daemon does not read.
    #[arg(long, default_value_t = false)]
    strict_config: bool,

    /// Start with an empty inventory instead of loading the backend.
    #[arg(long, default_value_t = false)]
    skip_hydration: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();
    let args = Args::parse();

    let loaded = if args.config_paths.is_empty() {
        load_layered_yaml_from_strings(&[])?
    } else {
        load_layered_yaml(args.config_paths.as_slice())?
    };
    let policy = if args.strict_config {
        UnusedKeyPolicy::Fail
    } else {
        UnusedKeyPolicy::Warn
    };
    let unused = report_unused_keys(ConfigConsumer::Daemon, &loaded.config_json, policy)?;
    for leaf in &unused.unused_leaf_pointers {
        warn!(key = %leaf, "config key not used by the daemon");
    }
    let station = loaded.station()?;
    info!(config_hash = %loaded.config_hash, "config loaded");

    let secrets = resolve_secrets(&station)?;
    let engine = station.build_engine()?;
    let subscriptions = engine.topology().subscriptions();

    let credentials = secrets
        .bridge_credentials()
        .map(|(username, password)| BridgeCredentials {
            username: username.to_string(),
            password: password.to_string(),
        });
    let (transport, mqtt_inbound): (Arc<dyn Transport>, Option<MqttInbound>) =
        match station.transport.kind {
            TransportKind::Bridge => {
                for topic in &subscriptions {
                    info!(topic = %topic, "bridge must forward topic to /v1/hardware/events");
                }
                let bridge = HttpBridgeTransport::new(
                    station.transport.publish_url.clone(),
                    station.transport.qos,
                    Duration::from_millis(station.transport.timeout_ms),
                    credentials,
                )
                .context("transport bridge client")?;
                (Arc::new(bridge), None)
            }
            TransportKind::Mqtt => {
                let cfg = &station.transport.mqtt;
                let settings = MqttSettings {
                    host: cfg.host.clone(),
                    port: cfg.port,
                    client_id: cfg.client_id.clone(),
                    keep_alive: Duration::from_secs(cfg.keep_alive_secs),
                    qos: station.transport.qos,
                    credentials,
                };
                info!(host = %cfg.host, port = cfg.port, topics = subscriptions.len(), "mqtt transport");
                let (client, inbound) =
                    mqtt::connect(&settings, subscriptions).context("mqtt client")?;
                (Arc::new(client), Some(inbound))
            }
        };
    let gateway: Arc<dyn PersistenceGateway> = Arc::new(
        HttpPersistenceGateway::from_parts(
            station.gateway.base_url.clone(),
            station.gateway.products_path.clone(),
            station.gateway.movements_path.clone(),
            Duration::from_millis(station.gateway.timeout_ms),
        )
        .context("persistence gateway client")?,
    );

    let shared = runtime::start(
        engine,
        transport,
        Arc::clone(&gateway),
        runtime::RuntimeSettings::from_station(&station),
    );

    // A failed hydration aborts start-up.
    if args.skip_hydration {
        warn!("hydration skipped; inventory starts empty");
        shared
            .mark_ready(None, Some("hydration skipped".to_string()))
            .await;
    } else {
        runtime::hydrate_from_gateway(&shared, gateway.as_ref()).await?;
    }

    // Subscribe only once the inventory is bound.
    if let Some(inbound) = mqtt_inbound {
        let (tx, rx) = tokio::sync::mpsc::channel(MQTT_INBOUND_CAPACITY);
        runtime::spawn_inbound_forwarder(shared.engine.clone(), rx);
        tokio::spawn(inbound.run(tx));
    }

    state::spawn_heartbeat(shared.bus.clone(), Duration::from_secs(1));

    let app = routes::build_router(Arc::clone(&shared))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(cors_localhost_only());

    let addr = bind_addr_from_env().unwrap_or_else(|| SocketAddr::from(([127, 0, 0, 1], 8899)));
    info!("rns-daemon listening on http://{}", addr);

    axum::serve(tokio::net::TcpListener::bind(addr).await?, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server crashed")?;

    Ok(())
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn bind_addr_from_env() -> Option<SocketAddr> {
    std::env::var("RNS_DAEMON_ADDR").ok()?.parse().ok()
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("ctrl-c handler unavailable; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}

/// CORS: allow only localhost origins.
fn cors_localhost_only() -> CorsLayer {
    let allowed_origins = [
        "http://localhost",
        "http://127.0.0.1",
        "http://localhost:3000",
        "http://127.0.0.1:3000",
        "http://localhost:5173",
        "http://127.0.0.1:5173",
    ];

    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(tower_http::cors::Any)
}
