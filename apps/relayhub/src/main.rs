use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};

use relayhub_common::ConfigDocument;
use relayhub_core::{
    EndpointRouter, EngineConfig, EventHub, ProxyEngine, WreqUpstreamClient,
    client::DEFAULT_REQUEST_TIMEOUT,
};
use relayhub_storage::{DbStatsSink, StatsStorage};

mod cli;
mod data_dir;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = cli::Cli::parse();
    let data_dir = data_dir::resolve(&cli.data_dir);
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let config_path = data_dir.join("config.json");
    let config = match std::fs::read(&config_path) {
        Ok(raw) => ConfigDocument::from_json(&raw)
            .with_context(|| format!("parsing {}", config_path.display()))?,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            warn!(event = "config_missing", path = %config_path.display());
            ConfigDocument::default()
        }
        Err(err) => {
            return Err(err).with_context(|| format!("reading {}", config_path.display()));
        }
    };

    let mut port = config.app_config.port;
    if let Ok(value) = std::env::var("PORT")
        && let Ok(parsed) = value.trim().parse::<u16>()
        && parsed > 0
    {
        port = parsed;
    }
    if cli.port > 0 {
        port = cli.port;
    }

    let dsn = format!("sqlite://{}?mode=rwc", data_dir.join("data.sqlite").display());
    let storage = Arc::new(
        StatsStorage::connect(&dsn)
            .await
            .with_context(|| format!("connecting {dsn}"))?,
    );
    storage.sync().await.context("syncing stats schema")?;

    let router = Arc::new(EndpointRouter::new());
    router.load_endpoints(config.endpoints());

    let client = Arc::new(WreqUpstreamClient::new(DEFAULT_REQUEST_TIMEOUT)?);
    let engine = Arc::new(ProxyEngine::new(
        router,
        client,
        Arc::new(DbStatsSink::new(storage)),
        EventHub::new(),
        EngineConfig {
            temp_disable_ttl: Duration::from_secs(config.app_config.temp_disable_minutes * 60),
            fallback: config.app_config.fallback,
            retry429: config.app_config.retry429,
            ..EngineConfig::default()
        },
    ));

    let state = relayhub_server::ServerState::new(
        engine,
        config.app_config.auth_secret().map(str::to_string),
        port,
    );
    let app = relayhub_server::build_router(state);

    let bind = format!("{}:{}", cli.host, port);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(event = "listening", bind = %bind, data_dir = %data_dir.display());
    axum::serve(listener, app).await?;
    Ok(())
}
