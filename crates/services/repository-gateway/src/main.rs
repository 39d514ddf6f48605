//! Repository gateway binary
//!
//! # Usage
//!
//! ```bash
//! # Defaults: listen on 0.0.0.0:8443/repository, Kurento at ws://localhost:8888/kurento
//! repository-gateway
//!
//! # With a config file and a repository server
//! repository-gateway --config gateway.toml --repository-url http://localhost:7676
//!
//! # JSON logs
//! RUST_LOG=debug repository-gateway --log-format json
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use remotemedia_repository_gateway::{
    catalog::{HttpRepositoryCatalog, OfflineCatalog, StorageCatalog},
    Config, KurentoEngine, SessionRegistry, SignalingRouter, WebSocketServer,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Record/playback signaling gateway
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; environment variables are used when absent
    #[arg(short, long, env = "GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    host: Option<String>,

    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Kurento Media Server WebSocket URL
    #[arg(long)]
    kms_url: Option<String>,

    /// Repository server base URL
    #[arg(long)]
    repository_url: Option<String>,

    /// Log output format
    #[arg(long, default_value = "text", env = "GATEWAY_LOG_FORMAT")]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl Args {
    fn apply(&self, config: &mut Config) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(url) = &self.kms_url {
            config.engine.url = url.clone();
        }
        if let Some(url) = &self.repository_url {
            config.repository.url = Some(url.clone());
        }
    }
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting repository gateway v{}", remotemedia_repository_gateway::version());

    let mut config = Config::load(args.config.as_ref()).context("Failed to load configuration")?;
    args.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    info!(
        "Configuration: listen={}{}, kms={}, repository={}, max_sessions={}",
        config.server.bind_addr(),
        config.server.path,
        config.engine.url,
        config.repository.url.as_deref().unwrap_or("<offline>"),
        config.limits.max_sessions
    );

    let engine = Arc::new(KurentoEngine::from_config(&config.engine));
    let catalog: Arc<dyn StorageCatalog> = match HttpRepositoryCatalog::from_config(&config.repository)? {
        Some(catalog) => Arc::new(catalog),
        None => {
            info!(
                "No repository configured, recording to {}",
                config.repository.fallback_dir
            );
            Arc::new(OfflineCatalog)
        }
    };

    let registry = Arc::new(SessionRegistry::new(config.limits.max_sessions));
    let router = Arc::new(SignalingRouter::new(
        registry,
        engine,
        catalog,
        config.session_options(),
    ));

    let server = WebSocketServer::new(config.server.clone(), Arc::clone(&router))
        .start()
        .await
        .context("Failed to start WebSocket server")?;

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    server.shutdown().await;
    router.shutdown().await;

    info!("Repository gateway shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
