use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use sha2::{Digest, Sha256};
use tracing_subscriber::EnvFilter;

use hsd_blobstore::BlobStore;
use hsd_catalog::Catalog;
use hsd_domain::config::{Config, ConfigSeverity};
use hsd_gateway::api;
use hsd_gateway::cli::{self, Cli, Command, ConfigCommand};
use hsd_gateway::engine::Deployer;
use hsd_gateway::proxy;
use hsd_gateway::runtime::audit::AuditPipeline;
use hsd_gateway::runtime::locks::StripeLocks;
use hsd_gateway::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    let config_path = args.config.as_deref();

    match args.command {
        // Default to serve when no subcommand is given.
        None | Some(Command::Serve) => {
            let config = cli::load_config(config_path)?;
            init_tracing(&config.log_level);
            run_server(Arc::new(config)).await
        }
        Some(Command::Config(ConfigCommand::Validate)) => {
            let config = cli::load_config(config_path)?;
            if !cli::validate(&config) {
                std::process::exit(1);
            }
            Ok(())
        }
        Some(Command::Config(ConfigCommand::Show)) => {
            let config = cli::load_config(config_path)?;
            cli::show(&config);
            Ok(())
        }
        Some(Command::Version) => {
            println!("htmlservd {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}

/// Structured JSON tracing; `RUST_LOG` wins over the configured level.
fn init_tracing(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(format!("{log_level},hsd_gateway=debug"))),
        )
        .json()
        .init();
}

/// Start the control plane with the given configuration.
async fn run_server(config: Arc<Config>) -> anyhow::Result<()> {
    tracing::info!("htmlservd starting");

    // ── Config validation ────────────────────────────────────────────
    let issues = config.validate();
    for issue in &issues {
        match issue.severity {
            ConfigSeverity::Warning => tracing::warn!("config: {issue}"),
            ConfigSeverity::Error => tracing::error!("config: {issue}"),
        }
    }
    if issues.iter().any(|i| i.severity == ConfigSeverity::Error) {
        anyhow::bail!(
            "config validation failed with {} error(s)",
            issues
                .iter()
                .filter(|i| i.severity == ConfigSeverity::Error)
                .count()
        );
    }

    // ── Data directory ───────────────────────────────────────────────
    tokio::fs::create_dir_all(&config.data_dir)
        .await
        .with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
    tracing::info!(path = %config.data_dir.display(), "data directory ready");

    // ── Catalog (SQLite) ─────────────────────────────────────────────
    let catalog = Catalog::open(&config.data_dir.join("db.sqlite"))
        .await
        .context("opening catalog")?;

    // ── Blob store ───────────────────────────────────────────────────
    let blobs = BlobStore::open(&config.data_dir)
        .await
        .context("opening blob store")?;

    // ── Audit pipeline ───────────────────────────────────────────────
    let audit = Arc::new(AuditPipeline::spawn(
        catalog.clone(),
        config.audit.queue_size,
    ));
    tracing::info!(queue_size = config.audit.queue_size, "audit pipeline ready");

    // ── Stripe locks ─────────────────────────────────────────────────
    let locks = Arc::new(StripeLocks::new());

    // ── Proxy reloader ───────────────────────────────────────────────
    let reloader = proxy::from_config(&config.proxy);
    tracing::info!(enabled = config.proxy.enabled, "proxy integration ready");

    // ── API token (hash once for constant-time comparison) ───────────
    let api_token_hash = if config.api_token.is_empty() {
        tracing::warn!("API bearer-token auth DISABLED — set api_token or HTMLSERVD_API_TOKEN");
        None
    } else {
        tracing::info!("API bearer-token auth enabled");
        Some(Sha256::digest(config.api_token.as_bytes()).to_vec())
    };

    // ── App state ────────────────────────────────────────────────────
    let deployer = Arc::new(Deployer {
        catalog: catalog.clone(),
        blobs,
        locks,
        audit: audit.clone(),
        reloader,
        data_dir: config.data_dir.clone(),
    });
    let state = AppState {
        config: config.clone(),
        deployer,
        api_token_hash,
    };

    // ── Concurrency limit (backpressure protection) ──────────────────
    let max_concurrent = std::env::var("HTMLSERVD_MAX_CONCURRENT_REQUESTS")
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(256);
    tracing::info!(max_concurrent, "concurrency limit set");

    // ── Router ───────────────────────────────────────────────────────
    let app = api::router(state.clone())
        .layer(tower::limit::ConcurrencyLimitLayer::new(max_concurrent))
        .with_state(state);

    // ── Bind ─────────────────────────────────────────────────────────
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    tracing::info!(addr = %addr, "htmlservd listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("axum server error")?;

    // ── Drain and close ──────────────────────────────────────────────
    tracing::info!("HTTP server stopped, draining audit pipeline");
    if !audit.close(Duration::from_secs(5)).await {
        tracing::warn!("audit pipeline did not drain within the shutdown budget");
    }
    catalog.close().await;
    tracing::info!("htmlservd stopped");
    Ok(())
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!(error = %e, "failed to install SIGTERM handler"),
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
