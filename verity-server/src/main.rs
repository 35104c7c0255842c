use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};
use verity_common::observability::init_logging;
use verity_config::{VerityConfig, VerityConfigLoader};
use verity_server::{APP_NAME, AppState, build_pipeline, router};

/// News extraction and verification service.
#[derive(Debug, Parser)]
#[command(name = "verity", version)]
struct Args {
    /// YAML configuration file; may be absent when everything comes from
    /// `VERITY__*` environment variables.
    #[arg(long, env = "VERITY_CONFIG", default_value = "verity.yaml")]
    config: PathBuf,

    /// Listen address, overriding `server.bind`.
    #[arg(long, env = "VERITY_BIND")]
    bind: Option<String>,
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
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

    info!("shutdown signal received, draining connections");
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1) Config: optional file, env wins
    let cfg: VerityConfig = VerityConfigLoader::new()
        .with_optional_file(&args.config)
        .load()
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    // 2) Logging from the config's logging section
    let log_path = init_logging(cfg.logging.to_log_config(APP_NAME))?;

    let pipeline = build_pipeline(&cfg).context("building pipeline")?;
    info!(
        provider = pipeline.provider_name(),
        model = pipeline.model_name(),
        classifier = %cfg.classifier.endpoint,
        min_tokens = pipeline.gate().min_tokens,
        min_overlap = pipeline.gate().min_overlap,
        log_file = %log_path.display(),
        "pipeline ready"
    );

    let bind = args.bind.unwrap_or_else(|| cfg.server.bind.clone());
    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    info!(%bind, "listening");

    axum::serve(listener, router(AppState::new(pipeline)))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("shutdown complete");
    Ok(())
}
