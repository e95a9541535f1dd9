//! rtmetrics exporter binary.
//!
//! Usage: `rtmetrics-exporter [config.yaml]` (default `rtmetrics.yaml`).

use std::net::SocketAddr;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use rtmetrics_core::error::{Result, RtMetricsError};
use rtmetrics_exporter::{app_state::AppState, config, router};

#[tokio::main]
async fn main() -> ExitCode {
    let path = std::env::args().nth(1).unwrap_or_else(|| "rtmetrics.yaml".to_string());

    let cfg = match config::load_from_file(&path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("config load failed ({path}): {e}");
            return ExitCode::from(2);
        }
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.log.filter));
    fmt().with_env_filter(filter).init();

    match run(cfg).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(code = e.code().as_str(), error = %e, "exporter failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cfg: config::ExporterConfig) -> Result<()> {
    let listen: SocketAddr = cfg
        .exporter
        .listen
        .parse()
        .map_err(|e| RtMetricsError::Config(format!("exporter.listen: {e}")))?;
    let path = cfg.exporter.path.clone();

    let state = AppState::new(cfg)?;
    let app = router::build_router(state.clone());

    let listener = tokio::net::TcpListener::bind(listen)
        .await
        .map_err(|e| RtMetricsError::Internal(format!("bind {listen} failed: {e}")))?;
    let collectors = state.registry().len()?;
    tracing::info!(%listen, %path, collectors, "rtmetrics exporter starting");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| RtMetricsError::Internal(format!("server failed: {e}")));

    state.shutdown();
    tracing::info!("rtmetrics exporter stopped");
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "ctrl-c handler unavailable");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
