// crates/server/src/main.rs
//! Takeoff server binary.
//!
//! Parses config, prepares the data directory, starts the eviction sweep,
//! and serves the API.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use takeoff_core::IfcAnalyzerFactory;
use takeoff_server::jobs::run_eviction_sweep;
use takeoff_server::{create_app, AppState, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = ServerConfig::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;

    let state = AppState::new(
        Arc::new(IfcAnalyzerFactory),
        data_dir.clone(),
        config.allowed_extensions.clone(),
    );

    let sweep_cancel = CancellationToken::new();
    tokio::spawn(run_eviction_sweep(
        Arc::clone(state.registry()),
        config.job_ttl(),
        config.eviction_interval(),
        sweep_cancel.clone(),
    ));

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(
        %addr,
        data_dir = %data_dir.display(),
        job_ttl_secs = config.job_ttl_secs,
        "Takeoff server listening"
    );

    axum::serve(listener, create_app(state)).await?;
    sweep_cancel.cancel();
    Ok(())
}
