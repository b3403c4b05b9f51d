//! camstream HTTP 服务
//!
//!   CAMSTREAM_CONFIG=camstream.json CAMSTREAM_ADDR=0.0.0.0:5000 camstream-server
//!
//! 浏览器打开 `http://<addr>/video/camera1` 即可看到画面。

mod config;
mod routes;

use std::sync::Arc;

use anyhow::{Context, Result};
use camstream::registry::CameraRegistry;
use camstream::videoio::backend::create_driver;
use tracing_subscriber::EnvFilter;

use crate::config::ServerConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cfg = ServerConfig::load().context("Failed to load configuration")?;
    tracing::info!("Using {} backend, catalog {:?}", cfg.backend, cfg.cameras);

    let driver = create_driver(cfg.backend, &cfg.device_indices())
        .with_context(|| format!("Failed to create {} driver", cfg.backend))?;
    let registry = Arc::new(CameraRegistry::new(driver, cfg.stream.clone()));
    registry.declare_catalog(cfg.cameras.clone());

    let app = routes::router(AppState {
        registry: registry.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&cfg.addr)
        .await
        .with_context(|| format!("Failed to bind {}", cfg.addr))?;
    tracing::info!("Listening on http://{}", cfg.addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(registry.clone()))
        .await?;

    // 进程退出前确保所有设备都已释放
    tokio::task::spawn_blocking(move || registry.shutdown_all()).await?;
    tracing::info!("Server stopped");
    Ok(())
}

/// Ctrl-C 之后先停掉所有摄像头：正在推流的响应会随之结束，graceful shutdown 才能完成
async fn shutdown_signal(registry: Arc<CameraRegistry>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");

    if let Err(e) = tokio::task::spawn_blocking(move || registry.shutdown_all()).await {
        tracing::error!("Camera shutdown failed: {}", e);
    }
}
