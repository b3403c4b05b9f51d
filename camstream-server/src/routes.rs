//! HTTP 路由
//!
//! 每个 `/video/{name}` 连接拥有自己的 StreamGenerator；连接断开时 axum 丢弃响应体，
//! 生成器随之取消。设备的打开/释放完全由 CameraRegistry 和空闲超时决定。

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use camstream::mjpeg::{StreamGenerator, MULTIPART_CONTENT_TYPE};
use camstream::registry::CameraRegistry;
use camstream::CameraError;
use futures::StreamExt;
use serde_json::{json, Value};

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<CameraRegistry>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video/:name", get(video))
        .route("/cameras", get(cameras))
        .route("/cameras/initialize", post(initialize))
        .route("/cameras/shutdown", post(shutdown))
        .with_state(state)
}

/// 处理器返回的错误，转换为带 JSON 说明的状态码
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Unavailable(String),
    Internal(String),
}

impl From<CameraError> for ApiError {
    fn from(err: CameraError) -> Self {
        match err {
            CameraError::UnknownCamera(_) => Self::NotFound(err.to_string()),
            e if e.is_open_failure() => Self::Unavailable(e.to_string()),
            e => Self::Internal(e.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Internal(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(m) => (StatusCode::NOT_FOUND, m),
            Self::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
            Self::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn index() -> Json<Value> {
    Json(json!({ "message": "camstream server is running" }))
}

async fn video(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, ApiError> {
    // 打开设备是阻塞调用
    let registry = state.registry.clone();
    let stream = tokio::task::spawn_blocking(move || registry.ensure_running(&name))
        .await?
        .inspect_err(|e| tracing::warn!("Video request rejected: {}", e))?;

    let generator = StreamGenerator::new(stream);
    let body = Body::from_stream(generator.map(Ok::<_, Infallible>));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, MULTIPART_CONTENT_TYPE)
        .header(header::CACHE_CONTROL, "no-cache, no-store, must-revalidate")
        .header(header::PRAGMA, "no-cache")
        .body(body)
        .map_err(|e| ApiError::Internal(e.to_string()))
}

async fn cameras(State(state): State<AppState>) -> Json<Vec<Value>> {
    let status = state
        .registry
        .snapshot()
        .into_iter()
        .map(|s| {
            json!({
                "name": s.name,
                "device_index": s.device_index,
                "running": s.running,
                "telemetry": s.telemetry.export_state(),
            })
        })
        .collect();
    Json(status)
}

async fn initialize(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let registry = state.registry.clone();
    let ok = tokio::task::spawn_blocking(move || registry.initialize_all()).await?;
    Ok(Json(json!({ "cameraInitialized": ok })))
}

async fn shutdown(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let registry = state.registry.clone();
    tokio::task::spawn_blocking(move || registry.shutdown_all()).await?;
    Ok(Json(json!({ "ended": true })))
}
