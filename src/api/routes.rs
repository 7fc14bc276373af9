//! HTTP 路由
//!
//! 处理器只做请求解析和响应组装，所有任务都交给 `JobOrchestrator`。

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Local;

use crate::api::dto::{HealthResponse, RenderRequest};
use crate::api::error::ApiError;
use crate::api::AppState;
use crate::models::{JobKind, RenderOutcome};

/// 请求体上限（HTML 内联图片可能较大）
pub const MAX_BODY_BYTES: usize = 32 * 1024 * 1024;

const X_JOB_ID: &str = "x-job-id";
const X_COLOR_SPACE: &str = "x-color-space";
const X_PAGINATION_ENGINE: &str = "x-pagination-engine";
const X_RENDER_TIME_MS: &str = "x-render-time-ms";

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/generate", post(generate_document))
        .route("/generate-cover", post(generate_cover))
        .route("/preview", post(preview))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .with_state(state)
}

async fn generate_document(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    render(state, JobKind::Document, payload).await
}

async fn generate_cover(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    render(state, JobKind::Cover, payload).await
}

async fn preview(
    State(state): State<AppState>,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    render(state, JobKind::Preview, payload).await
}

async fn render(
    state: AppState,
    kind: JobKind,
    payload: Result<Json<RenderRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) = payload?;
    let outcome = state.orchestrator.submit(request.into_spec(kind)).await?;
    Ok(artifact_response(outcome))
}

fn artifact_response(outcome: RenderOutcome) -> Response {
    let headers = [
        ("content-type", outcome.artifact.content_type.to_string()),
        (X_JOB_ID, outcome.job_id.to_string()),
        (
            X_COLOR_SPACE,
            outcome.artifact.color_space.as_str().to_string(),
        ),
        (
            X_PAGINATION_ENGINE,
            outcome.artifact.pagination.as_str().to_string(),
        ),
        (X_RENDER_TIME_MS, outcome.elapsed.as_millis().to_string()),
    ];
    (StatusCode::OK, headers, outcome.artifact.bytes).into_response()
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let conversion = state.conversion.status();
    let accepting = state.orchestrator.is_accepting();
    let degraded = !accepting || (conversion.enabled && !conversion.available);

    Json(HealthResponse {
        status: if degraded { "degraded" } else { "ok" },
        accepting,
        uptime_secs: (Local::now() - state.metrics.started_at()).num_seconds(),
        renderer: state.renderer.status(),
        gate: state.gate.status(),
        conversion,
        metrics: state.metrics.snapshot(),
    })
}
