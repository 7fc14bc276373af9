use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::debug;

use crate::api::dto::ErrorBody;
use crate::error::RenderError;

/// HTTP 层错误
#[derive(Debug)]
pub enum ApiError {
    /// 请求体无法解析（尚未分配任务 ID）
    BadRequest(String),
    /// 任务失败
    Render(RenderError),
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        ApiError::Render(err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Render(err) => match err {
                RenderError::InvalidSpec { .. } => StatusCode::BAD_REQUEST,
                RenderError::RendererUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                RenderError::RenderTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
                RenderError::RenderFailure { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self {
            ApiError::BadRequest(message) => {
                debug!("请求体解析失败: {}", message);
                ErrorBody {
                    error: message,
                    code: "INVALID_REQUEST",
                    job_id: None,
                }
            }
            ApiError::Render(err) => ErrorBody {
                error: err.to_string(),
                code: err.code(),
                job_id: Some(err.job_id().to_string()),
            },
        };
        (status, Json(body)).into_response()
    }
}
