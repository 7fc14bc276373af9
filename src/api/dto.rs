//! HTTP 请求/响应结构

use serde::{Deserialize, Serialize};

use crate::infrastructure::{GateStatus, MetricsSnapshot, RendererStatus};
use crate::models::{JobKind, JobSpec, RenderParams};
use crate::services::ConversionStatus;

/// 渲染请求体
///
/// 渲染参数平铺在顶层，例如：
///
/// ```json
/// { "html": "<html>...</html>", "pageWidth": "210mm", "bleed": 3, "convert": true }
/// ```
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderRequest {
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(flatten)]
    pub params: RenderParams,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    #[serde(default, alias = "cmyk")]
    pub convert: bool,
}

impl RenderRequest {
    pub fn into_spec(self, kind: JobKind) -> JobSpec {
        JobSpec {
            kind,
            html: self.html,
            css: self.css,
            params: self.params,
            timeout_ms: self.timeout_ms,
            convert: self.convert,
        }
    }
}

/// 错误响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub error: String,
    pub code: &'static str,
    pub job_id: Option<String>,
}

/// `/health` 响应体
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub accepting: bool,
    pub uptime_secs: i64,
    pub renderer: RendererStatus,
    pub gate: GateStatus,
    pub conversion: ConversionStatus,
    pub metrics: MetricsSnapshot,
}
