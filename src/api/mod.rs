//! HTTP 接口层
//!
//! - `POST /generate` 正文 PDF
//! - `POST /generate-cover` 封面 PDF
//! - `POST /preview` 预览 PNG
//! - `GET /health` 运行状态

pub mod dto;
pub mod error;
pub mod routes;

use std::sync::Arc;

use crate::infrastructure::{ConcurrencyGate, MetricsRegistry, RendererHandle};
use crate::orchestrator::JobOrchestrator;
use crate::services::ConversionStage;

pub use dto::{ErrorBody, HealthResponse, RenderRequest};
pub use error::ApiError;
pub use routes::router;

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<JobOrchestrator>,
    pub renderer: Arc<RendererHandle>,
    pub gate: Arc<ConcurrencyGate>,
    pub conversion: Arc<ConversionStage>,
    pub metrics: Arc<MetricsRegistry>,
}
