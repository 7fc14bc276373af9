//! # Print Render
//!
//! 把 HTML/CSS 文档渲染为印刷级 PDF（可选 CMYK 转换）的任务编排服务
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源，只暴露能力
//! - `RendererHandle` - 唯一的渲染器所有者，提供"取一个页面"能力
//! - `ConcurrencyGate` - FIFO 并发闸门
//! - `MetricsRegistry` - 进程级计数器
//! - `ScratchSpace` - 任务级临时文件
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"
//! - `ConversionStage` - 调用外部工具做 CMYK 转换
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"在页面上的完整流程
//! - `Job` - 任务上下文（ID、类型、截止时间、状态）
//! - `RenderFlow` - 加载 → 分页 → 输出 → 转换
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/job_orchestrator` - 单个任务的资源获取、时限和计数
//! - `orchestrator/app` - 组件组装、HTTP 服务和关闭流程
//!
//! 渲染引擎通过 `browser/` 中的 trait 接入，生产环境使用 chromiumoxide。
//!
//! ## 模块结构

pub mod api;
pub mod browser;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use browser::{BrowserLauncher, ChromiumLauncher, EngineError};
pub use config::Config;
pub use error::{ConfigError, InternalFault, RenderError};
pub use infrastructure::{ConcurrencyGate, MetricsRegistry, RendererHandle, ScratchSpace};
pub use models::{JobKind, JobSpec, RenderOutcome};
pub use orchestrator::{App, JobLimits, JobOrchestrator};
pub use services::ConversionStage;
pub use workflow::{Job, JobId, RenderFlow};
