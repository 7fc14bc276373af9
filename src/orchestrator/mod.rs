//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责任务调度和资源生命周期，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `app` - 应用生命周期
//! - 组装所有组件，连接闸门排空钩子与渲染器
//! - 启动 HTTP 服务，处理关闭信号与内部故障
//!
//! ### `job_orchestrator` - 单个任务编排
//! - 校验 → 闸门 → 页面 → 渲染 → 转换 → 释放 → 计数
//! - 统一截止时间
//!
//! ## 层次关系
//!
//! ```text
//! app (生命周期、HTTP)
//!     ↓
//! job_orchestrator (处理单个 JobSpec)
//!     ↓
//! workflow::RenderFlow (单个页面上的渲染流程)
//!     ↓
//! services (能力层：颜色转换)
//!     ↓
//! infrastructure (基础设施：渲染器、闸门、计数器、临时文件)
//! ```

pub mod app;
pub mod job_orchestrator;

// 重新导出主要类型
pub use app::App;
pub use job_orchestrator::{JobLimits, JobOrchestrator};
