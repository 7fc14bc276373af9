//! 基础设施层（Infrastructure Layer）
//!
//! 持有稀缺资源，只向上层暴露能力：
//!
//! - `renderer` - 唯一的渲染器所有者，提供"取一个页面"
//! - `gate` - 并发闸门，限制同时使用渲染器的任务数
//! - `metrics` - 进程级计数器
//! - `scratch` - 任务级临时文件

pub mod gate;
pub mod metrics;
pub mod renderer;
pub mod scratch;

pub use gate::{ConcurrencyGate, GatePermit, GateStatus};
pub use metrics::{ActiveJobGuard, MetricsRegistry, MetricsSnapshot};
pub use renderer::{PageLease, RendererHandle, RendererPhase, RendererStatus};
pub use scratch::{ScratchFile, ScratchSpace};
