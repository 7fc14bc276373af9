//! 流程层（Workflow Layer）
//!
//! 定义"一个任务"的完整处理流程，不持有任何稀缺资源。

pub mod job;
pub mod render_flow;

pub use job::{Job, JobId, JobStatus, PAGINATION_TRAILING_BUFFER};
pub use render_flow::RenderFlow;
