//! 任务上下文
//!
//! 封装"我正在处理哪个任务"这一信息：ID、类型、截止时间和状态。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::fmt::{self, Display};
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::models::{JobKind, JobSpec};

/// 分页等待需要在任务截止前留出的余量（用于输出产物）
pub const PAGINATION_TRAILING_BUFFER: Duration = Duration::from_secs(5);

/// 任务 ID（UUID v4），同时用于临时文件命名和日志关联
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// 日志用短 ID（前 8 位）
    pub fn short(&self) -> String {
        self.0.simple().to_string()[..8].to_string()
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// 任务状态
///
/// `Queued → Running → {Succeeded, Failed, TimedOut}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    TimedOut,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Succeeded | JobStatus::Failed | JobStatus::TimedOut
        )
    }
}

/// 一个正在处理的渲染任务
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub kind: JobKind,
    pub timeout: Duration,
    pub deadline: Instant,
    pub convert: bool,
    pub dpi: u32,
    pub created_at: DateTime<Local>,
    status: JobStatus,
}

impl Job {
    /// 创建任务，截止时间从此刻开始计算
    pub fn new(spec: &JobSpec, timeout: Duration) -> Self {
        Self {
            id: JobId::new(),
            kind: spec.kind,
            timeout,
            deadline: Instant::now() + timeout,
            convert: spec.convert,
            dpi: spec.params.dpi,
            created_at: Local::now(),
            status: JobStatus::Queued,
        }
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// 状态只能前进；终态之后的迁移被忽略
    pub fn transition(&mut self, next: JobStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = next;
    }

    /// 距截止时间的剩余时长（已过期为零）
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// 分页等待的截止时间：任务截止前 5 秒
    pub fn pagination_deadline(&self) -> Instant {
        self.deadline
            .checked_sub(PAGINATION_TRAILING_BUFFER)
            .unwrap_or(self.deadline)
    }

    pub fn wants_conversion(&self) -> bool {
        self.convert && !self.kind.is_preview()
    }
}

impl Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[任务 {} {}]", self.id.short(), self.kind.label())
    }
}
