//! 进程级计数器
//!
//! 全进程只有一个实例，通过 `Arc` 注入编排器、渲染器和健康检查。
//! 所有计数只增不减（`active_jobs` 除外），进程重启才会清零。

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
pub struct MetricsRegistry {
    requests_total: AtomicU64,
    jobs_rejected: AtomicU64,
    jobs_succeeded: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_timed_out: AtomicU64,
    active_jobs: AtomicU64,
    conversions_succeeded: AtomicU64,
    conversions_failed: AtomicU64,
    conversions_skipped: AtomicU64,
    renderer_launches: AtomicU64,
    renderer_restarts: AtomicU64,
    renderer_disconnects: AtomicU64,
    started_at: DateTime<Local>,
}

/// 计数器快照（`/health` 输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub requests_total: u64,
    pub jobs_rejected: u64,
    pub jobs_succeeded: u64,
    /// 失败总数，包含超时
    pub jobs_failed: u64,
    pub jobs_timed_out: u64,
    pub active_jobs: u64,
    pub conversions_succeeded: u64,
    pub conversions_failed: u64,
    pub conversions_skipped: u64,
    pub renderer_launches: u64,
    pub renderer_restarts: u64,
    pub renderer_disconnects: u64,
    pub started_at: String,
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self {
            requests_total: AtomicU64::new(0),
            jobs_rejected: AtomicU64::new(0),
            jobs_succeeded: AtomicU64::new(0),
            jobs_failed: AtomicU64::new(0),
            jobs_timed_out: AtomicU64::new(0),
            active_jobs: AtomicU64::new(0),
            conversions_succeeded: AtomicU64::new(0),
            conversions_failed: AtomicU64::new(0),
            conversions_skipped: AtomicU64::new(0),
            renderer_launches: AtomicU64::new(0),
            renderer_restarts: AtomicU64::new(0),
            renderer_disconnects: AtomicU64::new(0),
            started_at: Local::now(),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl MetricsRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_request(&self) {
        bump(&self.requests_total);
    }

    pub fn record_rejected(&self) {
        bump(&self.jobs_rejected);
    }

    pub fn record_success(&self) {
        bump(&self.jobs_succeeded);
    }

    pub fn record_failure(&self) {
        bump(&self.jobs_failed);
    }

    /// 超时同时计入失败总数
    pub fn record_timeout(&self) {
        bump(&self.jobs_timed_out);
        bump(&self.jobs_failed);
    }

    pub fn record_conversion(&self, succeeded: bool) {
        if succeeded {
            bump(&self.conversions_succeeded);
        } else {
            bump(&self.conversions_failed);
        }
    }

    /// 请求了转换但转换工具不可用
    pub fn record_conversion_skipped(&self) {
        bump(&self.conversions_skipped);
    }

    pub fn record_renderer_launch(&self) {
        bump(&self.renderer_launches);
    }

    pub fn record_renderer_restart(&self) {
        bump(&self.renderer_restarts);
    }

    pub fn record_renderer_disconnect(&self) {
        bump(&self.renderer_disconnects);
    }

    /// 标记一个任务进入执行，返回的守卫在析构时减少活跃数
    pub fn track_active(self: &Arc<Self>) -> ActiveJobGuard {
        bump(&self.active_jobs);
        ActiveJobGuard {
            metrics: Arc::clone(self),
        }
    }

    pub fn active_jobs(&self) -> u64 {
        self.active_jobs.load(Ordering::Relaxed)
    }

    pub fn started_at(&self) -> DateTime<Local> {
        self.started_at
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let load = |counter: &AtomicU64| counter.load(Ordering::Relaxed);
        MetricsSnapshot {
            requests_total: load(&self.requests_total),
            jobs_rejected: load(&self.jobs_rejected),
            jobs_succeeded: load(&self.jobs_succeeded),
            jobs_failed: load(&self.jobs_failed),
            jobs_timed_out: load(&self.jobs_timed_out),
            active_jobs: load(&self.active_jobs),
            conversions_succeeded: load(&self.conversions_succeeded),
            conversions_failed: load(&self.conversions_failed),
            conversions_skipped: load(&self.conversions_skipped),
            renderer_launches: load(&self.renderer_launches),
            renderer_restarts: load(&self.renderer_restarts),
            renderer_disconnects: load(&self.renderer_disconnects),
            started_at: self.started_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        }
    }
}

/// 活跃任务守卫
pub struct ActiveJobGuard {
    metrics: Arc<MetricsRegistry>,
}

impl Drop for ActiveJobGuard {
    fn drop(&mut self) {
        self.metrics.active_jobs.fetch_sub(1, Ordering::Relaxed);
    }
}
