//! 任务编排器 - 编排层
//!
//! ## 职责
//!
//! 接收 `JobSpec`，在同一个截止时间内驱动完整流程：
//!
//! ```text
//! 校验 → 闸门许可 → 租借页面 → 渲染 → 关闭页面 → (可选) 颜色转换 → 释放许可 → 计数
//! ```
//!
//! - 校验失败在获取任何资源之前返回
//! - 每个任务在独立的 tokio 任务中执行，调用方放弃等待不会跳过清理
//! - 截止时间覆盖排队、启动、加载和输出；颜色转换的时限被裁剪到剩余时间
//! - 任务 panic 或渲染器协议异常作为内部故障上报给 `App`

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::browser::EngineError;
use crate::error::{InternalFault, RenderError};
use crate::infrastructure::{ConcurrencyGate, GatePermit, MetricsRegistry, RendererHandle};
use crate::models::{JobSpec, RenderOutcome, RenderedArtifact};
use crate::workflow::{Job, JobStatus, RenderFlow};

/// 任务时限策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobLimits {
    pub default_timeout: Duration,
    pub max_timeout: Duration,
}

impl JobLimits {
    /// 请求未指定时使用默认值，并限制在最大值以内
    pub fn resolve(&self, timeout_ms: Option<u64>) -> Duration {
        timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.default_timeout)
            .min(self.max_timeout)
    }
}

pub struct JobOrchestrator {
    gate: Arc<ConcurrencyGate>,
    renderer: Arc<RendererHandle>,
    flow: RenderFlow,
    metrics: Arc<MetricsRegistry>,
    limits: JobLimits,
    accepting: AtomicBool,
    faults: Option<mpsc::UnboundedSender<InternalFault>>,
}

impl JobOrchestrator {
    pub fn new(
        gate: Arc<ConcurrencyGate>,
        renderer: Arc<RendererHandle>,
        flow: RenderFlow,
        metrics: Arc<MetricsRegistry>,
        limits: JobLimits,
    ) -> Self {
        Self {
            gate,
            renderer,
            flow,
            metrics,
            limits,
            accepting: AtomicBool::new(true),
            faults: None,
        }
    }

    /// 注册内部故障的接收端
    pub fn with_fault_reporter(mut self, faults: mpsc::UnboundedSender<InternalFault>) -> Self {
        self.faults = Some(faults);
        self
    }

    /// 停止接收新任务（已提交的任务继续执行）
    pub fn stop_accepting(&self) {
        if self.accepting.swap(false, Ordering::SeqCst) {
            info!("🚫 停止接收新任务");
        }
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::SeqCst)
    }

    /// 提交一个任务并等待结果
    pub async fn submit(self: &Arc<Self>, spec: JobSpec) -> Result<RenderOutcome, RenderError> {
        self.metrics.record_request();
        let job = Job::new(&spec, self.limits.resolve(spec.timeout_ms));

        if let Err(reason) = spec.validate() {
            warn!("{} ❌ 请求参数无效: {}", job, reason);
            self.metrics.record_rejected();
            return Err(RenderError::InvalidSpec {
                job_id: job.id,
                reason,
            });
        }

        if !self.is_accepting() {
            self.metrics.record_rejected();
            return Err(RenderError::RendererUnavailable {
                job_id: job.id,
                reason: "服务正在关闭".to_string(),
            });
        }

        let job_id = job.id;
        let orchestrator = Arc::clone(self);
        let handle = tokio::spawn(async move { orchestrator.run_job(job, spec).await });

        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let message = if e.is_panic() {
                    "任务执行过程中发生 panic".to_string()
                } else {
                    e.to_string()
                };
                self.metrics.record_failure();
                self.report_fault(InternalFault::JobPanicked {
                    job_id,
                    message: message.clone(),
                });
                Err(RenderError::RenderFailure { job_id, message })
            }
        }
    }

    async fn run_job(self: Arc<Self>, mut job: Job, spec: JobSpec) -> Result<RenderOutcome, RenderError> {
        let _active = self.metrics.track_active();
        let started = Instant::now();
        info!("{} 📥 任务开始 (时限 {}s)", job, job.timeout.as_secs());

        let staged = tokio::time::timeout_at(job.deadline, self.render_stage(&mut job, &spec)).await;

        let result = match staged {
            Ok(Ok((artifact, permit))) => {
                let artifact = self.flow.convert_colors(&job, artifact).await;
                drop(permit);
                Ok(artifact)
            }
            Ok(Err(e)) => Err(e),
            Err(_) => Err(RenderError::RenderTimeout {
                job_id: job.id,
                timeout_secs: job.timeout.as_secs(),
            }),
        };

        let elapsed = started.elapsed();
        match result {
            Ok(artifact) => {
                job.transition(JobStatus::Succeeded);
                self.metrics.record_success();
                info!(
                    job_id = %job.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{} ✅ 任务完成 ({}, {})",
                    job,
                    artifact.content_type,
                    artifact.color_space.as_str()
                );
                Ok(RenderOutcome {
                    job_id: job.id,
                    artifact,
                    elapsed,
                })
            }
            Err(e) => {
                if e.is_timeout() {
                    job.transition(JobStatus::TimedOut);
                    self.metrics.record_timeout();
                } else {
                    job.transition(JobStatus::Failed);
                    self.metrics.record_failure();
                }
                warn!(
                    job_id = %job.id,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "{} ❌ {}",
                    job,
                    e
                );
                Err(e)
            }
        }
    }

    /// 受截止时间约束的部分：排队、取页、渲染
    ///
    /// 返回的许可证由调用方持有到颜色转换结束。
    async fn render_stage(
        &self,
        job: &mut Job,
        spec: &JobSpec,
    ) -> Result<(RenderedArtifact, GatePermit), RenderError> {
        let queued_at = Instant::now();
        let permit = self.gate.acquire().await;
        job.transition(JobStatus::Running);
        debug!(
            "{} 🚦 获得执行许可 (排队 {}ms)",
            job,
            queued_at.elapsed().as_millis()
        );

        let lease = self.renderer.acquire_page().await.map_err(|e| {
            if e.is_fatal() {
                self.report_protocol_fault(job, &e);
            }
            RenderError::RendererUnavailable {
                job_id: job.id,
                reason: e.to_string(),
            }
        })?;

        let rendered = self.flow.render(lease.page(), job, spec).await;
        lease.close().await;

        let artifact = rendered.map_err(|e| match e {
            EngineError::Timeout => RenderError::RenderTimeout {
                job_id: job.id,
                timeout_secs: job.timeout.as_secs(),
            },
            other => {
                if other.is_fatal() {
                    self.report_protocol_fault(job, &other);
                }
                RenderError::RenderFailure {
                    job_id: job.id,
                    message: other.to_string(),
                }
            }
        })?;

        Ok((artifact, permit))
    }

    fn report_protocol_fault(&self, job: &Job, err: &EngineError) {
        self.report_fault(InternalFault::RendererProtocol {
            job_id: job.id,
            message: err.to_string(),
        });
    }

    fn report_fault(&self, fault: InternalFault) {
        error!("💥 内部故障: {}", fault);
        if let Some(faults) = &self.faults {
            let _ = faults.send(fault);
        }
    }
}
