//! 应用生命周期 - 编排层
//!
//! ## 职责
//!
//! 1. **组装**：配置 → 计数器、临时目录、转换阶段、闸门、渲染器、编排器
//! 2. **连线**：闸门排空钩子 → 渲染器计划重启
//! 3. **服务**：启动 HTTP 监听
//! 4. **关闭**：信号到达后停止接收任务，立即关闭渲染器（仍在使用页面的任务随之失败），
//!    清理临时文件，再等待 HTTP 连接排空
//! 5. **故障**：收到内部故障时尽力关闭渲染器并以退出码 1 终止进程
//!
//! 渲染器关闭有 `CLOSE_TIMEOUT` 上限，不会因浏览器进程不退出而卡住关闭流程。

use anyhow::{Context, Result};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

use crate::api::{self, AppState};
use crate::browser::BrowserLauncher;
use crate::config::Config;
use crate::error::InternalFault;
use crate::infrastructure::{ConcurrencyGate, MetricsRegistry, RendererHandle, ScratchSpace};
use crate::orchestrator::JobOrchestrator;
use crate::services::ConversionStage;
use crate::utils::logging::{log_shutdown, log_startup};
use crate::workflow::RenderFlow;

/// 应用主结构
pub struct App {
    config: Config,
    orchestrator: Arc<JobOrchestrator>,
    renderer: Arc<RendererHandle>,
    gate: Arc<ConcurrencyGate>,
    conversion: Arc<ConversionStage>,
    metrics: Arc<MetricsRegistry>,
    scratch: Arc<ScratchSpace>,
    faults: mpsc::UnboundedReceiver<InternalFault>,
}

enum StopReason {
    Signal,
    Fault(InternalFault),
    ServerExited(String),
}

impl App {
    /// 初始化应用（按配置选择浏览器获取方式）
    pub async fn initialize(config: Config) -> Result<Self> {
        let launcher = Arc::new(config.launcher());
        Self::with_launcher(config, launcher).await
    }

    /// 使用指定的浏览器启动器初始化应用
    pub async fn with_launcher(config: Config, launcher: Arc<dyn BrowserLauncher>) -> Result<Self> {
        config.validate()?;
        log_startup(&config);

        let metrics = MetricsRegistry::new();
        let scratch = ScratchSpace::new(&config.temp_dir)
            .with_context(|| format!("无法创建临时目录: {}", config.temp_dir.display()))?;

        let settings = config.conversion_settings()?;
        let conversion = Arc::new(if config.conversion_enabled {
            ConversionStage::probe(settings).await
        } else {
            ConversionStage::disabled(settings)
        });

        let gate = ConcurrencyGate::new(config.max_concurrent_jobs);
        let renderer = RendererHandle::new(
            launcher,
            config.renderer_restart_threshold,
            Arc::clone(&metrics),
        );

        // 闸门排空时执行计划中的重启；弱引用避免循环持有
        let drain_target = Arc::downgrade(&renderer);
        gate.on_drain(move || {
            if let Some(renderer) = drain_target.upgrade() {
                renderer.on_drain();
            }
        });

        let (fault_tx, faults) = mpsc::unbounded_channel();
        let flow = RenderFlow::new(
            Arc::clone(&conversion),
            Arc::clone(&scratch),
            Arc::clone(&metrics),
        );
        let orchestrator = Arc::new(
            JobOrchestrator::new(
                Arc::clone(&gate),
                Arc::clone(&renderer),
                flow,
                Arc::clone(&metrics),
                config.job_limits(),
            )
            .with_fault_reporter(fault_tx),
        );

        Ok(Self {
            config,
            orchestrator,
            renderer,
            gate,
            conversion,
            metrics,
            scratch,
            faults,
        })
    }

    pub fn state(&self) -> AppState {
        AppState {
            orchestrator: Arc::clone(&self.orchestrator),
            renderer: Arc::clone(&self.renderer),
            gate: Arc::clone(&self.gate),
            conversion: Arc::clone(&self.conversion),
            metrics: Arc::clone(&self.metrics),
        }
    }

    pub fn router(&self) -> Router {
        api::router(self.state())
    }

    pub fn orchestrator(&self) -> &Arc<JobOrchestrator> {
        &self.orchestrator
    }

    pub fn renderer(&self) -> &Arc<RendererHandle> {
        &self.renderer
    }

    pub fn gate(&self) -> &Arc<ConcurrencyGate> {
        &self.gate
    }

    pub fn metrics(&self) -> &Arc<MetricsRegistry> {
        &self.metrics
    }

    pub fn scratch(&self) -> &Arc<ScratchSpace> {
        &self.scratch
    }

    /// 绑定监听地址并运行到关闭
    pub async fn run(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr)
            .await
            .with_context(|| format!("无法监听地址: {}", self.config.listen_addr))?;
        self.serve(listener).await
    }

    /// 在已绑定的监听器上运行，直到收到 SIGINT/SIGTERM
    pub async fn serve(self, listener: TcpListener) -> Result<()> {
        let stop = async {
            shutdown_signal().await;
            info!("💡 再次发送信号将强制退出");
            tokio::spawn(async {
                shutdown_signal().await;
                warn!("再次收到关闭信号，强制退出");
                std::process::exit(130);
            });
        };
        self.serve_until(listener, stop).await
    }

    /// 在已绑定的监听器上运行，直到 `stop` 完成
    pub async fn serve_until(
        mut self,
        listener: TcpListener,
        stop: impl Future<Output = ()>,
    ) -> Result<()> {
        info!("🌐 HTTP 服务已启动: {}", listener.local_addr()?);

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let router = self.router();
        let mut server = tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop_rx.await;
                })
                .await
        });

        let reason = tokio::select! {
            _ = stop => StopReason::Signal,
            Some(fault) = self.faults.recv() => StopReason::Fault(fault),
            exited = &mut server => StopReason::ServerExited(match exited {
                Ok(Ok(())) => "监听意外结束".to_string(),
                Ok(Err(e)) => e.to_string(),
                Err(e) => e.to_string(),
            }),
        };

        match reason {
            StopReason::Signal => {
                info!("🛑 收到关闭信号，停止接收新任务");
                self.orchestrator.stop_accepting();
                let _ = stop_tx.send(());

                // 不等在途任务跑完：渲染器关闭后它们会立即失败并返回响应
                self.release_resources().await;
                match server.await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!("HTTP 服务关闭时出错: {}", e),
                    Err(e) => warn!("HTTP 服务任务异常: {}", e),
                }
                self.shutdown().await;
                Ok(())
            }
            StopReason::Fault(fault) => {
                error!("💥 内部故障，进程即将退出: {}", fault);
                self.orchestrator.stop_accepting();
                self.release_resources().await;
                log_shutdown(&self.metrics.snapshot());
                std::process::exit(1);
            }
            StopReason::ServerExited(reason) => {
                error!("❌ HTTP 服务异常退出: {}", reason);
                self.shutdown().await;
                anyhow::bail!("HTTP 服务异常退出: {}", reason)
            }
        }
    }

    /// 有序关闭：停止接收 → 关闭渲染器 → 清理临时文件（可重复调用）
    pub async fn shutdown(&self) {
        self.orchestrator.stop_accepting();
        self.release_resources().await;
        log_shutdown(&self.metrics.snapshot());
    }

    async fn release_resources(&self) {
        self.renderer.close().await;
        self.scratch.sweep();
    }
}

/// 等待 SIGINT 或 SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("无法监听 Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("无法监听 SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
