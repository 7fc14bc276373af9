//! 渲染器句柄 - 基础设施层
//!
//! 全进程唯一的渲染器（浏览器进程）所有者，只对外暴露"取一个页面"的能力。
//!
//! ## 状态机
//!
//! ```text
//! Uninitialized → Launching → Ready → Disconnected → (Launching ...)
//!                              Ready → Retiring → Uninitialized（计划重启）
//!        任意状态 ── close() ──→ Closing → Closed
//! ```
//!
//! - 首次取页时懒启动；启动期间到达的调用方共享同一个启动 future，不会重复启动
//! - 浏览器断开的通知立即把 `Ready` 切到 `Disconnected`，下次取页时重新启动
//! - 页面计数达到阈值后只"计划"重启，等闸门排空时才真正执行；
//!   旧进程退出之前不会启动新进程，任何时刻最多只有一个浏览器进程
//! - 每次启动都有一个代号，旧代浏览器的断开通知会被忽略

use futures::future::{BoxFuture, FutureExt, Shared};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::browser::{BrowserLauncher, EngineError, LaunchedBrowser, RenderBrowser, RenderPage};
use crate::infrastructure::metrics::MetricsRegistry;

/// 关闭渲染器时等待进程退出的上限
pub const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

type LaunchFuture = Shared<BoxFuture<'static, Result<(), String>>>;
type RetireFuture = Shared<BoxFuture<'static, ()>>;

enum RendererState {
    Uninitialized,
    Launching(LaunchFuture),
    Ready(Arc<dyn RenderBrowser>),
    /// 旧进程正在退出，新的启动必须等它结束
    Retiring(RetireFuture),
    Disconnected,
    Closing,
    Closed,
}

/// 对外可见的状态名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RendererPhase {
    Uninitialized,
    Launching,
    Ready,
    Retiring,
    Disconnected,
    Closing,
    Closed,
}

/// 取页时需要等待的事情
enum Pending {
    Launch(LaunchFuture),
    Retire(RetireFuture),
}

impl RendererState {
    fn phase(&self) -> RendererPhase {
        match self {
            RendererState::Uninitialized => RendererPhase::Uninitialized,
            RendererState::Launching(_) => RendererPhase::Launching,
            RendererState::Ready(_) => RendererPhase::Ready,
            RendererState::Retiring(_) => RendererPhase::Retiring,
            RendererState::Disconnected => RendererPhase::Disconnected,
            RendererState::Closing => RendererPhase::Closing,
            RendererState::Closed => RendererPhase::Closed,
        }
    }
}

/// 渲染器状态快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RendererStatus {
    pub phase: RendererPhase,
    pub pages_served: u64,
    pub restart_threshold: u64,
    pub restart_pending: bool,
    pub generation: u64,
}

struct HandleInner {
    state: RendererState,
    pages_served: u64,
    restart_pending: bool,
    generation: u64,
}

pub struct RendererHandle {
    launcher: Arc<dyn BrowserLauncher>,
    restart_threshold: u64,
    metrics: Arc<MetricsRegistry>,
    inner: Mutex<HandleInner>,
}

impl RendererHandle {
    pub fn new(
        launcher: Arc<dyn BrowserLauncher>,
        restart_threshold: u64,
        metrics: Arc<MetricsRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            launcher,
            restart_threshold: restart_threshold.max(1),
            metrics,
            inner: Mutex::new(HandleInner {
                state: RendererState::Uninitialized,
                pages_served: 0,
                restart_pending: false,
                generation: 0,
            }),
        })
    }

    pub fn status(&self) -> RendererStatus {
        let inner = self.lock();
        RendererStatus {
            phase: inner.state.phase(),
            pages_served: inner.pages_served,
            restart_threshold: self.restart_threshold,
            restart_pending: inner.restart_pending,
            generation: inner.generation,
        }
    }

    /// 获取一个新页面，必要时启动渲染器
    pub async fn acquire_page(self: &Arc<Self>) -> Result<PageLease, EngineError> {
        let browser = self.ready_browser().await?;
        let page = browser.new_page().await?;
        Ok(PageLease { page: Some(page) })
    }

    async fn ready_browser(self: &Arc<Self>) -> Result<Arc<dyn RenderBrowser>, EngineError> {
        loop {
            let pending = {
                let mut guard = self.lock();
                let inner = &mut *guard;

                if let RendererState::Ready(browser) = &inner.state {
                    let browser = Arc::clone(browser);
                    inner.pages_served += 1;
                    if inner.pages_served >= self.restart_threshold && !inner.restart_pending {
                        inner.restart_pending = true;
                        info!(
                            "♻️ 渲染器已服务 {} 个页面，计划在任务排空后重启",
                            inner.pages_served
                        );
                    }
                    return Ok(browser);
                }

                let in_flight = match &inner.state {
                    RendererState::Launching(launch) => Some(Pending::Launch(launch.clone())),
                    RendererState::Retiring(retire) => Some(Pending::Retire(retire.clone())),
                    RendererState::Closing | RendererState::Closed => {
                        return Err(EngineError::ShuttingDown)
                    }
                    _ => None,
                };

                match in_flight {
                    Some(pending) => pending,
                    None => {
                        inner.generation += 1;
                        let launch = self.start_launch(inner.generation);
                        inner.state = RendererState::Launching(launch.clone());
                        Pending::Launch(launch)
                    }
                }
            };

            match pending {
                Pending::Launch(launch) => launch.await.map_err(EngineError::Launch)?,
                Pending::Retire(retire) => {
                    debug!("等待旧渲染器退出后再启动");
                    retire.await;
                }
            }
        }
    }

    /// 创建共享的启动任务
    ///
    /// 启动在独立任务中执行，即使所有等待者都已放弃也会完成并更新状态。
    fn start_launch(self: &Arc<Self>, generation: u64) -> LaunchFuture {
        let handle = Arc::clone(self);
        let task = tokio::spawn(async move {
            info!("🚀 正在启动渲染器 (第 {} 代)", generation);
            let started = Instant::now();
            match handle.launcher.launch().await {
                Ok(launched) => {
                    handle.finish_launch(generation, launched).await?;
                    info!(
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "✅ 渲染器就绪 (第 {} 代)", generation
                    );
                    Ok(())
                }
                Err(e) => {
                    error!("❌ 渲染器启动失败: {}", e);
                    handle.fail_launch(generation);
                    Err(e.to_string())
                }
            }
        });

        async move {
            task.await
                .unwrap_or_else(|e| Err(format!("启动任务异常退出: {}", e)))
        }
        .boxed()
        .shared()
    }

    /// 启动完成后登记新进程
    ///
    /// 若启动期间句柄已被关闭，新进程在本任务内关闭完毕后才返回，
    /// 等待启动结果的 `close()` 因此不会早于它结束。
    async fn finish_launch(
        self: &Arc<Self>,
        generation: u64,
        launched: LaunchedBrowser,
    ) -> Result<(), String> {
        let LaunchedBrowser {
            browser,
            disconnected,
        } = launched;

        let still_wanted = {
            let mut guard = self.lock();
            let inner = &mut *guard;
            let wanted = inner.generation == generation
                && matches!(inner.state, RendererState::Launching(_));
            if wanted {
                inner.state = RendererState::Ready(Arc::clone(&browser));
                inner.pages_served = 0;
                inner.restart_pending = false;
            }
            wanted
        };

        if !still_wanted {
            warn!("渲染器启动完成时已被关闭，立即释放新进程");
            if let Err(e) = browser.close().await {
                warn!("关闭多余的渲染器失败: {}", e);
            }
            return Err(EngineError::ShuttingDown.to_string());
        }

        self.metrics.record_renderer_launch();
        self.watch_disconnect(generation, disconnected);
        Ok(())
    }

    fn fail_launch(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && matches!(inner.state, RendererState::Launching(_)) {
            // 回到初始状态，下一个调用方会重新尝试
            inner.state = RendererState::Uninitialized;
        }
    }

    fn watch_disconnect(self: &Arc<Self>, generation: u64, disconnected: oneshot::Receiver<()>) {
        let handle = Arc::downgrade(self);
        tokio::spawn(async move {
            // 发送端被丢弃同样意味着事件循环已结束
            let _ = disconnected.await;
            if let Some(handle) = handle.upgrade() {
                handle.mark_disconnected(generation);
            }
        });
    }

    fn mark_disconnected(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation != generation || !matches!(inner.state, RendererState::Ready(_)) {
            debug!("忽略第 {} 代渲染器的断开通知", generation);
            return;
        }
        inner.state = RendererState::Disconnected;
        inner.restart_pending = false;
        drop(inner);

        self.metrics.record_renderer_disconnect();
        warn!("⚠️ 渲染器连接已断开 (第 {} 代)，下次取页时重新启动", generation);
    }

    /// 闸门排空时调用：若有计划中的重启则立即执行
    ///
    /// 旧进程进入 `Retiring` 并在后台关闭；它退出之前到达的取页请求会等待，
    /// 新进程在旧进程退出后的下一次取页时懒启动。
    pub fn on_drain(self: &Arc<Self>) {
        let Ok(runtime) = Handle::try_current() else {
            warn!("当前没有异步运行时，跳过计划中的渲染器重启");
            return;
        };

        {
            let mut guard = self.lock();
            let inner = &mut *guard;
            if !inner.restart_pending {
                return;
            }
            inner.restart_pending = false;

            let retired = match std::mem::replace(&mut inner.state, RendererState::Uninitialized) {
                RendererState::Ready(browser) => browser,
                other => {
                    inner.state = other;
                    return;
                }
            };
            inner.generation += 1;
            inner.pages_served = 0;
            let retire = self.start_retire(&runtime, inner.generation, retired);
            inner.state = RendererState::Retiring(retire);
        }

        info!("♻️ 任务已排空，执行计划中的渲染器重启");
        self.metrics.record_renderer_restart();
    }

    fn start_retire(
        self: &Arc<Self>,
        runtime: &Handle,
        generation: u64,
        browser: Arc<dyn RenderBrowser>,
    ) -> RetireFuture {
        let handle = Arc::downgrade(self);
        let task = runtime.spawn(async move {
            if let Err(e) = browser.close().await {
                warn!("关闭旧渲染器失败: {}", e);
            }
            if let Some(handle) = handle.upgrade() {
                handle.finish_retire(generation);
            }
        });

        async move {
            if let Err(e) = task.await {
                warn!("旧渲染器关闭任务异常退出: {}", e);
            }
        }
        .boxed()
        .shared()
    }

    fn finish_retire(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && matches!(inner.state, RendererState::Retiring(_)) {
            inner.state = RendererState::Uninitialized;
            debug!("旧渲染器已退出");
        }
    }

    /// 关闭渲染器（幂等）
    pub async fn close(&self) {
        let previous = {
            let mut inner = self.lock();
            match std::mem::replace(&mut inner.state, RendererState::Closing) {
                RendererState::Closed => {
                    inner.state = RendererState::Closed;
                    return;
                }
                other => {
                    inner.generation += 1;
                    other
                }
            }
        };

        let exited = tokio::time::timeout(CLOSE_TIMEOUT, async move {
            match previous {
                RendererState::Ready(browser) => {
                    info!("🛑 正在关闭渲染器...");
                    if let Err(e) = browser.close().await {
                        warn!("关闭渲染器失败: {}", e);
                    }
                }
                // 启动任务发现句柄已关闭后会自行关闭新进程
                RendererState::Launching(launch) => {
                    let _ = launch.await;
                }
                RendererState::Retiring(retire) => retire.await,
                _ => {}
            }
        })
        .await;
        if exited.is_err() {
            warn!("等待渲染器退出超过 {}s，放弃等待", CLOSE_TIMEOUT.as_secs());
        }

        let mut inner = self.lock();
        inner.state = RendererState::Closed;
        inner.pages_served = 0;
        inner.restart_pending = false;
        info!("渲染器已关闭");
    }

    fn lock(&self) -> MutexGuard<'_, HandleInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 页面租约
///
/// 任务独占一个页面；正常路径调用 `close()`，异常路径（超时、panic）在析构时后台关闭。
pub struct PageLease {
    page: Option<Box<dyn RenderPage>>,
}

impl PageLease {
    pub fn page(&self) -> &dyn RenderPage {
        match self.page.as_deref() {
            Some(page) => page,
            None => unreachable!("页面租约在关闭后仍被使用"),
        }
    }

    pub async fn close(mut self) {
        if let Some(page) = self.page.take() {
            if let Err(e) = page.close().await {
                debug!("关闭页面失败: {}", e);
            }
        }
    }
}

impl Drop for PageLease {
    fn drop(&mut self) {
        let Some(page) = self.page.take() else {
            return;
        };
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    debug!("后台关闭页面失败: {}", e);
                }
            });
        }
    }
}
