//! 渲染引擎能力接口
//!
//! 编排层只通过这三个 trait 使用渲染器：
//! - `BrowserLauncher` 负责启动（或连接）浏览器进程
//! - `RenderBrowser` 代表一个存活的浏览器，只能开页面和关闭
//! - `RenderPage` 代表一个页面，只暴露加载、分页等待、输出产物的能力
//!
//! 生产实现见 `browser::chromium`，测试中可替换为假实现。

use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::models::{PreviewOptions, PrintOptions};

/// 渲染引擎错误
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// 启动浏览器失败
    #[error("浏览器启动失败: {0}")]
    Launch(String),
    /// 浏览器连接已断开
    #[error("浏览器连接已断开")]
    Disconnected,
    /// 渲染器正在关闭或已关闭
    #[error("渲染器已关闭")]
    ShuttingDown,
    /// 单次浏览器命令超时
    #[error("浏览器命令超时")]
    Timeout,
    /// 页面操作失败
    #[error("页面操作失败: {0}")]
    Page(String),
    /// 无法理解的协议消息，进程状态不可信
    #[error("浏览器协议异常: {0}")]
    Protocol(String),
}

impl EngineError {
    /// 是否为不可恢复的内部故障
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Protocol(_))
    }
}

/// 启动结果：浏览器本体 + 断开通知
///
/// `disconnected` 在浏览器进程退出或连接中断时完成（发送端被丢弃同样视为断开）。
pub struct LaunchedBrowser {
    pub browser: Arc<dyn RenderBrowser>,
    pub disconnected: oneshot::Receiver<()>,
}

/// 浏览器启动器
#[async_trait]
pub trait BrowserLauncher: Send + Sync + 'static {
    async fn launch(&self) -> Result<LaunchedBrowser, EngineError>;
}

/// 存活的浏览器进程
#[async_trait]
pub trait RenderBrowser: Send + Sync {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>, EngineError>;

    /// 终止浏览器进程
    async fn close(&self) -> Result<(), EngineError>;
}

/// 单个渲染页面
#[async_trait]
pub trait RenderPage: Send + Sync {
    /// 写入文档并等待字体等资源就绪
    async fn load_content(&self, html: &str) -> Result<(), EngineError>;

    /// 文档中是否存在分页引擎
    async fn has_pagination_engine(&self) -> Result<bool, EngineError>;

    /// 等待分页引擎发出完成信号；不自带超时，由调用方限时
    async fn wait_for_pagination(&self) -> Result<(), EngineError>;

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, EngineError>;

    async fn capture_png(&self, options: &PreviewOptions) -> Result<Vec<u8>, EngineError>;

    async fn close(self: Box<Self>) -> Result<(), EngineError>;
}
