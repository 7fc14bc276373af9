//! 基于 chromiumoxide 的渲染引擎实现

use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::{CaptureScreenshotFormat, PrintToPdfParams};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Handler, Page};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};
use tracing::{debug, warn};

use crate::browser::connection::connect_to_browser;
use crate::browser::engine::{
    BrowserLauncher, EngineError, LaunchedBrowser, RenderBrowser, RenderPage,
};
use crate::browser::headless::{launch_headless_browser, HeadlessSettings};
use crate::models::{PreviewOptions, PrintOptions};

/// 分页引擎检测脚本（Paged.js 或兼容实现）
const PAGINATION_PRESENT_JS: &str =
    "typeof window.PagedPolyfill !== 'undefined' || typeof window.Paged !== 'undefined'";

/// 分页完成标志：文档在分页引擎的 `after` 钩子中设置 `window.PAGINATION_DONE = true`
const PAGINATION_DONE_JS: &str = "window.PAGINATION_DONE === true";

const FONTS_READY_JS: &str = "document.fonts.ready.then(() => true)";

const PAGINATION_POLL_INTERVAL: Duration = Duration::from_millis(100);

impl From<CdpError> for EngineError {
    fn from(err: CdpError) -> Self {
        match err {
            CdpError::Timeout => EngineError::Timeout,
            CdpError::Serde(e) => EngineError::Protocol(e.to_string()),
            other => EngineError::Page(other.to_string()),
        }
    }
}

/// 浏览器的获取方式
#[derive(Debug, Clone)]
pub enum ChromiumLauncher {
    /// 由本服务启动并拥有无头浏览器进程
    Headless(HeadlessSettings),
    /// 连接外部浏览器的远程调试端口
    Connect { port: u16 },
}

#[async_trait]
impl BrowserLauncher for ChromiumLauncher {
    async fn launch(&self) -> Result<LaunchedBrowser, EngineError> {
        let (browser, handler, owned) = match self {
            ChromiumLauncher::Headless(settings) => {
                let (browser, handler) = launch_headless_browser(settings).await?;
                (browser, handler, true)
            }
            ChromiumLauncher::Connect { port } => {
                let (browser, handler) = connect_to_browser(*port).await?;
                (browser, handler, false)
            }
        };

        let disconnected = spawn_event_loop(handler);

        Ok(LaunchedBrowser {
            browser: Arc::new(ChromiumBrowser {
                browser: Mutex::new(browser),
                owned,
            }),
            disconnected,
        })
    }
}

/// 在后台驱动浏览器事件，事件流结束即视为断开
fn spawn_event_loop(mut handler: Handler) -> oneshot::Receiver<()> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(e) = event {
                debug!("浏览器事件循环结束: {}", e);
                break;
            }
        }
        let _ = tx.send(());
    });
    rx
}

pub struct ChromiumBrowser {
    browser: Mutex<Browser>,
    owned: bool,
}

#[async_trait]
impl RenderBrowser for ChromiumBrowser {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>, EngineError> {
        let page = self.browser.lock().await.new_page("about:blank").await?;
        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        if !self.owned {
            debug!("外部浏览器不由本服务关闭，仅断开连接");
            return Ok(());
        }

        let mut browser = self.browser.lock().await;
        browser.close().await?;
        if let Err(e) = browser.wait().await {
            warn!("等待浏览器进程退出失败: {}", e);
        }
        Ok(())
    }
}

pub struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn eval_as<T: DeserializeOwned>(&self, js: &str) -> Result<T, EngineError> {
        let params = EvaluateParams::builder()
            .expression(js)
            .await_promise(true)
            .return_by_value(true)
            .build()
            .map_err(EngineError::Page)?;

        let result = self.page.evaluate_expression(params).await?;
        result
            .into_value()
            .map_err(|e| EngineError::Page(format!("脚本返回值无法解析: {}", e)))
    }
}

#[async_trait]
impl RenderPage for ChromiumPage {
    async fn load_content(&self, html: &str) -> Result<(), EngineError> {
        self.page.set_content(html).await?;
        let _: bool = self.eval_as(FONTS_READY_JS).await?;
        Ok(())
    }

    async fn has_pagination_engine(&self) -> Result<bool, EngineError> {
        self.eval_as(PAGINATION_PRESENT_JS).await
    }

    async fn wait_for_pagination(&self) -> Result<(), EngineError> {
        loop {
            if self.eval_as::<bool>(PAGINATION_DONE_JS).await? {
                return Ok(());
            }
            tokio::time::sleep(PAGINATION_POLL_INTERVAL).await;
        }
    }

    async fn print_pdf(&self, options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        let params = PrintToPdfParams {
            print_background: Some(true),
            prefer_css_page_size: Some(true),
            paper_width: Some(options.paper_width_in),
            paper_height: Some(options.paper_height_in),
            margin_top: Some(0.0),
            margin_bottom: Some(0.0),
            margin_left: Some(0.0),
            margin_right: Some(0.0),
            ..Default::default()
        };
        Ok(self.page.pdf(params).await?)
    }

    async fn capture_png(&self, options: &PreviewOptions) -> Result<Vec<u8>, EngineError> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(options.width),
                i64::from(options.height),
                options.device_scale_factor,
                false,
            ))
            .await?;

        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        Ok(self.page.screenshot(params).await?)
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        self.page.close().await?;
        Ok(())
    }
}
