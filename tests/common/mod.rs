//! 集成测试共享工具：可编排的假渲染引擎、假转换工具和应用构造

#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;

use print_render::browser::{
    BrowserLauncher, EngineError, LaunchedBrowser, RenderBrowser, RenderPage,
};
use print_render::models::{PreviewOptions, PrintOptions};
use print_render::{App, Config};

pub const FAKE_PDF: &[u8] = b"%PDF-1.7 fake";
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

/// 分页引擎行为
#[derive(Debug, Clone, Copy)]
pub enum Pagination {
    Absent,
    Completes(Duration),
    Hangs,
}

/// 页面行为脚本
#[derive(Debug, Clone, Copy)]
pub struct PageScript {
    pub load_delay: Duration,
    pub load_hangs: bool,
    pub pagination: Pagination,
    pub print_delay: Duration,
}

impl Default for PageScript {
    fn default() -> Self {
        Self {
            load_delay: Duration::ZERO,
            load_hangs: false,
            pagination: Pagination::Absent,
            print_delay: Duration::ZERO,
        }
    }
}

/// 引擎事件（附带发生时间）
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Launched(usize),
    BrowserClosed(usize),
    LoadStarted(String),
    Printed(String),
    PageClosed(String),
}

#[derive(Default)]
struct EngineState {
    script: Mutex<PageScript>,
    launch_delay: Mutex<Duration>,
    close_delay: Mutex<Duration>,
    failing_launches: AtomicUsize,
    launches: AtomicUsize,
    live_browsers: AtomicUsize,
    max_live_browsers: AtomicUsize,
    open_pages: AtomicUsize,
    max_open_pages: AtomicUsize,
    events: Mutex<Vec<(Instant, Event)>>,
    disconnects: Mutex<Vec<Option<oneshot::Sender<()>>>>,
}

impl EngineState {
    fn record(&self, event: Event) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }

    fn script(&self) -> PageScript {
        *self.script.lock().unwrap()
    }
}

/// 假渲染引擎，同时充当启动器
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<EngineState>,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(script: PageScript) -> Self {
        let engine = Self::new();
        engine.set_script(script);
        engine
    }

    pub fn set_script(&self, script: PageScript) {
        *self.state.script.lock().unwrap() = script;
    }

    pub fn set_launch_delay(&self, delay: Duration) {
        *self.state.launch_delay.lock().unwrap() = delay;
    }

    /// 浏览器进程退出所需时间
    pub fn set_close_delay(&self, delay: Duration) {
        *self.state.close_delay.lock().unwrap() = delay;
    }

    /// 接下来的 `count` 次启动失败
    pub fn fail_next_launches(&self, count: usize) {
        self.state.failing_launches.store(count, Ordering::SeqCst);
    }

    /// 启动尝试次数（含失败）
    pub fn launches(&self) -> usize {
        self.state.launches.load(Ordering::SeqCst)
    }

    /// 当前存活的浏览器进程数
    pub fn live_browsers(&self) -> usize {
        self.state.live_browsers.load(Ordering::SeqCst)
    }

    pub fn max_live_browsers(&self) -> usize {
        self.state.max_live_browsers.load(Ordering::SeqCst)
    }

    pub fn open_pages(&self) -> usize {
        self.state.open_pages.load(Ordering::SeqCst)
    }

    pub fn max_open_pages(&self) -> usize {
        self.state.max_open_pages.load(Ordering::SeqCst)
    }

    pub fn events(&self) -> Vec<(Instant, Event)> {
        self.state.events.lock().unwrap().clone()
    }

    /// 某事件首次发生的时间
    pub fn time_of(&self, event: &Event) -> Option<Instant> {
        self.events()
            .into_iter()
            .find(|(_, e)| e == event)
            .map(|(at, _)| at)
    }

    /// 某事件在事件序列中的位置
    pub fn position_of(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|(_, e)| e == event)
    }

    pub fn count(&self, predicate: impl Fn(&Event) -> bool) -> usize {
        self.events().iter().filter(|(_, e)| predicate(e)).count()
    }

    /// 模拟最新一代浏览器崩溃
    pub fn disconnect(&self) {
        let mut disconnects = self.state.disconnects.lock().unwrap();
        if let Some(tx) = disconnects.iter_mut().rev().find_map(Option::take) {
            let _ = tx.send(());
        }
    }

    pub fn launcher(&self) -> Arc<dyn BrowserLauncher> {
        Arc::new(self.clone())
    }
}

#[async_trait]
impl BrowserLauncher for FakeEngine {
    async fn launch(&self) -> Result<LaunchedBrowser, EngineError> {
        let generation = self.state.launches.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.state.launch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let failing = self.state.failing_launches.load(Ordering::SeqCst);
        if failing > 0 {
            self.state.failing_launches.store(failing - 1, Ordering::SeqCst);
            return Err(EngineError::Launch("fake launch failure".to_string()));
        }

        let (tx, rx) = oneshot::channel();
        {
            let mut disconnects = self.state.disconnects.lock().unwrap();
            disconnects.resize_with(generation, || None);
            disconnects[generation - 1] = Some(tx);
        }
        self.state.record(Event::Launched(generation));
        let live = self.state.live_browsers.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_live_browsers.fetch_max(live, Ordering::SeqCst);

        Ok(LaunchedBrowser {
            browser: Arc::new(FakeBrowser {
                state: Arc::clone(&self.state),
                generation,
                exited: AtomicBool::new(false),
                closed: watch::channel(false).0,
            }),
            disconnected: rx,
        })
    }
}

struct FakeBrowser {
    state: Arc<EngineState>,
    generation: usize,
    exited: AtomicBool,
    /// 进程退出后，其页面上挂起的操作随之失败
    closed: watch::Sender<bool>,
}

#[async_trait]
impl RenderBrowser for FakeBrowser {
    async fn new_page(&self) -> Result<Box<dyn RenderPage>, EngineError> {
        let open = self.state.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open_pages.fetch_max(open, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            state: Arc::clone(&self.state),
            script: self.state.script(),
            html: Mutex::new(String::new()),
            browser_closed: self.closed.subscribe(),
        }))
    }

    async fn close(&self) -> Result<(), EngineError> {
        let delay = *self.state.close_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.exited.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.state.live_browsers.fetch_sub(1, Ordering::SeqCst);
        self.closed.send_replace(true);
        self.state.record(Event::BrowserClosed(self.generation));
        // 进程退出后事件循环结束，旧代的断开通知随之发出
        let tx = self
            .state
            .disconnects
            .lock()
            .unwrap()
            .get_mut(self.generation - 1)
            .and_then(Option::take);
        if let Some(tx) = tx {
            let _ = tx.send(());
        }
        Ok(())
    }
}

struct FakePage {
    state: Arc<EngineState>,
    script: PageScript,
    html: Mutex<String>,
    browser_closed: watch::Receiver<bool>,
}

impl FakePage {
    fn html(&self) -> String {
        self.html.lock().unwrap().clone()
    }
}

#[async_trait]
impl RenderPage for FakePage {
    async fn load_content(&self, html: &str) -> Result<(), EngineError> {
        *self.html.lock().unwrap() = html.to_string();
        self.state.record(Event::LoadStarted(html.to_string()));
        if self.script.load_hangs {
            let mut closed = self.browser_closed.clone();
            let _ = closed.wait_for(|closed| *closed).await;
            return Err(EngineError::Disconnected);
        }
        tokio::time::sleep(self.script.load_delay).await;
        Ok(())
    }

    async fn has_pagination_engine(&self) -> Result<bool, EngineError> {
        Ok(!matches!(self.script.pagination, Pagination::Absent))
    }

    async fn wait_for_pagination(&self) -> Result<(), EngineError> {
        match self.script.pagination {
            Pagination::Absent => Ok(()),
            Pagination::Completes(after) => {
                tokio::time::sleep(after).await;
                Ok(())
            }
            Pagination::Hangs => std::future::pending().await,
        }
    }

    async fn print_pdf(&self, _options: &PrintOptions) -> Result<Vec<u8>, EngineError> {
        tokio::time::sleep(self.script.print_delay).await;
        self.state.record(Event::Printed(self.html()));
        Ok(FAKE_PDF.to_vec())
    }

    async fn capture_png(&self, _options: &PreviewOptions) -> Result<Vec<u8>, EngineError> {
        tokio::time::sleep(self.script.print_delay).await;
        self.state.record(Event::Printed(self.html()));
        Ok(FAKE_PNG.to_vec())
    }

    async fn close(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

impl Drop for FakePage {
    fn drop(&mut self) {
        self.state.open_pages.fetch_sub(1, Ordering::SeqCst);
        self.state.record(Event::PageClosed(self.html()));
    }
}

/// 测试用配置：关闭转换，临时目录放在 `dir` 下
pub fn test_config(dir: &Path) -> Config {
    Config {
        temp_dir: dir.join("scratch"),
        conversion_enabled: false,
        listen_addr: "127.0.0.1:0".to_string(),
        ..Config::default()
    }
}

pub async fn build_app(config: Config, engine: &FakeEngine) -> App {
    App::with_launcher(config, engine.launcher())
        .await
        .expect("应用初始化失败")
}

/// 让出执行权直到条件成立（配合暂停时钟使用）
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..10_000 {
        if condition() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("等待条件超时");
}

/// 假转换工具的行为
#[cfg(unix)]
#[derive(Debug, Clone, Copy)]
pub enum ToolMode {
    /// 复制输入并追加标记
    Succeeds,
    /// 写错误输出并以 1 退出
    Fails,
    /// 长时间不退出
    Hangs,
}

pub const CONVERTED_MARKER: &[u8] = b"%CMYK";

/// 生成一个 Ghostscript 风格的假转换脚本
#[cfg(unix)]
pub fn fake_conversion_tool(dir: &Path, mode: ToolMode) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let body = match mode {
        ToolMode::Succeeds => "cp \"$input\" \"$out\"\nprintf '%%CMYK' >> \"$out\"\n",
        ToolMode::Fails => "echo 'Unrecoverable error, exit code 1' >&2\nexit 1\n",
        ToolMode::Hangs => "sleep 30\n",
    };
    let script = format!(
        "#!/bin/sh\n\
         if [ \"$1\" = \"--version\" ]; then echo '10.02.1'; exit 0; fi\n\
         out=''\n\
         input=''\n\
         for arg in \"$@\"; do\n\
         case \"$arg\" in -sOutputFile=*) out=\"${{arg#-sOutputFile=}}\" ;; esac\n\
         input=\"$arg\"\n\
         done\n\
         {body}"
    );

    let path = dir.join(format!("fake-gs-{:?}", mode).to_lowercase());
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}
