use std::path::PathBuf;

use chromiumoxide::{Browser, BrowserConfig, Handler};
use tracing::{debug, error, info};

use crate::browser::engine::EngineError;

/// 无头浏览器启动参数
#[derive(Debug, Clone, Default)]
pub struct HeadlessSettings {
    /// 浏览器可执行文件路径，为空时自动查找
    pub executable: Option<PathBuf>,
    /// 额外的命令行参数
    pub extra_args: Vec<String>,
}

/// 启动一个本地无头浏览器进程
pub async fn launch_headless_browser(
    settings: &HeadlessSettings,
) -> Result<(Browser, Handler), EngineError> {
    info!("🚀 启动无头浏览器...");

    let mut args = vec![
        "--disable-gpu".to_string(),           // 无头模式下禁用 GPU
        "--no-sandbox".to_string(),            // 容器内没有沙盒权限
        "--disable-dev-shm-usage".to_string(), // 防止共享内存不足
        "--font-render-hinting=none".to_string(),
    ];
    args.extend(settings.extra_args.iter().cloned());

    let mut builder = BrowserConfig::builder().new_headless_mode().args(args);
    if let Some(executable) = &settings.executable {
        debug!("浏览器路径: {}", executable.display());
        builder = builder.chrome_executable(executable);
    }

    let config = builder.build().map_err(|e| {
        error!("配置无头浏览器失败: {}", e);
        EngineError::Launch(format!("配置无头浏览器失败: {}", e))
    })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动无头浏览器失败: {}", e);
        EngineError::Launch(e.to_string())
    })?;

    info!("✅ 无头浏览器启动成功");
    Ok((browser, handler))
}
