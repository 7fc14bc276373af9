use chromiumoxide::{Browser, Handler};
use tracing::{debug, error, info};

use crate::browser::engine::EngineError;

/// 连接到已在运行的浏览器（远程调试端口）
///
/// 浏览器进程由外部管理，本服务只持有连接。
pub async fn connect_to_browser(port: u16) -> Result<(Browser, Handler), EngineError> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        EngineError::Launch(format!("无法连接到浏览器 (端口: {}): {}", port, e))
    })?;
    debug!("浏览器连接成功");

    Ok((browser, handler))
}
