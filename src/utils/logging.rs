/// 日志工具模块
///
/// 提供日志初始化、启动/关闭横幅和文本截断
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::infrastructure::MetricsSnapshot;

/// 初始化全局日志订阅器
///
/// 优先使用 `RUST_LOG`，未设置时按 `verbose` 选择 debug 或 info。
/// 重复调用（例如多个测试）不会报错。
pub fn init(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("{fallback},chromiumoxide=warn,tungstenite=warn"))
    });

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录服务启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 渲染服务启动");
    info!("📊 最大并发任务数: {}", config.max_concurrent_jobs);
    info!(
        "⏱️ 默认时限 {}s / 最大时限 {}s",
        config.default_timeout_secs, config.max_timeout_secs
    );
    info!("♻️ 渲染器重启阈值: {} 页", config.renderer_restart_threshold);
    match config.browser_debug_port {
        Some(port) => info!("🌐 浏览器模式: 连接调试端口 {}", port),
        None => info!("🌐 浏览器模式: 本地无头浏览器"),
    }
    if config.conversion_enabled {
        info!(
            "🎨 CMYK 转换: {} ({})",
            config.conversion_tool, config.compliance_standard
        );
    } else {
        info!("🎨 CMYK 转换: 已关闭");
    }
    info!("📁 临时目录: {}", config.temp_dir.display());
    info!("{}", "=".repeat(60));
}

/// 打印关闭时的统计信息
pub fn log_shutdown(snapshot: &MetricsSnapshot) {
    info!("\n{}", "=".repeat(60));
    info!("📊 服务运行统计");
    info!(
        "关闭时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("启动时间: {}", snapshot.started_at);
    info!("{}", "=".repeat(60));
    info!("📥 请求总数: {}", snapshot.requests_total);
    info!("✅ 成功: {}", snapshot.jobs_succeeded);
    info!(
        "❌ 失败: {} (超时 {}, 拒绝 {})",
        snapshot.jobs_failed, snapshot.jobs_timed_out, snapshot.jobs_rejected
    );
    info!(
        "🎨 转换: 成功 {} / 失败 {} / 跳过 {}",
        snapshot.conversions_succeeded, snapshot.conversions_failed, snapshot.conversions_skipped
    );
    info!(
        "🌐 渲染器: 启动 {} 次 / 计划重启 {} 次 / 断开 {} 次",
        snapshot.renderer_launches, snapshot.renderer_restarts, snapshot.renderer_disconnects
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
