//! 颜色转换阶段 - 业务能力层
//!
//! 调用外部工具（Ghostscript 兼容命令行）把 RGB PDF 转为 CMYK 印刷 PDF。
//!
//! - 启动时用 `<tool> --version` 探测一次可用性并缓存
//! - 不可用时直接返回 `Unavailable`，不再启动子进程
//! - 子进程有独立时限，超时即被杀掉（`kill_on_drop`）
//! - 转换失败不是致命错误，由调用方决定回退

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::utils::logging::truncate_text;

/// 可用性探测的时限
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// 错误输出在日志和错误信息中保留的最大字符数
const STDERR_LIMIT: usize = 500;

/// 印刷合规标准
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ComplianceStandard {
    #[serde(rename = "PDF/X-3")]
    PdfX3,
    #[serde(rename = "PDF/A-2b")]
    PdfA2b,
    #[serde(rename = "none")]
    None,
}

impl ComplianceStandard {
    pub fn as_str(self) -> &'static str {
        match self {
            ComplianceStandard::PdfX3 => "PDF/X-3",
            ComplianceStandard::PdfA2b => "PDF/A-2b",
            ComplianceStandard::None => "none",
        }
    }

    fn tool_flags(self) -> &'static [&'static str] {
        match self {
            ComplianceStandard::PdfX3 => &["-dPDFX"],
            ComplianceStandard::PdfA2b => &["-dPDFA=2", "-dPDFACompatibilityPolicy=1"],
            ComplianceStandard::None => &[],
        }
    }
}

impl FromStr for ComplianceStandard {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "PDF/X-3" | "PDFX3" | "PDF/X-3:2003" => Ok(ComplianceStandard::PdfX3),
            "PDF/A-2B" | "PDFA2B" => Ok(ComplianceStandard::PdfA2b),
            "NONE" | "" => Ok(ComplianceStandard::None),
            other => Err(format!("不支持的合规标准: {}", other)),
        }
    }
}

/// 转换阶段的静态配置
#[derive(Debug, Clone)]
pub struct ConversionSettings {
    pub tool: String,
    pub timeout: Duration,
    pub compliance: ComplianceStandard,
    pub icc_profile: Option<PathBuf>,
}

/// 单次转换参数
#[derive(Debug, Clone)]
pub struct ConversionOptions {
    pub compliance: ComplianceStandard,
    pub timeout: Duration,
    pub icc_profile: Option<PathBuf>,
    pub dpi: u32,
}

#[derive(Debug, Error)]
pub enum ConversionError {
    #[error("转换工具不可用")]
    Unavailable,
    #[error("无法启动转换工具: {0}")]
    Spawn(String),
    #[error("转换超时 ({}s)", .0.as_secs())]
    TimedOut(Duration),
    #[error("转换工具异常退出 (退出码: {exit_code:?}): {stderr}")]
    Exit {
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("转换工具未生成输出文件")]
    MissingOutput,
}

/// 转换结果：成功产物或失败原因，永远不是致命错误
#[derive(Debug)]
pub enum ConversionOutcome {
    Converted(PathBuf),
    Failed(ConversionError),
}

/// 转换能力状态（`/health` 输出）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversionStatus {
    pub enabled: bool,
    pub available: bool,
    pub tool: String,
    pub version: Option<String>,
    pub compliance: ComplianceStandard,
}

pub struct ConversionStage {
    settings: ConversionSettings,
    enabled: bool,
    version: Option<String>,
}

impl ConversionStage {
    /// 探测转换工具并缓存结果
    pub async fn probe(settings: ConversionSettings) -> Self {
        let version = probe_version(&settings.tool).await;
        match &version {
            Some(v) => info!("✓ 转换工具可用: {} {}", settings.tool, v),
            None => warn!("⚠️ 转换工具 {} 不可用，CMYK 转换将被跳过", settings.tool),
        }
        Self {
            settings,
            enabled: true,
            version,
        }
    }

    /// 配置中关闭了转换
    pub fn disabled(settings: ConversionSettings) -> Self {
        info!("颜色转换已在配置中关闭");
        Self {
            settings,
            enabled: false,
            version: None,
        }
    }

    pub fn is_available(&self) -> bool {
        self.enabled && self.version.is_some()
    }

    pub fn status(&self) -> ConversionStatus {
        ConversionStatus {
            enabled: self.enabled,
            available: self.is_available(),
            tool: self.settings.tool.clone(),
            version: self.version.clone(),
            compliance: self.settings.compliance,
        }
    }

    /// 基于配置生成单次转换参数
    pub fn default_options(&self, dpi: u32) -> ConversionOptions {
        ConversionOptions {
            compliance: self.settings.compliance,
            timeout: self.settings.timeout,
            icc_profile: self.settings.icc_profile.clone(),
            dpi,
        }
    }

    /// 执行转换，失败以 `ConversionOutcome::Failed` 返回
    pub async fn run(&self, input: &Path, output: &Path, options: &ConversionOptions) -> ConversionOutcome {
        match self.convert(input, output, options).await {
            Ok(path) => ConversionOutcome::Converted(path),
            Err(e) => ConversionOutcome::Failed(e),
        }
    }

    pub async fn convert(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
    ) -> Result<PathBuf, ConversionError> {
        if !self.is_available() {
            return Err(ConversionError::Unavailable);
        }

        let args = build_args(input, output, options);
        debug!("执行转换: {} {}", self.settings.tool, args.join(" "));

        let started = Instant::now();
        let child = Command::new(&self.settings.tool)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ConversionError::Spawn(e.to_string()))?;

        // 超时后 future 被丢弃，子进程随之被杀掉
        let result = tokio::time::timeout(options.timeout, child.wait_with_output())
            .await
            .map_err(|_| ConversionError::TimedOut(options.timeout))?
            .map_err(|e| ConversionError::Spawn(e.to_string()))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(ConversionError::Exit {
                exit_code: result.status.code(),
                stderr: truncate_text(stderr.trim(), STDERR_LIMIT),
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => {
                debug!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "转换完成: {}",
                    output.display()
                );
                Ok(output.to_path_buf())
            }
            _ => Err(ConversionError::MissingOutput),
        }
    }
}

async fn probe_version(tool: &str) -> Option<String> {
    let child = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .ok()?;

    let output = tokio::time::timeout(PROBE_TIMEOUT, child.wait_with_output())
        .await
        .ok()?
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
    Some(if version.is_empty() {
        "unknown".to_string()
    } else {
        version
    })
}

/// 生成转换工具的命令行参数
fn build_args(input: &Path, output: &Path, options: &ConversionOptions) -> Vec<String> {
    let mut args: Vec<String> = [
        "-dSAFER",
        "-dBATCH",
        "-dNOPAUSE",
        "-dQUIET",
        "-sDEVICE=pdfwrite",
        "-sColorConversionStrategy=CMYK",
        "-sProcessColorModel=DeviceCMYK",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();

    args.extend(options.compliance.tool_flags().iter().map(|s| s.to_string()));
    if let Some(profile) = &options.icc_profile {
        args.push(format!("-sOutputICCProfile={}", profile.display()));
    }
    args.push(format!("-r{}", options.dpi));
    args.push(format!("-sOutputFile={}", output.display()));
    args.push(input.display().to_string());
    args
}
