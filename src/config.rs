use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::browser::{ChromiumLauncher, HeadlessSettings};
use crate::error::ConfigError;
use crate::orchestrator::JobLimits;
use crate::services::{ComplianceStandard, ConversionSettings};

/// 配置文件路径的环境变量
pub const CONFIG_FILE_ENV: &str = "RENDER_CONFIG_FILE";

/// 服务配置
///
/// 加载顺序：默认值 → TOML 配置文件（可选）→ 环境变量。
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 同时执行的渲染任务数量
    pub max_concurrent_jobs: usize,
    /// 未指定时限时的默认时限（秒）
    pub default_timeout_secs: u64,
    /// 允许的最大时限（秒）
    pub max_timeout_secs: u64,
    /// 渲染器服务多少个页面后计划重启
    pub renderer_restart_threshold: u64,
    /// 是否启用 CMYK 转换
    pub conversion_enabled: bool,
    /// 转换工具命令
    pub conversion_tool: String,
    /// 转换工具时限（秒）
    pub conversion_timeout_secs: u64,
    /// 合规标准标识
    pub compliance_standard: String,
    /// 输出 ICC 配置文件
    pub output_icc_profile: Option<PathBuf>,
    /// 临时文件目录
    pub temp_dir: PathBuf,
    /// 浏览器可执行文件（为空时自动查找）
    pub chrome_executable: Option<PathBuf>,
    /// 浏览器调试端口；设置后连接已有浏览器而不是自行启动
    pub browser_debug_port: Option<u16>,
    /// HTTP 监听地址
    pub listen_addr: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 3,
            default_timeout_secs: 60,
            max_timeout_secs: 300,
            renderer_restart_threshold: 200,
            conversion_enabled: true,
            conversion_tool: "gs".to_string(),
            conversion_timeout_secs: 120,
            compliance_standard: "PDF/X-3".to_string(),
            output_icc_profile: None,
            temp_dir: std::env::temp_dir().join("print-render"),
            chrome_executable: None,
            browser_debug_port: None,
            listen_addr: "0.0.0.0:3000".to_string(),
            verbose_logging: false,
        }
    }
}

fn parsed<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var_name: &str,
    expected_type: &str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var_name) {
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: expected_type.to_string(),
            }),
        None => Ok(None),
    }
}

impl Config {
    /// 只从环境变量加载（未设置的使用默认值）
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().overlay(|name| std::env::var(name).ok())
    }

    /// 完整加载：默认值 → `RENDER_CONFIG_FILE` 指向的 TOML → 环境变量
    pub fn load() -> Result<Self> {
        let base = match std::env::var(CONFIG_FILE_ENV) {
            Ok(path) => Self::from_toml_file(&path)?,
            Err(_) => Self::default(),
        };
        let config = base.overlay(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    pub fn from_toml_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取配置文件失败: {}", path))?;
        Self::from_toml_str(&content).with_context(|| format!("解析配置文件失败: {}", path))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 用查找函数提供的值覆盖当前配置
    pub fn overlay(self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let lookup = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let path = |name: &str| lookup(name).map(PathBuf::from);

        Ok(Self {
            max_concurrent_jobs: parsed(&lookup, "MAX_CONCURRENT_JOBS", "正整数")?
                .unwrap_or(self.max_concurrent_jobs),
            default_timeout_secs: parsed(&lookup, "DEFAULT_TIMEOUT_SECS", "秒数")?
                .unwrap_or(self.default_timeout_secs),
            max_timeout_secs: parsed(&lookup, "MAX_TIMEOUT_SECS", "秒数")?
                .unwrap_or(self.max_timeout_secs),
            renderer_restart_threshold: parsed(&lookup, "RENDERER_RESTART_THRESHOLD", "正整数")?
                .unwrap_or(self.renderer_restart_threshold),
            conversion_enabled: parsed(&lookup, "CONVERSION_ENABLED", "布尔值")?
                .unwrap_or(self.conversion_enabled),
            conversion_tool: lookup("CONVERSION_TOOL").unwrap_or(self.conversion_tool),
            conversion_timeout_secs: parsed(&lookup, "CONVERSION_TIMEOUT_SECS", "秒数")?
                .unwrap_or(self.conversion_timeout_secs),
            compliance_standard: lookup("COMPLIANCE_STANDARD").unwrap_or(self.compliance_standard),
            output_icc_profile: path("OUTPUT_ICC_PROFILE").or(self.output_icc_profile),
            temp_dir: path("TEMP_DIR").unwrap_or(self.temp_dir),
            chrome_executable: path("CHROME_EXECUTABLE").or(self.chrome_executable),
            browser_debug_port: parsed(&lookup, "BROWSER_DEBUG_PORT", "端口号")?
                .or(self.browser_debug_port),
            listen_addr: lookup("LISTEN_ADDR").unwrap_or(self.listen_addr),
            verbose_logging: parsed(&lookup, "VERBOSE_LOGGING", "布尔值")?
                .unwrap_or(self.verbose_logging),
        })
    }

    /// 检查配置的合理性
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_jobs == 0 {
            return Err(ConfigError::Invalid {
                field: "max_concurrent_jobs",
                reason: "至少为 1".to_string(),
            });
        }
        if self.default_timeout_secs == 0 || self.max_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_timeout_secs",
                reason: "时限必须大于 0".to_string(),
            });
        }
        if self.default_timeout_secs > self.max_timeout_secs {
            return Err(ConfigError::Invalid {
                field: "default_timeout_secs",
                reason: format!(
                    "默认时限 {}s 超过最大时限 {}s",
                    self.default_timeout_secs, self.max_timeout_secs
                ),
            });
        }
        if self.renderer_restart_threshold == 0 {
            return Err(ConfigError::Invalid {
                field: "renderer_restart_threshold",
                reason: "至少为 1".to_string(),
            });
        }
        if self.conversion_timeout_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "conversion_timeout_secs",
                reason: "时限必须大于 0".to_string(),
            });
        }
        self.compliance()?;
        Ok(())
    }

    pub fn compliance(&self) -> Result<ComplianceStandard, ConfigError> {
        self.compliance_standard
            .parse()
            .map_err(|reason| ConfigError::Invalid {
                field: "compliance_standard",
                reason,
            })
    }

    pub fn job_limits(&self) -> JobLimits {
        JobLimits {
            default_timeout: Duration::from_secs(self.default_timeout_secs),
            max_timeout: Duration::from_secs(self.max_timeout_secs),
        }
    }

    pub fn conversion_settings(&self) -> Result<ConversionSettings, ConfigError> {
        Ok(ConversionSettings {
            tool: self.conversion_tool.clone(),
            timeout: Duration::from_secs(self.conversion_timeout_secs),
            compliance: self.compliance()?,
            icc_profile: self.output_icc_profile.clone(),
        })
    }

    /// 根据配置选择浏览器获取方式
    pub fn launcher(&self) -> ChromiumLauncher {
        match self.browser_debug_port {
            Some(port) => ChromiumLauncher::Connect { port },
            None => ChromiumLauncher::Headless(HeadlessSettings {
                executable: self.chrome_executable.clone(),
                ..HeadlessSettings::default()
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn overlay(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::default().overlay(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert_eq!(config.max_concurrent_jobs, 3);
        assert_eq!(config.renderer_restart_threshold, 200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_env_overrides() {
        let config = overlay(&[
            ("MAX_CONCURRENT_JOBS", "5"),
            ("CONVERSION_ENABLED", "false"),
            ("BROWSER_DEBUG_PORT", "9222"),
            ("TEMP_DIR", "/var/tmp/render"),
            ("LISTEN_ADDR", ""),
        ])
        .unwrap();

        assert_eq!(config.max_concurrent_jobs, 5);
        assert!(!config.conversion_enabled);
        assert_eq!(config.browser_debug_port, Some(9222));
        assert_eq!(config.temp_dir, PathBuf::from("/var/tmp/render"));
        assert_eq!(config.listen_addr, "0.0.0.0:3000");
        assert!(matches!(config.launcher(), ChromiumLauncher::Connect { port: 9222 }));
    }

    #[test]
    fn test_bad_env_value_is_reported() {
        let err = overlay(&[("MAX_CONCURRENT_JOBS", "many")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::EnvVarParseFailed { ref var_name, .. } if var_name == "MAX_CONCURRENT_JOBS"
        ));
    }

    #[test]
    fn test_validate_rejects_inverted_timeouts() {
        let config = Config {
            default_timeout_secs: 600,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            compliance_standard: "PDF/Z".to_string(),
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_toml_file_with_env_on_top() {
        let config = Config::from_toml_str(
            r#"
            max_concurrent_jobs = 8
            conversion_tool = "gswin64c"
            "#,
        )
        .unwrap()
        .overlay(|name| (name == "MAX_CONCURRENT_JOBS").then(|| "2".to_string()))
        .unwrap();

        assert_eq!(config.max_concurrent_jobs, 2);
        assert_eq!(config.conversion_tool, "gswin64c");
        assert_eq!(config.default_timeout_secs, 60);
    }
}
