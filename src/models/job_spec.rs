//! 渲染任务描述
//!
//! `JobSpec` 是调用方提交给编排器的全部输入：任务类型、HTML 文档、
//! 渲染参数、时限以及是否需要颜色转换。

use crate::models::units::Length;
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::fmt;

/// 分辨率允许范围（DPI）
pub const DPI_RANGE: std::ops::RangeInclusive<u32> = 72..=1200;

/// 预览视口允许的最大边长（像素）
pub const MAX_VIEWPORT_EDGE: u32 = 10_000;

/// 任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobKind {
    /// 正文文档
    Document,
    /// 封面
    Cover,
    /// 低保真预览图
    Preview,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::Document => "document",
            JobKind::Cover => "cover",
            JobKind::Preview => "preview",
        }
    }

    /// 获取中文名称（日志用）
    pub fn label(self) -> &'static str {
        match self {
            JobKind::Document => "文档",
            JobKind::Cover => "封面",
            JobKind::Preview => "预览",
        }
    }

    /// 预览不经过分页和颜色转换
    pub fn is_preview(self) -> bool {
        matches!(self, JobKind::Preview)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 封面尺寸：单面宽高 + 书脊宽度
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoverDimensions {
    pub width: Length,
    pub height: Length,
    #[serde(default)]
    pub spine: Length,
}

/// 预览视口（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        // A4 @ 150 DPI
        Self {
            width: 1240,
            height: 1754,
        }
    }
}

/// 渲染参数
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RenderParams {
    pub page_width: Length,
    pub page_height: Length,
    pub bleed: Length,
    pub dpi: u32,
    pub cover: Option<CoverDimensions>,
    pub viewport: Option<Viewport>,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            page_width: Length::from_mm(210.0),
            page_height: Length::from_mm(297.0),
            bleed: Length::ZERO,
            dpi: 300,
            cover: None,
            viewport: None,
        }
    }
}

/// 打印为 PDF 时的纸张参数（英寸）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrintOptions {
    pub paper_width_in: f64,
    pub paper_height_in: f64,
}

/// 截图预览参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreviewOptions {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
}

impl RenderParams {
    /// 计算含出血的纸张尺寸
    ///
    /// 封面纸张宽度 = 封底 + 书脊 + 封面，四周各加出血。
    pub fn print_options(&self, kind: JobKind) -> PrintOptions {
        let (width, height) = match (kind, self.cover) {
            (JobKind::Cover, Some(cover)) => (cover.width * 2.0 + cover.spine, cover.height),
            _ => (self.page_width, self.page_height),
        };
        let bleed = self.bleed * 2.0;

        PrintOptions {
            paper_width_in: (width + bleed).inches(),
            paper_height_in: (height + bleed).inches(),
        }
    }

    pub fn preview_options(&self) -> PreviewOptions {
        let viewport = self.viewport.unwrap_or_default();
        PreviewOptions {
            width: viewport.width,
            height: viewport.height,
            device_scale_factor: 1.0,
        }
    }
}

/// 渲染任务描述
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSpec {
    pub kind: JobKind,
    pub html: String,
    #[serde(default)]
    pub css: Option<String>,
    #[serde(default)]
    pub params: RenderParams,
    /// 任务时限（毫秒），为空时使用默认值
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// 是否转换为印刷色彩空间
    #[serde(default)]
    pub convert: bool,
}

impl JobSpec {
    pub fn new(kind: JobKind, html: impl Into<String>) -> Self {
        Self {
            kind,
            html: html.into(),
            css: None,
            params: RenderParams::default(),
            timeout_ms: None,
            convert: false,
        }
    }

    pub fn with_css(mut self, css: impl Into<String>) -> Self {
        self.css = Some(css.into());
        self
    }

    pub fn with_params(mut self, params: RenderParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_conversion(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    /// 校验各类型任务的必填字段
    ///
    /// 在获取任何资源之前调用，失败时返回原因描述。
    pub fn validate(&self) -> Result<(), String> {
        if self.html.trim().is_empty() {
            return Err("HTML 文档内容不能为空".to_string());
        }

        if self.timeout_ms == Some(0) {
            return Err("timeoutMs 必须大于 0".to_string());
        }

        if !DPI_RANGE.contains(&self.params.dpi) {
            return Err(format!(
                "分辨率 {} DPI 超出范围 [{}, {}]",
                self.params.dpi,
                DPI_RANGE.start(),
                DPI_RANGE.end()
            ));
        }

        match self.kind {
            JobKind::Document => {
                if self.params.page_width.is_zero() || self.params.page_height.is_zero() {
                    return Err("页面宽高必须大于 0".to_string());
                }
            }
            JobKind::Cover => {
                let cover = self
                    .params
                    .cover
                    .ok_or_else(|| "封面任务缺少 cover 尺寸".to_string())?;
                if cover.width.is_zero() || cover.height.is_zero() {
                    return Err("封面宽高必须大于 0".to_string());
                }
            }
            JobKind::Preview => {
                if let Some(viewport) = self.params.viewport {
                    let valid = 1..=MAX_VIEWPORT_EDGE;
                    if !valid.contains(&viewport.width) || !valid.contains(&viewport.height) {
                        return Err(format!(
                            "预览视口 {}x{} 超出范围 [1, {}]",
                            viewport.width, viewport.height, MAX_VIEWPORT_EDGE
                        ));
                    }
                }
            }
        }

        Ok(())
    }

    /// 生成交给渲染器的最终 HTML（附加样式表注入到 `</head>` 之前）
    pub fn document_html(&self) -> Cow<'_, str> {
        let Some(css) = self.css.as_deref().filter(|css| !css.trim().is_empty()) else {
            return Cow::Borrowed(&self.html);
        };

        let style = format!("<style>{}</style>", css);
        match self.html.to_ascii_lowercase().find("</head>") {
            Some(pos) => {
                let mut html = String::with_capacity(self.html.len() + style.len());
                html.push_str(&self.html[..pos]);
                html.push_str(&style);
                html.push_str(&self.html[pos..]);
                Cow::Owned(html)
            }
            None => Cow::Owned(format!("{}{}", style, self.html)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cover_params() -> RenderParams {
        RenderParams {
            cover: Some(CoverDimensions {
                width: Length::from_mm(150.0),
                height: Length::from_mm(230.0),
                spine: Length::from_mm(12.0),
            }),
            bleed: Length::from_mm(3.0),
            ..RenderParams::default()
        }
    }

    #[test]
    fn test_validate_rejects_empty_document() {
        let spec = JobSpec::new(JobKind::Document, "   ");
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_validate_cover_requires_dimensions() {
        let spec = JobSpec::new(JobKind::Cover, "<p>cover</p>");
        assert!(spec.validate().unwrap_err().contains("cover"));

        let spec = spec.with_params(cover_params());
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_validate_dpi_and_timeout() {
        let mut spec = JobSpec::new(JobKind::Document, "<p>x</p>");
        spec.params.dpi = 30;
        assert!(spec.validate().is_err());

        spec.params.dpi = 300;
        assert!(spec.clone().with_timeout_ms(0).validate().is_err());
        assert!(spec.with_timeout_ms(1_000).validate().is_ok());
    }

    #[test]
    fn test_validate_preview_viewport() {
        let mut spec = JobSpec::new(JobKind::Preview, "<p>x</p>");
        spec.params.viewport = Some(Viewport {
            width: 0,
            height: 100,
        });
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_cover_paper_includes_spine_and_bleed() {
        let options = cover_params().print_options(JobKind::Cover);
        // 150 * 2 + 12 + 3 * 2 = 318mm
        assert!((options.paper_width_in - 318.0 / 25.4).abs() < 1e-9);
        // 230 + 3 * 2 = 236mm
        assert!((options.paper_height_in - 236.0 / 25.4).abs() < 1e-9);
    }

    #[test]
    fn test_css_injected_before_head_close() {
        let spec = JobSpec::new(
            JobKind::Document,
            "<html><HEAD><title>t</title></HEAD><body></body></html>",
        )
        .with_css("body{margin:0}");

        let html = spec.document_html();
        assert!(html.contains("<style>body{margin:0}</style></HEAD>"));
    }

    #[test]
    fn test_css_prepended_without_head() {
        let spec = JobSpec::new(JobKind::Document, "<p>x</p>").with_css("p{}");
        assert_eq!(spec.document_html(), "<style>p{}</style><p>x</p>");
    }

    #[test]
    fn test_deserialize_spec() {
        let spec: JobSpec = serde_json::from_str(
            r#"{
                "kind": "cover",
                "html": "<p>c</p>",
                "params": { "cover": { "width": "15cm", "height": "23cm" }, "bleed": "3mm" },
                "timeoutMs": 5000,
                "convert": true
            }"#,
        )
        .unwrap();

        assert_eq!(spec.kind, JobKind::Cover);
        assert_eq!(spec.params.dpi, 300);
        assert!(spec.convert);
        assert!(spec.validate().is_ok());
    }
}
