use serde::Serialize;
use std::time::Duration;

use crate::workflow::JobId;

/// 产物的色彩空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColorSpace {
    Rgb,
    Cmyk,
}

impl ColorSpace {
    pub fn as_str(self) -> &'static str {
        match self {
            ColorSpace::Rgb => "RGB",
            ColorSpace::Cmyk => "CMYK",
        }
    }
}

/// 分页引擎的使用情况
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PaginationStatus {
    /// 文档使用了分页引擎且按时完成
    Used,
    /// 文档未包含分页引擎
    NotUsed,
    /// 分页引擎未能在截止前完成，产物为尽力而为的结果
    Incomplete,
    /// 预览任务不分页
    Skipped,
}

impl PaginationStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            PaginationStatus::Used => "used",
            PaginationStatus::NotUsed => "not-used",
            PaginationStatus::Incomplete => "incomplete",
            PaginationStatus::Skipped => "skipped",
        }
    }
}

/// 渲染流程中间产物
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    pub bytes: Vec<u8>,
    pub content_type: &'static str,
    pub color_space: ColorSpace,
    pub pagination: PaginationStatus,
    pub converted: bool,
}

impl RenderedArtifact {
    pub fn pdf(bytes: Vec<u8>, pagination: PaginationStatus) -> Self {
        Self {
            bytes,
            content_type: "application/pdf",
            color_space: ColorSpace::Rgb,
            pagination,
            converted: false,
        }
    }

    pub fn png(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            content_type: "image/png",
            color_space: ColorSpace::Rgb,
            pagination: PaginationStatus::Skipped,
            converted: false,
        }
    }
}

/// 任务成功后返回给调用方的结果
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    pub job_id: JobId,
    pub artifact: RenderedArtifact,
    pub elapsed: Duration,
}

impl RenderOutcome {
    pub fn bytes(&self) -> &[u8] {
        &self.artifact.bytes
    }

    pub fn color_space(&self) -> ColorSpace {
        self.artifact.color_space
    }

    pub fn pagination(&self) -> PaginationStatus {
        self.artifact.pagination
    }

    pub fn converted(&self) -> bool {
        self.artifact.converted
    }
}
