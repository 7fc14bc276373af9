//! 单个任务的渲染流程 - 流程层
//!
//! ## 流程
//!
//! 1. 写入文档（附加样式），等待字体就绪
//! 2. 若文档带分页引擎，等待其完成信号，最多等到截止前 5 秒
//! 3. 输出主产物：文档/封面为 PDF，预览为 PNG
//! 4. 需要时转换为 CMYK；转换失败保留原产物（fail-open）
//!
//! 流程层不持有资源：页面由编排层租借后传入，临时文件由 `ScratchSpace` 管理。

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::browser::{EngineError, RenderPage};
use crate::infrastructure::{MetricsRegistry, ScratchSpace};
use crate::models::{ColorSpace, JobSpec, PaginationStatus, RenderedArtifact};
use crate::services::{ConversionOutcome, ConversionStage};
use crate::workflow::Job;

pub struct RenderFlow {
    conversion: Arc<ConversionStage>,
    scratch: Arc<ScratchSpace>,
    metrics: Arc<MetricsRegistry>,
}

impl RenderFlow {
    pub fn new(
        conversion: Arc<ConversionStage>,
        scratch: Arc<ScratchSpace>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            conversion,
            scratch,
            metrics,
        }
    }

    /// 在已租借的页面上完成渲染，返回未转换的主产物
    pub async fn render(
        &self,
        page: &dyn RenderPage,
        job: &Job,
        spec: &JobSpec,
    ) -> Result<RenderedArtifact, EngineError> {
        debug!("{} 写入文档 ({} 字节)", job, spec.html.len());
        page.load_content(&spec.document_html()).await?;

        if job.kind.is_preview() {
            let bytes = page.capture_png(&spec.params.preview_options()).await?;
            info!("{} 📸 预览截图完成 ({} 字节)", job, bytes.len());
            return Ok(RenderedArtifact::png(bytes));
        }

        let pagination = self.await_pagination(page, job).await?;
        let bytes = page.print_pdf(&spec.params.print_options(job.kind)).await?;
        info!(
            "{} 📄 PDF 生成完成 ({} 字节, 分页: {})",
            job,
            bytes.len(),
            pagination.as_str()
        );
        Ok(RenderedArtifact::pdf(bytes, pagination))
    }

    async fn await_pagination(
        &self,
        page: &dyn RenderPage,
        job: &Job,
    ) -> Result<PaginationStatus, EngineError> {
        if !page.has_pagination_engine().await? {
            return Ok(PaginationStatus::NotUsed);
        }

        debug!("{} 等待分页引擎完成", job);
        match tokio::time::timeout_at(job.pagination_deadline(), page.wait_for_pagination()).await {
            Ok(Ok(())) => Ok(PaginationStatus::Used),
            Ok(Err(e)) if e.is_fatal() => Err(e),
            Ok(Err(e)) => {
                warn!("{} ⚠️ 分页引擎出错，输出当前结果: {}", job, e);
                Ok(PaginationStatus::Incomplete)
            }
            Err(_) => {
                warn!("{} ⚠️ 分页引擎未在截止前完成，输出当前结果", job);
                Ok(PaginationStatus::Incomplete)
            }
        }
    }

    /// 颜色转换（fail-open）
    ///
    /// 不论成功与否，两个临时文件都在函数返回前删除。
    pub async fn convert_colors(&self, job: &Job, artifact: RenderedArtifact) -> RenderedArtifact {
        if !job.wants_conversion() {
            return artifact;
        }
        if !self.conversion.is_available() {
            debug!("{} 转换工具不可用，跳过 CMYK 转换", job);
            self.metrics.record_conversion_skipped();
            return artifact;
        }

        let source = self.scratch.file(&job.id, "source", "pdf");
        let target = self.scratch.file(&job.id, "converted", "pdf");

        if let Err(e) = tokio::fs::write(source.path(), &artifact.bytes).await {
            warn!("{} ⚠️ 写入临时文件失败，保留 RGB 产物: {}", job, e);
            self.metrics.record_conversion(false);
            return artifact;
        }

        let mut options = self.conversion.default_options(job.dpi);
        options.timeout = options.timeout.min(job.remaining());

        let outcome = self
            .conversion
            .run(source.path(), target.path(), &options)
            .await;

        match outcome {
            ConversionOutcome::Converted(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => {
                    info!(
                        "{} 🎨 CMYK 转换完成 ({} → {} 字节)",
                        job,
                        artifact.bytes.len(),
                        bytes.len()
                    );
                    self.metrics.record_conversion(true);
                    RenderedArtifact {
                        bytes,
                        color_space: ColorSpace::Cmyk,
                        converted: true,
                        ..artifact
                    }
                }
                Err(e) => {
                    warn!("{} ⚠️ 读取转换结果失败，保留 RGB 产物: {}", job, e);
                    self.metrics.record_conversion(false);
                    artifact
                }
            },
            ConversionOutcome::Failed(e) => {
                warn!("{} ⚠️ CMYK 转换失败，保留 RGB 产物: {}", job, e);
                self.metrics.record_conversion(false);
                artifact
            }
        }
    }
}
