use thiserror::Error;

use crate::workflow::JobId;

/// 任务失败原因，所有变体都携带任务 ID
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    /// 调用方提交的任务描述不合法
    #[error("[任务 {job_id}] 请求参数无效: {reason}")]
    InvalidSpec { job_id: JobId, reason: String },

    /// 渲染器无法提供页面（启动失败、正在关闭）
    #[error("[任务 {job_id}] 渲染器不可用: {reason}")]
    RendererUnavailable { job_id: JobId, reason: String },

    /// 任务超出截止时间（排队、启动、加载或输出阶段）
    #[error("[任务 {job_id}] 渲染超时 ({timeout_secs}s)")]
    RenderTimeout { job_id: JobId, timeout_secs: u64 },

    /// 其他渲染器错误
    #[error("[任务 {job_id}] 渲染失败: {message}")]
    RenderFailure { job_id: JobId, message: String },
}

impl RenderError {
    pub fn job_id(&self) -> JobId {
        match self {
            RenderError::InvalidSpec { job_id, .. }
            | RenderError::RendererUnavailable { job_id, .. }
            | RenderError::RenderTimeout { job_id, .. }
            | RenderError::RenderFailure { job_id, .. } => *job_id,
        }
    }

    /// 对外错误码
    pub fn code(&self) -> &'static str {
        match self {
            RenderError::InvalidSpec { .. } => "INVALID_REQUEST",
            RenderError::RenderTimeout { .. } => "TIMEOUT",
            RenderError::RendererUnavailable { .. } | RenderError::RenderFailure { .. } => {
                "GENERATION_ERROR"
            }
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, RenderError::RenderTimeout { .. })
    }
}

/// 内部故障：进程状态不再可信，需要终止进程由外部重启
#[derive(Debug, Clone, Error)]
pub enum InternalFault {
    #[error("[任务 {job_id}] 任务执行异常终止: {message}")]
    JobPanicked { job_id: JobId, message: String },

    #[error("[任务 {job_id}] 渲染器协议异常: {message}")]
    RendererProtocol { job_id: JobId, message: String },
}

/// 配置错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
    #[error("配置项 {field} 无效: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_job_id() {
        let job_id = JobId::new();
        let timeout = RenderError::RenderTimeout {
            job_id,
            timeout_secs: 30,
        };
        assert_eq!(timeout.code(), "TIMEOUT");
        assert!(timeout.is_timeout());
        assert_eq!(timeout.job_id(), job_id);

        let unavailable = RenderError::RendererUnavailable {
            job_id,
            reason: "closed".into(),
        };
        assert_eq!(unavailable.code(), "GENERATION_ERROR");
        assert!(unavailable.to_string().contains(&job_id.to_string()));
    }
}
