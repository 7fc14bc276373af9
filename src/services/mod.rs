//! 业务能力层（Services Layer）
//!
//! 描述"我能做什么"，不关心任务调度。

pub mod conversion;

pub use conversion::{
    ComplianceStandard, ConversionError, ConversionOptions, ConversionOutcome, ConversionSettings,
    ConversionStage, ConversionStatus,
};
