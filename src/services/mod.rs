//! 业务能力层（Services）
//!
//! 描述"我能做什么"，不关心任务生命周期：
//! - `RateLimiter` - 按域名限速
//! - `error_classifier` / `retry` - 错误分类与带退避的重试
//! - `ArtifactCollector` - 截图、HTML、控制台日志的采集与上传
//! - `field_mapper` - 标签到资料字段的映射和通用控件填写

pub mod artifact_collector;
pub mod error_classifier;
pub mod field_mapper;
pub mod rate_limiter;
pub mod retry;

pub use artifact_collector::ArtifactCollector;
pub use error_classifier::{
    classify, classify_message, detect_blocking_condition, ClassifiedError, ErrorCategory, PageState,
};
pub use field_mapper::FieldMatch;
pub use rate_limiter::{RateLimiter, SlotStatus};
pub use retry::{with_retry, with_retry_sleep, RetryConfig};
