use std::fmt;

use thiserror::Error;

/// 应用程序错误类型
#[derive(Debug, Error)]
pub enum AppError {
    /// 浏览器相关错误（CDP 调用失败、页面已关闭等）
    #[error("浏览器错误: {0}")]
    Browser(String),

    /// 显式超时信号（导航、等待元素、CDP 请求）
    #[error("操作超时: {0}")]
    Timeout(String),

    /// 选择器没有命中任何元素
    #[error("元素未找到: {selector}")]
    ElementNotFound { selector: String },

    /// 网络错误
    #[error("网络错误: {0}")]
    Network(String),

    /// 存储层错误（数据库 / 文件存储）
    #[error("存储错误: {0}")]
    Storage(String),

    /// 依赖记录不存在
    #[error("记录不存在: {kind} {id}")]
    NotFound { kind: RecordKind, id: String },

    /// 浏览器上下文已达并发上限
    #[error("浏览器并发已满 (上限 {limit})")]
    BrowserBusy { limit: usize },

    /// 配置错误
    #[error("配置错误: 环境变量 {var} 的值 '{value}' 无效")]
    Config { var: String, value: String },

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON解析失败: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML解析失败: {0}")]
    Toml(#[from] toml::de::Error),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}

/// 依赖记录类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Task,
    JobTarget,
    Resume,
    Profile,
    File,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordKind::Task => "task",
            RecordKind::JobTarget => "job_target",
            RecordKind::Resume => "resume",
            RecordKind::Profile => "profile",
            RecordKind::File => "file",
        };
        f.write_str(name)
    }
}

// ========== 从常见错误类型转换 ==========

impl From<chromiumoxide::error::CdpError> for AppError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        match err {
            chromiumoxide::error::CdpError::Timeout => AppError::Timeout("CDP 请求超时".to_string()),
            other => AppError::Browser(other.to_string()),
        }
    }
}

impl From<tokio::time::error::Elapsed> for AppError {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        AppError::Timeout(err.to_string())
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建元素未找到错误
    pub fn element_not_found(selector: impl Into<String>) -> Self {
        AppError::ElementNotFound {
            selector: selector.into(),
        }
    }

    /// 创建记录不存在错误
    pub fn not_found(kind: RecordKind, id: impl Into<String>) -> Self {
        AppError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// 创建其他错误
    pub fn other(msg: impl Into<String>) -> Self {
        AppError::Other(msg.into())
    }

    /// 是否为显式超时信号
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout(_))
    }
}

/// 持久化到任务记录上的错误码
pub mod codes {
    pub const JOB_NOT_FOUND: &str = "JOB_NOT_FOUND";
    pub const RESUME_NOT_FOUND: &str = "RESUME_NOT_FOUND";
    pub const PROFILE_NOT_FOUND: &str = "PROFILE_NOT_FOUND";
    pub const UNEXPECTED_ERROR: &str = "UNEXPECTED_ERROR";
    pub const UNSUPPORTED_ATS: &str = "UNSUPPORTED_ATS";
    pub const FORM_NOT_FOUND: &str = "FORM_NOT_FOUND";
    pub const SUBMIT_FAILED: &str = "SUBMIT_FAILED";
    pub const VALIDATION_ERROR: &str = "VALIDATION_ERROR";
    pub const ALREADY_APPLIED: &str = "ALREADY_APPLIED";
    pub const CAPTCHA_DETECTED: &str = "CAPTCHA_DETECTED";
    pub const ADAPTER_ERROR: &str = "ADAPTER_ERROR";
    pub const RATE_LIMITED: &str = "RATE_LIMITED";
    pub const ACCESS_DENIED: &str = "ACCESS_DENIED";
    pub const SESSION_EXPIRED: &str = "SESSION_EXPIRED";
    pub const NETWORK_ERROR: &str = "NETWORK_ERROR";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const ELEMENT_NOT_FOUND: &str = "ELEMENT_NOT_FOUND";
    pub const RESUME_DOWNLOAD_FAILED: &str = "RESUME_DOWNLOAD_FAILED";
    pub const NAVIGATION_FAILED: &str = "NAVIGATION_FAILED";
    pub const BROWSER_UNAVAILABLE: &str = "BROWSER_UNAVAILABLE";
    pub const STALE_TASK: &str = "STALE_TASK";
    pub const UNKNOWN_ERROR: &str = "UNKNOWN_ERROR";
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display_names_record_kind() {
        let err = AppError::not_found(RecordKind::Resume, "r-1");
        assert_eq!(err.to_string(), "记录不存在: resume r-1");
    }

    #[test]
    fn only_timeout_variant_is_timeout() {
        assert!(AppError::Timeout("nav".into()).is_timeout());
        assert!(!AppError::Browser("timeout in message".into()).is_timeout());
    }
}
