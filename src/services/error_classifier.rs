//! 错误分类
//!
//! 把原始错误（CDP 失败、超时、网络中断）和页面信号（验证码、限流提示、
//! “已申请”文案）映射为带重试策略的统一分类。分类依据错误消息子串和
//! 错误子类型（显式超时 vs 其他），而不是站点返回的固定枚举。

use std::fmt;

use serde::Serialize;

use crate::error::{codes, AppError};
use crate::infrastructure::FormPage;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    Network,
    Timeout,
    ElementNotFound,
    Validation,
    Captcha,
    RateLimited,
    AlreadyApplied,
    SessionExpired,
    Unknown,
}

impl ErrorCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCategory::Network => "NETWORK",
            ErrorCategory::Timeout => "TIMEOUT",
            ErrorCategory::ElementNotFound => "ELEMENT_NOT_FOUND",
            ErrorCategory::Validation => "VALIDATION",
            ErrorCategory::Captcha => "CAPTCHA",
            ErrorCategory::RateLimited => "RATE_LIMITED",
            ErrorCategory::AlreadyApplied => "ALREADY_APPLIED",
            ErrorCategory::SessionExpired => "SESSION_EXPIRED",
            ErrorCategory::Unknown => "UNKNOWN",
        }
    }

    /// 该类别允许的重试次数，0 表示不可重试
    pub fn max_retries(self) -> u32 {
        match self {
            ErrorCategory::Network => 3,
            ErrorCategory::Timeout => 2,
            ErrorCategory::ElementNotFound => 2,
            ErrorCategory::Validation => 1,
            ErrorCategory::Captcha
            | ErrorCategory::RateLimited
            | ErrorCategory::AlreadyApplied
            | ErrorCategory::SessionExpired
            | ErrorCategory::Unknown => 0,
        }
    }

    pub fn is_retryable(self) -> bool {
        self.max_retries() > 0
    }

    /// 类别默认的错误码
    pub fn default_code(self) -> &'static str {
        match self {
            ErrorCategory::Network => codes::NETWORK_ERROR,
            ErrorCategory::Timeout => codes::TIMEOUT,
            ErrorCategory::ElementNotFound => codes::ELEMENT_NOT_FOUND,
            ErrorCategory::Validation => codes::VALIDATION_ERROR,
            ErrorCategory::Captcha => codes::CAPTCHA_DETECTED,
            ErrorCategory::RateLimited => codes::RATE_LIMITED,
            ErrorCategory::AlreadyApplied => codes::ALREADY_APPLIED,
            ErrorCategory::SessionExpired => codes::SESSION_EXPIRED,
            ErrorCategory::Unknown => codes::UNKNOWN_ERROR,
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClassifiedError {
    pub category: ErrorCategory,
    pub code: String,
    pub message: String,
    pub retryable: bool,
    pub max_retries: u32,
}

impl ClassifiedError {
    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self::with_code(category, category.default_code(), message)
    }

    pub fn with_code(category: ErrorCategory, code: &str, message: impl Into<String>) -> Self {
        Self {
            category,
            code: code.to_string(),
            message: message.into(),
            retryable: category.is_retryable(),
            max_retries: category.max_retries(),
        }
    }

    /// 是否属于策略阻断（验证码、限流、已申请），这类错误不自动重试
    pub fn is_blocking(&self) -> bool {
        matches!(
            self.category,
            ErrorCategory::Captcha | ErrorCategory::RateLimited | ErrorCategory::AlreadyApplied
        )
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

// ========== 消息模式表 ==========

const CAPTCHA_PATTERNS: &[&str] = &["captcha", "verify you are human", "verify you're human", "not a robot"];
const ALREADY_APPLIED_PATTERNS: &[&str] = &["already applied", "already submitted", "duplicate application"];
const RATE_LIMIT_PATTERNS: &[&str] = &["too many requests", "rate limit", "429"];
const ACCESS_DENIED_PATTERNS: &[&str] = &["access denied", "forbidden", "403", "request blocked"];
const SESSION_PATTERNS: &[&str] = &["session expired", "session has expired", "please log in", "unauthorized", "401"];
const TIMEOUT_PATTERNS: &[&str] = &["timeout", "timed out", "deadline has elapsed"];
const NETWORK_PATTERNS: &[&str] = &[
    "net::err",
    "econnreset",
    "econnrefused",
    "connection reset",
    "connection refused",
    "network",
    "dns",
    "socket hang up",
];
const ELEMENT_PATTERNS: &[&str] = &[
    "元素未找到",
    "no node",
    "could not find node",
    "no element",
    "element not found",
    "detached",
];
const VALIDATION_PATTERNS: &[&str] = &["validation", "invalid", "required field", "is required"];

fn contains_any(haystack: &str, patterns: &[&str]) -> bool {
    patterns.iter().any(|p| haystack.contains(p))
}

/// 对原始错误分类
pub fn classify(error: &AppError) -> ClassifiedError {
    let message = error.to_string();
    match error {
        AppError::Timeout(_) => ClassifiedError::new(ErrorCategory::Timeout, message),
        AppError::ElementNotFound { .. } => ClassifiedError::new(ErrorCategory::ElementNotFound, message),
        AppError::BrowserBusy { .. } => {
            ClassifiedError::with_code(ErrorCategory::Unknown, codes::BROWSER_UNAVAILABLE, message)
        }
        AppError::NotFound { .. } | AppError::Config { .. } => ClassifiedError::new(ErrorCategory::Unknown, message),
        AppError::Network(_) => {
            let classified = classify_message(&message, false);
            if classified.category == ErrorCategory::Unknown {
                ClassifiedError::new(ErrorCategory::Network, message)
            } else {
                classified
            }
        }
        _ => classify_message(&message, error.is_timeout()),
    }
}

/// 只根据消息文本分类；`is_timeout` 为显式超时信号
pub fn classify_message(message: &str, is_timeout: bool) -> ClassifiedError {
    if is_timeout {
        return ClassifiedError::new(ErrorCategory::Timeout, message);
    }
    let lower = message.to_lowercase();

    let (category, code) = if contains_any(&lower, CAPTCHA_PATTERNS) {
        (ErrorCategory::Captcha, codes::CAPTCHA_DETECTED)
    } else if contains_any(&lower, ALREADY_APPLIED_PATTERNS) {
        (ErrorCategory::AlreadyApplied, codes::ALREADY_APPLIED)
    } else if contains_any(&lower, RATE_LIMIT_PATTERNS) {
        (ErrorCategory::RateLimited, codes::RATE_LIMITED)
    } else if contains_any(&lower, ACCESS_DENIED_PATTERNS) {
        (ErrorCategory::RateLimited, codes::ACCESS_DENIED)
    } else if contains_any(&lower, SESSION_PATTERNS) {
        (ErrorCategory::SessionExpired, codes::SESSION_EXPIRED)
    } else if contains_any(&lower, TIMEOUT_PATTERNS) {
        (ErrorCategory::Timeout, codes::TIMEOUT)
    } else if contains_any(&lower, NETWORK_PATTERNS) {
        (ErrorCategory::Network, codes::NETWORK_ERROR)
    } else if contains_any(&lower, ELEMENT_PATTERNS) {
        (ErrorCategory::ElementNotFound, codes::ELEMENT_NOT_FOUND)
    } else if contains_any(&lower, VALIDATION_PATTERNS) {
        (ErrorCategory::Validation, codes::VALIDATION_ERROR)
    } else {
        (ErrorCategory::Unknown, codes::UNKNOWN_ERROR)
    };
    ClassifiedError::with_code(category, code, message)
}

// ========== 页面阻断检测 ==========

/// 实际渲染出来的验证码挑战元素；只引用了脚本不算
pub const CAPTCHA_CHALLENGE_SELECTORS: &[&str] = &[
    "iframe[src*=\"recaptcha/api2/bframe\"]",
    "iframe[src*=\"recaptcha/api2/anchor\"]",
    "iframe[src*=\"hcaptcha.com\"]",
    "iframe[title*=\"challenge\"]",
    ".h-captcha",
    ".g-recaptcha",
    ".cf-turnstile",
    "#challenge-form",
];

const CAPTCHA_PAGE_PHRASES: &[&str] = &[
    "please verify you are a human",
    "verify you are human",
    "please complete the captcha",
    "complete the security check",
    "i'm not a robot",
];
const RATE_LIMIT_PAGE_PHRASES: &[&str] = &[
    "too many requests",
    "rate limit exceeded",
    "you have been rate limited",
    "please slow down",
    "try again later",
];
const ALREADY_APPLIED_PAGE_PHRASES: &[&str] = &[
    "you have already applied",
    "you've already applied",
    "already applied for this",
    "already submitted an application",
];
const ACCESS_DENIED_PAGE_PHRASES: &[&str] = &[
    "access denied",
    "403 forbidden",
    "you don't have permission",
    "request blocked",
];

/// 页面状态快照
#[derive(Debug, Clone, Default)]
pub struct PageState {
    pub url: String,
    pub title: String,
    pub body_text: String,
    /// 是否有可见的验证码挑战元素
    pub captcha_visible: bool,
}

impl PageState {
    /// 从页面读取快照；单项读取失败按空值处理
    pub async fn capture(page: &dyn FormPage) -> Self {
        let url = page.current_url().await.unwrap_or_default();
        let title = page.title().await.unwrap_or_default();
        let body_text = page.body_text().await.unwrap_or_default();

        let mut captcha_visible = false;
        for selector in CAPTCHA_CHALLENGE_SELECTORS {
            if page.is_visible(selector).await.unwrap_or(false) {
                captcha_visible = true;
                break;
            }
        }

        Self {
            url,
            title,
            body_text,
            captcha_visible,
        }
    }
}

/// 检查页面是否处于阻断状态（验证码、限流、已申请、拒绝访问）
pub fn detect_blocking_condition(state: &PageState) -> Option<ClassifiedError> {
    let text = format!("{}\n{}", state.title, state.body_text).to_lowercase();

    if state.captcha_visible || contains_any(&text, CAPTCHA_PAGE_PHRASES) {
        return Some(ClassifiedError::new(ErrorCategory::Captcha, "页面出现验证码挑战"));
    }
    if contains_any(&text, RATE_LIMIT_PAGE_PHRASES) {
        return Some(ClassifiedError::new(ErrorCategory::RateLimited, "站点提示请求过于频繁"));
    }
    if contains_any(&text, ALREADY_APPLIED_PAGE_PHRASES) {
        return Some(ClassifiedError::new(ErrorCategory::AlreadyApplied, "站点提示已经申请过该职位"));
    }
    if contains_any(&text, ACCESS_DENIED_PAGE_PHRASES) {
        return Some(ClassifiedError::with_code(
            ErrorCategory::RateLimited,
            codes::ACCESS_DENIED,
            "站点拒绝访问",
        ));
    }
    None
}
