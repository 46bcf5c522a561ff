//! 提交后的结果判定
//!
//! 纯函数：只读取页面文本、当前 URL 和可见的校验错误。
//!
//! 判定顺序：成功文案 → 已申请文案 → 校验错误 → 验证码文案 → 确认页 URL → 默认成功。
//! 最后一条是明确的策略：没有任何失败迹象时按成功处理。

use crate::error::codes;
use crate::models::ApplyResult;
use crate::utils::logging::truncate_text;

const SUCCESS_PHRASES: &[&str] = &[
    "thank you for applying",
    "thanks for applying",
    "thank you for your application",
    "application has been submitted",
    "application was submitted",
    "application submitted",
    "successfully submitted",
    "we have received your application",
    "we've received your application",
    "application received",
];

const ALREADY_APPLIED_PHRASES: &[&str] = &[
    "already applied",
    "already submitted an application",
    "previously applied",
    "duplicate application",
];

const CAPTCHA_PHRASES: &[&str] = &[
    "captcha",
    "verify you are human",
    "verify you are a human",
    "i'm not a robot",
];

const CONFIRMATION_PATHS: &[&str] = &["/confirmation", "/thank_you", "/thank-you", "/thanks"];

/// 校验错误最多拼接的条数
const MAX_VALIDATION_MESSAGES: usize = 3;

/// 判定所需的页面信号
#[derive(Debug, Clone, Default)]
pub struct OutcomeSignals {
    pub body_text: String,
    pub url: String,
    /// 可见的校验错误元素文本
    pub validation_errors: Vec<String>,
}

/// 判定结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 页面出现成功文案
    Confirmed { confirmation: String },
    AlreadyApplied,
    ValidationFailed { message: String },
    Captcha,
    /// URL 是确认页
    ConfirmationUrl,
    /// 没有任何信号，按策略视为成功
    AssumedSuccess,
}

impl Outcome {
    pub fn into_result(self) -> ApplyResult {
        match self {
            Outcome::Confirmed { confirmation } => ApplyResult::succeeded().with_confirmation(Some(confirmation)),
            Outcome::AlreadyApplied => ApplyResult::blocked(codes::ALREADY_APPLIED, "站点提示已经申请过该职位"),
            Outcome::ValidationFailed { message } => ApplyResult::failed(codes::VALIDATION_ERROR, message),
            Outcome::Captcha => ApplyResult::blocked(codes::CAPTCHA_DETECTED, "提交后出现验证码"),
            Outcome::ConfirmationUrl | Outcome::AssumedSuccess => ApplyResult::succeeded(),
        }
    }
}

pub fn detect_outcome(signals: &OutcomeSignals) -> Outcome {
    let text = signals.body_text.to_lowercase();

    if let Some(phrase) = SUCCESS_PHRASES.iter().find(|p| text.contains(*p)) {
        return Outcome::Confirmed {
            confirmation: confirmation_line(&signals.body_text, phrase),
        };
    }
    if ALREADY_APPLIED_PHRASES.iter().any(|p| text.contains(p)) {
        return Outcome::AlreadyApplied;
    }

    let errors: Vec<&str> = signals
        .validation_errors
        .iter()
        .map(|e| e.trim())
        .filter(|e| !e.is_empty())
        .take(MAX_VALIDATION_MESSAGES)
        .collect();
    if !errors.is_empty() {
        return Outcome::ValidationFailed {
            message: format!("表单校验失败: {}", errors.join("; ")),
        };
    }

    if CAPTCHA_PHRASES.iter().any(|p| text.contains(p)) {
        return Outcome::Captcha;
    }

    let url = signals.url.to_lowercase();
    if CONFIRMATION_PATHS.iter().any(|p| url.contains(p)) {
        return Outcome::ConfirmationUrl;
    }

    Outcome::AssumedSuccess
}

/// 包含成功文案的那一行
fn confirmation_line(body: &str, phrase: &str) -> String {
    let line = body
        .lines()
        .map(str::trim)
        .find(|l| l.to_lowercase().contains(phrase))
        .unwrap_or(phrase);
    truncate_text(line, 200)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ApplyStatus;
    use pretty_assertions::assert_eq;

    fn signals(body: &str, url: &str, errors: &[&str]) -> OutcomeSignals {
        OutcomeSignals {
            body_text: body.into(),
            url: url.into(),
            validation_errors: errors.iter().map(|e| e.to_string()).collect(),
        }
    }

    #[test]
    fn success_phrase_wins_and_keeps_line() {
        let outcome = detect_outcome(&signals("Acme\nThank you for applying to Acme!\nBack", "https://x/jobs/1", &[]));
        assert_eq!(
            outcome,
            Outcome::Confirmed {
                confirmation: "Thank you for applying to Acme!".into()
            }
        );
    }

    #[test]
    fn already_applied_is_blocked() {
        let result = detect_outcome(&signals("It looks like you have already applied.", "", &[])).into_result();
        assert_eq!(result.status, ApplyStatus::Blocked);
        assert_eq!(result.error_code.as_deref(), Some(codes::ALREADY_APPLIED));
    }

    #[test]
    fn validation_errors_join_first_three() {
        let outcome = detect_outcome(&signals(
            "Please fix the errors",
            "",
            &["Email is invalid", " ", "Phone is required", "Resume is required", "Name is required"],
        ));
        assert_eq!(
            outcome,
            Outcome::ValidationFailed {
                message: "表单校验失败: Email is invalid; Phone is required; Resume is required".into()
            }
        );
    }

    #[test]
    fn captcha_after_validation() {
        assert_eq!(detect_outcome(&signals("Please complete the CAPTCHA", "", &[])), Outcome::Captcha);
        let result = Outcome::Captcha.into_result();
        assert_eq!(result.error_code.as_deref(), Some(codes::CAPTCHA_DETECTED));
    }

    #[test]
    fn confirmation_url_then_default_success() {
        assert_eq!(
            detect_outcome(&signals("", "https://jobs.lever.co/acme/1/thanks", &[])),
            Outcome::ConfirmationUrl
        );
        let outcome = detect_outcome(&signals("Some unrelated page", "https://x/jobs/1", &[]));
        assert_eq!(outcome, Outcome::AssumedSuccess);
        assert_eq!(outcome.into_result().status, ApplyStatus::Succeeded);
    }
}
