//! Lever 适配器
//!
//! Lever 的职位页和申请页分开，申请页固定为职位链接后加 `/apply`。
//! 姓名是单个字段。

use async_trait::async_trait;
use tracing::info;

use super::{current_company, email, full_name, github, host_matches, linkedin, location, phone, portfolio, SiteAdapter};
use crate::models::ApplyResult;
use crate::workflow::{ApplyContext, FieldWidget, FormFlow, SiteSelectors, StaticField};

const FIELDS: &[StaticField] = &[
    StaticField {
        label: "Full Name",
        selectors: &["input[name=\"name\"]"],
        value: full_name,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Email",
        selectors: &["input[name=\"email\"]"],
        value: email,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Phone",
        selectors: &["input[name=\"phone\"]"],
        value: phone,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Current Company",
        selectors: &["input[name=\"org\"]"],
        value: current_company,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "LinkedIn",
        selectors: &["input[name=\"urls[LinkedIn]\"]"],
        value: linkedin,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "GitHub",
        selectors: &["input[name=\"urls[GitHub]\"]"],
        value: github,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Portfolio",
        selectors: &["input[name=\"urls[Portfolio]\"]", "input[name=\"urls[Other]\"]"],
        value: portfolio,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Location",
        selectors: &["input[name=\"location\"]", "#location-input"],
        value: location,
        widget: FieldWidget::Text,
        optional: true,
    },
];

pub const SELECTORS: SiteSelectors = SiteSelectors {
    apply_path: Some("/apply"),
    apply_buttons: &["a.postings-btn", ".postings-btn-wrapper a", "a[href$=\"/apply\"]"],
    form: &["form#application-form", "#application-form", ".application-form form", "form[action*=\"/apply\"]"],
    static_fields: FIELDS,
    resume_inputs: &["input[name=\"resume\"]", "#resume-upload-input", "input[type=\"file\"]"],
    question_containers: &[".application-question", ".custom-question"],
    submit_buttons: &["#btn-submit", "button[type=\"submit\"]", "button.postings-btn"],
    validation_errors: &[".error-message", ".application-error", ".field-error"],
    consent_label: Some(r"(?i)(i (agree|consent|acknowledge)|privacy (policy|notice))"),
};

/// Lever（jobs.lever.co）
pub struct LeverAdapter {
    flow: FormFlow,
}

impl Default for LeverAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl LeverAdapter {
    pub fn new() -> Self {
        Self {
            flow: FormFlow::new("lever", SELECTORS),
        }
    }
}

#[async_trait]
impl SiteAdapter for LeverAdapter {
    fn name(&self) -> &'static str {
        "lever"
    }

    fn supports(&self, url: &str) -> bool {
        host_matches(url, "lever.co")
    }

    async fn apply(&self, ctx: &ApplyContext) -> ApplyResult {
        info!("{} 🎚️ 使用 Lever 适配器", ctx);
        self.flow.run(ctx).await
    }
}
