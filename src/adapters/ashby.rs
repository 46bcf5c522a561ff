//! Ashby 适配器

use async_trait::async_trait;
use tracing::info;

use super::{email, full_name, host_matches, linkedin, location, phone, work_authorization, SiteAdapter};
use crate::models::ApplyResult;
use crate::workflow::{ApplyContext, FieldWidget, FormFlow, SiteSelectors, StaticField};

const FIELDS: &[StaticField] = &[
    StaticField {
        label: "Name",
        selectors: &["input[name=\"_systemfield_name\"]", "#_systemfield_name"],
        value: full_name,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Email",
        selectors: &["input[name=\"_systemfield_email\"]", "#_systemfield_email", "input[type=\"email\"]"],
        value: email,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Phone",
        selectors: &["input[name=\"_systemfield_phone\"]", "input[type=\"tel\"]"],
        value: phone,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "LinkedIn",
        selectors: &["input[name*=\"linkedin\" i]", "input[placeholder*=\"linkedin.com\"]"],
        value: linkedin,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Location",
        selectors: &["input[name=\"_systemfield_location\"]", "input[placeholder*=\"Start typing\"]"],
        value: location,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Work Authorization",
        selectors: &["select[name*=\"authorization\" i]"],
        value: work_authorization,
        widget: FieldWidget::WorkAuthorization,
        optional: true,
    },
];

pub const SELECTORS: SiteSelectors = SiteSelectors {
    apply_path: Some("/application"),
    apply_buttons: &["a[href$=\"/application\"]", "button[class*=\"apply\"]"],
    form: &[
        "form.ashby-application-form",
        "[class*=\"ashby-application-form-container\"] form",
        "form:has(input[name^=\"_systemfield_\"])",
    ],
    static_fields: FIELDS,
    resume_inputs: &["input[type=\"file\"][name*=\"resume\" i]", "#_systemfield_resume", "input[type=\"file\"]"],
    question_containers: &[".ashby-application-form-field-entry", "[class*=\"fieldEntry\"]"],
    submit_buttons: &["button.ashby-application-form-submit-button", "button[type=\"submit\"]"],
    validation_errors: &[".ashby-application-form-field-entry [class*=\"error\"]", "[role=\"alert\"]"],
    consent_label: None,
};

/// Ashby（jobs.ashbyhq.com）
pub struct AshbyAdapter {
    flow: FormFlow,
}

impl Default for AshbyAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl AshbyAdapter {
    pub fn new() -> Self {
        Self {
            flow: FormFlow::new("ashby", SELECTORS),
        }
    }
}

#[async_trait]
impl SiteAdapter for AshbyAdapter {
    fn name(&self) -> &'static str {
        "ashby"
    }

    fn supports(&self, url: &str) -> bool {
        host_matches(url, "ashbyhq.com")
    }

    async fn apply(&self, ctx: &ApplyContext) -> ApplyResult {
        info!("{} 🧭 使用 Ashby 适配器", ctx);
        self.flow.run(ctx).await
    }
}
