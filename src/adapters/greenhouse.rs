//! Greenhouse 适配器

use async_trait::async_trait;
use tracing::info;

use super::{
    country, current_company, email, first_name, github, host_matches, last_name, linkedin, location, phone,
    portfolio, SiteAdapter,
};
use crate::models::ApplyResult;
use crate::workflow::{ApplyContext, FieldWidget, FormFlow, SiteSelectors, StaticField};

const FIELDS: &[StaticField] = &[
    StaticField {
        label: "First Name",
        selectors: &["#first_name", "input[name=\"job_application[first_name]\"]"],
        value: first_name,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Last Name",
        selectors: &["#last_name", "input[name=\"job_application[last_name]\"]"],
        value: last_name,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Email",
        selectors: &["#email", "input[name=\"job_application[email]\"]", "input[type=\"email\"]"],
        value: email,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Phone",
        selectors: &["#phone", "input[name=\"job_application[phone]\"]", "input[type=\"tel\"]"],
        value: phone,
        widget: FieldWidget::Text,
        optional: false,
    },
    StaticField {
        label: "Location",
        selectors: &["#job_application_location", "#auto_complete_input", "input[name=\"job_application[location]\"]"],
        value: location,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Country",
        selectors: &["select#country", "select[name=\"job_application[country]\"]"],
        value: country,
        widget: FieldWidget::Select,
        optional: true,
    },
    StaticField {
        label: "LinkedIn",
        selectors: &[
            "input[autocomplete=\"custom-question-linkedin-profile\"]",
            "input[aria-label*=\"LinkedIn\"]",
            "input[name*=\"linkedin\"]",
        ],
        value: linkedin,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "GitHub",
        selectors: &["input[aria-label*=\"GitHub\"]", "input[name*=\"github\"]"],
        value: github,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Website",
        selectors: &["input[aria-label*=\"Website\"]", "input[aria-label*=\"Portfolio\"]"],
        value: portfolio,
        widget: FieldWidget::Text,
        optional: true,
    },
    StaticField {
        label: "Current Company",
        selectors: &["input[aria-label*=\"Current Company\"]", "input[name*=\"current_company\"]"],
        value: current_company,
        widget: FieldWidget::Text,
        optional: true,
    },
];

pub const SELECTORS: SiteSelectors = SiteSelectors {
    apply_path: None,
    apply_buttons: &["#apply_button", "a[href=\"#app\"]", "button.apply-button"],
    form: &["#application_form", "#application-form", "form#application"],
    static_fields: FIELDS,
    resume_inputs: &["input[type=\"file\"]#resume", "input[name=\"resume\"]", "#resume_fieldset input[type=\"file\"]"],
    question_containers: &[".field", ".application-question"],
    submit_buttons: &["#submit_app", "button[type=\"submit\"]", "input[type=\"submit\"]"],
    validation_errors: &[".field-error", ".error-message", "#error_flash", ".helper-text--error"],
    consent_label: Some(r"(?i)(i (have read|agree|acknowledge|consent)|privacy (policy|notice)|terms)"),
};

/// Greenhouse（boards.greenhouse.io / job-boards.greenhouse.io）
pub struct GreenhouseAdapter {
    flow: FormFlow,
}

impl Default for GreenhouseAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl GreenhouseAdapter {
    pub fn new() -> Self {
        Self {
            flow: FormFlow::new("greenhouse", SELECTORS),
        }
    }
}

#[async_trait]
impl SiteAdapter for GreenhouseAdapter {
    fn name(&self) -> &'static str {
        "greenhouse"
    }

    fn supports(&self, url: &str) -> bool {
        host_matches(url, "greenhouse.io")
    }

    async fn apply(&self, ctx: &ApplyContext) -> ApplyResult {
        info!("{} 🌱 使用 Greenhouse 适配器", ctx);
        self.flow.run(ctx).await
    }
}
