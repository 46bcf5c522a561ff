//! 端到端投递流程：内存存储 + 页面替身，不启动浏览器

mod common;

use std::collections::HashMap;
use std::sync::Arc;

use pretty_assertions::assert_eq;

use auto_apply::codes;
use auto_apply::infrastructure::fake_page::{file_field, required, select_field, text_field};
use auto_apply::infrastructure::{FakePage, PageChange};
use auto_apply::models::{JobTargetStatus, RequiredInput, TaskResultPayload, TaskStatus};

use common::*;

fn payload(task: &auto_apply::Task) -> TaskResultPayload {
    serde_json::from_value(task.result.clone().expect("result payload")).expect("payload shape")
}

#[tokio::test]
async fn greenhouse_application_succeeds() {
    let page = Arc::new(greenhouse_page());
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert!(task.finished_at.is_some());
    assert!(task.error_code.is_none());
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Applied);

    let result = payload(&task);
    assert_eq!(result.adapter.as_deref(), Some("greenhouse"));
    assert!(result.fields_failed.is_empty(), "failed: {:?}", result.fields_failed);
    assert_eq!(result.fields_filled, 6);
    assert!(!result.dry_run);
    assert!(result.confirmation_text.unwrap_or_default().contains("Thank you for applying"));

    assert_eq!(page.value_of("#first_name").as_deref(), Some("Ada"));
    assert_eq!(page.value_of("#email").as_deref(), Some("ada@example.com"));
    assert_eq!(
        page.value_of("#job_application_answers_0").as_deref(),
        Some("https://linkedin.com/in/ada")
    );
    assert_eq!(page.value_of("input[type=\"file\"]#resume").as_deref(), Some("Ada_Lovelace.pdf"));
    assert!(page.was_clicked("#submit_app"));
    assert!(page.is_closed());

    // 截图已上传到 {user}/{task}/ 下并写入结果
    assert!(!result.screenshots.is_empty());
    for path in &result.screenshots {
        assert!(path.starts_with("user-1/task-1/"), "{path}");
        assert!(h.store.file(path).is_some());
        assert_eq!(h.store.content_type(path).as_deref(), Some("image/png"));
    }
    assert!(!h.store.artifact_records().is_empty());

    let messages: Vec<String> = h.store.events_for("task-1").into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["claimed", "applying", "succeeded"]);
}

#[tokio::test]
async fn unresolved_required_question_stops_before_submit() {
    let page = Arc::new(greenhouse_page().with_question(
        ".field",
        "Are you willing to relocate?",
        vec![required(select_field(
            "#job_application_answers_1",
            "Are you willing to relocate?",
            &[("", "Select..."), ("1", "Yes"), ("0", "No")],
        ))],
    ));
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::NeedsInput);
    assert!(task.finished_at.is_none());
    assert_eq!(
        task.required_inputs,
        vec![RequiredInput {
            field_name: "Are you willing to relocate?".into(),
            field_type: "select".into(),
            options: Some(vec!["Yes".into(), "No".into()]),
            required: true,
        }]
    );
    assert!(!page.was_clicked("#submit_app"));
    assert_eq!(h.job_status("job-1"), JobTargetStatus::NeedsInput);
}

#[tokio::test]
async fn user_inputs_answer_the_question_on_the_next_run() {
    let page = Arc::new(greenhouse_page().with_question(
        ".field",
        "Are you willing to relocate?",
        vec![required(select_field(
            "#job_application_answers_1",
            "Are you willing to relocate?",
            &[("", "Select..."), ("1", "Yes"), ("0", "No")],
        ))],
    ));
    let h = harness(vec![page.clone()], test_config());
    let mut task = seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    task.user_inputs = HashMap::from([("Are you willing to relocate?".to_string(), "Yes".to_string())]);
    h.store.insert_task(task).expect("requeue with answers");

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(page.value_of("#job_application_answers_1").as_deref(), Some("1"));
    assert!(page.was_clicked("#submit_app"));
}

#[tokio::test]
async fn requeued_task_sheds_previous_attempt_fields() {
    let page = Arc::new(greenhouse_page());
    let h = harness(vec![page], test_config());
    let mut task = seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    task.attempt = 1;
    task.error_code = Some(codes::VALIDATION_ERROR.to_string());
    task.error_message = Some("Email is invalid".to_string());
    task.required_inputs = vec![RequiredInput {
        field_name: "Are you willing to relocate?".into(),
        field_type: "select".into(),
        options: Some(vec!["Yes".into(), "No".into()]),
        required: true,
    }];
    h.store.insert_task(task).expect("requeue with stale fields");

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert_eq!(task.attempt, 2);
    assert_eq!(task.error_code, None);
    assert_eq!(task.error_message, None);
    assert!(task.required_inputs.is_empty());
}

#[tokio::test]
async fn already_applied_after_submit_is_blocked() {
    let page = Arc::new(greenhouse_page().on_click(
        "#submit_app",
        PageChange::new().body_text("It looks like you have already applied for this position."),
    ));
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::ALREADY_APPLIED));
    assert!(task.finished_at.is_some());
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Blocked);
}

#[tokio::test]
async fn validation_errors_after_submit_fail_the_task() {
    let page = Arc::new(greenhouse_page().on_click(
        "#submit_app",
        PageChange::new()
            .body_text("Please fix the errors below")
            .texts(".field-error", &["Email is invalid", "Phone is required"]),
    ));
    let h = harness(vec![page], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::VALIDATION_ERROR));
    assert!(task
        .error_message
        .unwrap_or_default()
        .contains("Email is invalid; Phone is required"));
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Failed);
}

#[tokio::test]
async fn dry_run_fills_but_never_submits() {
    let page = Arc::new(greenhouse_page());
    let config = auto_apply::Config {
        dry_run: true,
        ..test_config()
    };
    let h = harness(vec![page.clone()], config);
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    assert!(payload(&task).dry_run);
    assert_eq!(page.value_of("#last_name").as_deref(), Some("Lovelace"));
    assert!(!page.was_clicked("#submit_app"));
    assert_ne!(h.job_status("job-1"), JobTargetStatus::Applied);
}

#[tokio::test]
async fn captcha_on_landing_page_blocks_without_running_adapter() {
    let page = Arc::new(greenhouse_page().with_element(".g-recaptcha"));
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::CAPTCHA_DETECTED));
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Blocked);
    assert!(page.value_of("#first_name").unwrap_or_default().is_empty());
    assert!(page.is_closed());

    // 被拦截时保存截图和 HTML
    let kinds: Vec<_> = h.store.artifact_records().into_iter().map(|r| r.kind).collect();
    assert!(kinds.contains(&auto_apply::models::ArtifactKind::Screenshot));
    assert!(kinds.contains(&auto_apply::models::ArtifactKind::HtmlSnapshot));
}

#[tokio::test]
async fn unsupported_site_fails_without_opening_a_page() {
    let h = harness(vec![], test_config());
    seed_task(&h.store, "task-1", "job-1", WORKDAY_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::UNSUPPORTED_ATS));
    assert_eq!(h.browser.opened(), 0);
    assert_eq!(h.job_status("job-1"), JobTargetStatus::Failed);
}

#[tokio::test]
async fn transient_navigation_errors_are_retried() {
    let page = Arc::new(greenhouse_page().with_navigation_failures(2));
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded);
    let gotos = page.calls().iter().filter(|c| c.starts_with("goto:")).count();
    assert_eq!(gotos, 3);
}

#[tokio::test]
async fn persistent_navigation_errors_fail_and_release_the_page() {
    let page = Arc::new(greenhouse_page().with_navigation_failures(10));
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::NAVIGATION_FAILED));
    assert!(task.error_message.unwrap_or_default().starts_with("[NETWORK]"));
    assert!(page.is_closed());
}

#[tokio::test]
async fn missing_form_is_reported() {
    let page = Arc::new(
        FakePage::new(GREENHOUSE_URL)
            .with_title("Software Engineer at Acme")
            .with_body_text("This job is no longer accepting applications"),
    );
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::FORM_NOT_FOUND));
    assert!(page.is_closed());
}

#[tokio::test]
async fn missing_resume_file_fails_before_opening_a_page() {
    let h = harness(vec![Arc::new(greenhouse_page())], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);
    h.store.insert_file(RESUME_PATH, Vec::new()).expect("truncate resume");

    let task = h.run_next().await;

    assert_eq!(task.error_code.as_deref(), Some(codes::RESUME_DOWNLOAD_FAILED));
    assert_eq!(h.browser.opened(), 0);
}

#[tokio::test]
async fn exhausted_browser_is_reported() {
    let h = harness(vec![], test_config());
    seed_task(&h.store, "task-1", "job-1", GREENHOUSE_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Failed);
    assert_eq!(task.error_code.as_deref(), Some(codes::BROWSER_UNAVAILABLE));
}

#[tokio::test]
async fn lever_flow_opens_the_apply_page() {
    let apply_url = format!("{LEVER_URL}/apply");
    let page = Arc::new(
        FakePage::new(LEVER_URL)
            .with_body_text("Senior Engineer - Acme")
            .with_text_button(
                "a, button",
                "Apply for this job",
                PageChange::new().url(apply_url.clone()).reveal("form#application-form"),
            )
            .with_control(required(text_field(
                "input[name=\"name\"]",
                "Full name",
            )))
            .with_control(required(text_field(
                "input[name=\"email\"]",
                "Email",
            )))
            .with_control(file_field("input[name=\"resume\"]", "Resume/CV"))
            .on_click(
                "#btn-submit",
                PageChange::new().body_text("Application submitted! Thanks for applying."),
            ),
    );
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", LEVER_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded, "{:?}", task.error_message);
    assert_eq!(payload(&task).adapter.as_deref(), Some("lever"));
    assert_eq!(page.value_of("input[name=\"name\"]").as_deref(), Some("Ada Lovelace"));
    assert!(page.calls().contains(&format!("goto:{apply_url}")));
    assert!(page.was_clicked("#btn-submit"));
}

#[tokio::test]
async fn ashby_flow_opens_the_application_page() {
    let application_url = format!("{ASHBY_URL}/application");
    let page = Arc::new(
        FakePage::new(ASHBY_URL)
            .with_body_text("Staff Engineer - Acme")
            .on_click(
                "a[href$=\"/application\"]",
                PageChange::new().reveal("form.ashby-application-form"),
            )
            .with_control(required(text_field("input[name=\"_systemfield_name\"]", "Name")))
            .with_control(required(text_field("input[name=\"_systemfield_email\"]", "Email")))
            .with_control(required(select_field(
                "select[name*=\"authorization\" i]",
                "Are you authorized to work in the US?",
                &[
                    ("", "Select..."),
                    ("not-authorized", "I am not authorized to work in the US"),
                    ("authorized", "I am authorized to work in the US"),
                ],
            )))
            .with_control(required(file_field("input[type=\"file\"][name*=\"resume\" i]", "Resume")))
            .on_click(
                "button.ashby-application-form-submit-button",
                PageChange::new().body_text("Thanks for applying! We'll review your application soon."),
            ),
    );
    let h = harness(vec![page.clone()], test_config());
    seed_task(&h.store, "task-1", "job-1", ASHBY_URL);

    let task = h.run_next().await;

    assert_eq!(task.status, TaskStatus::Succeeded, "{:?}", task.error_message);
    assert_eq!(payload(&task).adapter.as_deref(), Some("ashby"));
    assert!(page.calls().contains(&format!("goto:{application_url}")));
    assert_eq!(page.value_of("input[name=\"_systemfield_name\"]").as_deref(), Some("Ada Lovelace"));
    assert_eq!(
        page.value_of("select[name*=\"authorization\" i]").as_deref(),
        Some("authorized")
    );
    assert_eq!(
        page.value_of("input[type=\"file\"][name*=\"resume\" i]").as_deref(),
        Some("Ada_Lovelace.pdf")
    );
    assert!(page.was_clicked("button.ashby-application-form-submit-button"));
}
