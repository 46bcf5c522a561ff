//! 集成测试共用的夹具：内存存储、页面替身和快速重试配置
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use auto_apply::error::{AppError, AppResult};
use auto_apply::infrastructure::fake_page::{file_field, required, text_field};
use auto_apply::infrastructure::{FakeBrowser, FakePage, PageChange};
use auto_apply::models::{
    ArtifactRecord, JobTarget, JobTargetStatus, Profile, Resume, Task, TaskStatus, WorkAuthorization,
};
use auto_apply::services::{RateLimiter, RetryConfig};
use auto_apply::store::{EventLevel, MemoryStore, Persistence, TaskUpdate};
use auto_apply::{ApplyOrchestrator, Config, TaskRunner};

pub const USER_ID: &str = "user-1";
pub const RESUME_ID: &str = "resume-1";
pub const RESUME_PATH: &str = "user-1/resumes/ada-lovelace.pdf";
pub const GREENHOUSE_URL: &str = "https://boards.greenhouse.io/acme/jobs/4012345";
pub const LEVER_URL: &str = "https://jobs.lever.co/acme/5ac21346-8e0c-4494-8e7a-3eb92ff77902";
pub const ASHBY_URL: &str = "https://jobs.ashbyhq.com/acme/0c3f9d9e-1b7a-4f0e-9a55-2d1c8b7a6e21";
pub const WORKDAY_URL: &str = "https://acme.wd1.myworkdayjobs.com/en-US/careers/job/Engineer_R-1";

pub const SUCCESS_TEXT: &str = "Thank you for applying to Acme! We will be in touch.";

pub fn profile() -> Profile {
    Profile {
        user_id: USER_ID.into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        email: "ada@example.com".into(),
        phone: Some("+1 555 0100".into()),
        city: Some("London".into()),
        country: Some("United Kingdom".into()),
        linkedin_url: Some("https://linkedin.com/in/ada".into()),
        work_authorization: Some(WorkAuthorization::Citizen),
        ..Default::default()
    }
}

/// 不等待页面稳定、表单超时很短
pub fn test_config() -> Config {
    Config {
        worker_id: "test-worker".into(),
        poll_interval_secs: 1,
        element_timeout_ms: 50,
        post_submit_wait_ms: 0,
        ..Default::default()
    }
}

pub fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(5),
        multiplier: 2.0,
    }
}

/// 不对测试域名限速
pub fn unthrottled() -> Arc<RateLimiter> {
    let limiter = RateLimiter::new().with_default_interval(Duration::ZERO);
    for domain in ["greenhouse.io", "lever.co", "ashbyhq.com", "myworkdayjobs.com"] {
        limiter.set_domain_limit(domain, Duration::ZERO);
    }
    Arc::new(limiter)
}

/// 写入资料、简历文件、职位和排队任务
pub fn seed_task(store: &MemoryStore, task_id: &str, job_id: &str, url: &str) -> Task {
    store.insert_profile(profile()).expect("insert profile");
    store
        .insert_resume(Resume {
            id: RESUME_ID.into(),
            user_id: USER_ID.into(),
            storage_path: RESUME_PATH.into(),
            file_name: "Ada Lovelace.pdf".into(),
        })
        .expect("insert resume");
    store
        .insert_file(RESUME_PATH, b"%PDF-1.4 resume".to_vec())
        .expect("insert resume file");
    store
        .insert_job_target(JobTarget::new(job_id, USER_ID, url))
        .expect("insert job");
    let task = Task::queued(task_id, USER_ID, job_id, RESUME_ID);
    store.insert_task(task.clone()).expect("insert task");
    task
}

/// 一个可以直接提交成功的 Greenhouse 表单
pub fn greenhouse_page() -> FakePage {
    FakePage::new(GREENHOUSE_URL)
        .with_title("Job Application for Software Engineer at Acme")
        .with_body_text("Apply for this Job")
        .with_element("#application_form")
        .with_control(required(text_field("#first_name", "First Name")))
        .with_control(required(text_field("#last_name", "Last Name")))
        .with_control(required(text_field("#email", "Email")))
        .with_control(required(text_field("#phone", "Phone")))
        .with_control(required(file_field("input[type=\"file\"]#resume", "Resume/CV")))
        .with_question(".field", "LinkedIn Profile", vec![text_field("#job_application_answers_0", "LinkedIn Profile")])
        .on_click(
            "#submit_app",
            PageChange::new()
                .url(format!("{GREENHOUSE_URL}/confirmation"))
                .body_text(SUCCESS_TEXT),
        )
}

pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub browser: Arc<FakeBrowser>,
    pub runner: TaskRunner,
}

pub fn harness(pages: Vec<Arc<FakePage>>, config: Config) -> Harness {
    let store = Arc::new(MemoryStore::new());
    harness_with_store(store.clone(), store, pages, config)
}

/// `persistence` 给执行器使用，`store` 留给断言
pub fn harness_with_store(
    store: Arc<MemoryStore>,
    persistence: Arc<dyn Persistence>,
    pages: Vec<Arc<FakePage>>,
    config: Config,
) -> Harness {
    let browser = Arc::new(FakeBrowser::new(pages));
    let orchestrator = ApplyOrchestrator::new(persistence.clone(), browser.clone(), unthrottled(), config.clone())
        .with_retry_config(fast_retry(), fast_retry());
    let runner = TaskRunner::new(persistence, orchestrator, config.worker_id.clone());
    Harness { store, browser, runner }
}

impl Harness {
    /// 领取并执行下一个任务，返回落库后的任务
    pub async fn run_next(&self) -> Task {
        let task = self
            .runner
            .claim_next()
            .await
            .expect("claim")
            .expect("a queued task");
        let id = task.id.clone();
        self.runner.run(task).await;
        self.store.task(&id).expect("task still stored")
    }

    pub fn job_status(&self, job_id: &str) -> JobTargetStatus {
        self.store.job_target(job_id).expect("job stored").status
    }
}

// ========== 故障注入 ==========

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    /// 读取简历记录时返回存储错误
    ResumeLookupFails,
    /// 读取资料时 panic
    ProfileLookupPanics,
}

/// 包装内存存储，在指定调用上注入故障
pub struct FaultyStore {
    inner: Arc<MemoryStore>,
    fault: Fault,
}

impl FaultyStore {
    pub fn new(inner: Arc<MemoryStore>, fault: Fault) -> Self {
        Self { inner, fault }
    }
}

#[async_trait]
impl Persistence for FaultyStore {
    async fn fetch_one_queued(&self) -> AppResult<Option<Task>> {
        self.inner.fetch_one_queued().await
    }

    async fn compare_and_set_running(&self, task_id: &str, expected: TaskStatus) -> AppResult<Option<Task>> {
        self.inner.compare_and_set_running(task_id, expected).await
    }

    async fn get_job_target(&self, id: &str) -> AppResult<Option<JobTarget>> {
        self.inner.get_job_target(id).await
    }

    async fn get_resume(&self, id: &str) -> AppResult<Option<Resume>> {
        if self.fault == Fault::ResumeLookupFails {
            return Err(AppError::Storage("connection refused".into()));
        }
        self.inner.get_resume(id).await
    }

    async fn get_profile(&self, user_id: &str) -> AppResult<Option<Profile>> {
        if self.fault == Fault::ProfileLookupPanics {
            panic!("profile row could not be decoded");
        }
        self.inner.get_profile(user_id).await
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus, update: TaskUpdate) -> AppResult<()> {
        self.inner.update_task_status(task_id, status, update).await
    }

    async fn update_job_target_status(&self, job_target_id: &str, status: JobTargetStatus) -> AppResult<()> {
        self.inner.update_job_target_status(job_target_id, status).await
    }

    async fn append_event(
        &self,
        task_id: &str,
        level: EventLevel,
        message: &str,
        data: Option<JsonValue>,
    ) -> AppResult<()> {
        self.inner.append_event(task_id, level, message, data).await
    }

    async fn download_file(&self, storage_path: &str) -> AppResult<Vec<u8>> {
        self.inner.download_file(storage_path).await
    }

    async fn upload_file(&self, storage_path: &str, bytes: &[u8], content_type: &str) -> AppResult<()> {
        self.inner.upload_file(storage_path, bytes, content_type).await
    }

    async fn insert_artifact_records(&self, records: &[ArtifactRecord]) -> AppResult<()> {
        self.inner.insert_artifact_records(records).await
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Task>> {
        self.inner.list_stale_running(cutoff).await
    }
}
