//! 持久化协作方
//!
//! 核心只通过 `Persistence` 这一窄接口访问数据库与文件存储。
//! `MemoryStore` 是进程内实现，供测试和本地种子运行使用。

pub mod memory;
pub mod seed;

use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::AppResult;
use crate::models::{
    ArtifactRecord, JobTarget, JobTargetStatus, Profile, RequiredInput, Resume, Task, TaskStatus,
};

pub use memory::MemoryStore;
pub use seed::load_seed_file;

/// 事件级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for EventLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventLevel::Debug => "debug",
            EventLevel::Info => "info",
            EventLevel::Warn => "warn",
            EventLevel::Error => "error",
        };
        f.write_str(name)
    }
}

/// 任务审计事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub level: EventLevel,
    pub message: String,
    pub data: Option<JsonValue>,
    pub created_at: DateTime<Utc>,
}

/// 任务状态更新，只写入 Some 的字段
#[derive(Debug, Clone, Default)]
pub struct TaskUpdate {
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub result: Option<JsonValue>,
    pub required_inputs: Option<Vec<RequiredInput>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TaskUpdate {
    pub fn finished() -> Self {
        Self {
            finished_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn error(mut self, code: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_code = Some(code.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn result(mut self, result: JsonValue) -> Self {
        self.result = Some(result);
        self
    }

    pub fn required_inputs(mut self, inputs: Vec<RequiredInput>) -> Self {
        self.required_inputs = Some(inputs);
        self
    }
}

/// 持久化接口
#[async_trait]
pub trait Persistence: Send + Sync {
    /// 取一个排队中的任务（最早创建的优先），不修改状态
    async fn fetch_one_queued(&self) -> AppResult<Option<Task>>;

    /// 条件更新：仅当任务仍处于 `expected` 状态时改为 running。
    /// 失败（已被其他工作进程领取）返回 None。
    async fn compare_and_set_running(&self, task_id: &str, expected: TaskStatus) -> AppResult<Option<Task>>;

    async fn get_job_target(&self, id: &str) -> AppResult<Option<JobTarget>>;

    async fn get_resume(&self, id: &str) -> AppResult<Option<Resume>>;

    async fn get_profile(&self, user_id: &str) -> AppResult<Option<Profile>>;

    async fn update_task_status(&self, task_id: &str, status: TaskStatus, update: TaskUpdate) -> AppResult<()>;

    async fn update_job_target_status(&self, job_target_id: &str, status: JobTargetStatus) -> AppResult<()>;

    async fn append_event(
        &self,
        task_id: &str,
        level: EventLevel,
        message: &str,
        data: Option<JsonValue>,
    ) -> AppResult<()>;

    async fn download_file(&self, storage_path: &str) -> AppResult<Vec<u8>>;

    async fn upload_file(&self, storage_path: &str, bytes: &[u8], content_type: &str) -> AppResult<()>;

    async fn insert_artifact_records(&self, records: &[ArtifactRecord]) -> AppResult<()>;

    /// 列出 started_at 早于 `cutoff` 仍处于 running 的任务
    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Task>>;
}
