use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::apply_result::RequiredInput;

/// 投递任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Blocked,
    /// 等待人工补充答案；finished_at 保持为空，不会被自动重新领取
    NeedsInput,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Blocked => "blocked",
            TaskStatus::NeedsInput => "needs_input",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次投递任务（application run）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub user_id: String,
    pub job_target_id: String,
    pub resume_id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub attempt: u32,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub required_inputs: Vec<RequiredInput>,
    /// 人工补充的答案，按字段名索引
    #[serde(default)]
    pub user_inputs: HashMap<String, String>,
}

impl Task {
    /// 创建新的排队任务
    pub fn queued(
        id: impl Into<String>,
        user_id: impl Into<String>,
        job_target_id: impl Into<String>,
        resume_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: user_id.into(),
            job_target_id: job_target_id.into(),
            resume_id: resume_id.into(),
            status: TaskStatus::Queued,
            attempt: 0,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
            error_code: None,
            error_message: None,
            result: None,
            required_inputs: Vec::new(),
            user_inputs: HashMap::new(),
        }
    }
}

/// 持久化到任务上的结果载荷
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResultPayload {
    pub adapter: Option<String>,
    pub fields_filled: usize,
    pub fields_failed: Vec<String>,
    pub confirmation_text: Option<String>,
    pub screenshots: Vec<String>,
    /// dry run 单独记录在载荷里，而不是作为独立的任务状态
    pub dry_run: bool,
}
