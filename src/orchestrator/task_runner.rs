//! 任务执行器 - 编排层
//!
//! ## 职责
//!
//! 1. **领取**：取一个排队任务，用条件更新（queued → running）原子领取；抢输了返回 None
//! 2. **加载**：按外键加载职位、简历、资料；缺失记录直接失败，不重试
//! 3. **执行**：调用 `ApplyOrchestrator`
//! 4. **落库**：把 `ApplyResult` 映射为任务与职位状态，每次状态变化都写审计事件
//!
//! 任何路径（包括错误和 panic）结束时任务都处于终态，不会停留在 running。

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::FutureExt;
use serde_json::json;
use tracing::{debug, error, info, warn};

use super::apply_orchestrator::{panic_message, ApplyOrchestrator, ApplyOutcome, ApplyRequest};
use crate::error::{codes, AppError, AppResult};
use crate::models::{ApplyStatus, JobTargetStatus, Task, TaskResultPayload, TaskStatus};
use crate::store::{EventLevel, Persistence, TaskUpdate};

/// 一次执行的落库结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub task_id: String,
    pub status: TaskStatus,
    /// 适配器给出的结果状态；依赖记录缺失或兜底失败时为 None
    pub apply_status: Option<ApplyStatus>,
    pub error_code: Option<String>,
}

impl RunReport {
    fn failed(task_id: &str, code: &str) -> Self {
        Self {
            task_id: task_id.to_string(),
            status: TaskStatus::Failed,
            apply_status: None,
            error_code: Some(code.to_string()),
        }
    }
}

/// 任务执行器
pub struct TaskRunner {
    store: Arc<dyn Persistence>,
    orchestrator: ApplyOrchestrator,
    worker_id: String,
}

impl TaskRunner {
    pub fn new(store: Arc<dyn Persistence>, orchestrator: ApplyOrchestrator, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            orchestrator,
            worker_id: worker_id.into(),
        }
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// 领取一个排队任务
    ///
    /// 条件更新未命中（被其他工作进程抢先）时返回 None 而不是错误。
    pub async fn claim_next(&self) -> AppResult<Option<Task>> {
        let Some(candidate) = self.store.fetch_one_queued().await? else {
            return Ok(None);
        };

        let Some(task) = self
            .store
            .compare_and_set_running(&candidate.id, TaskStatus::Queued)
            .await?
        else {
            debug!("[任务 {}] 已被其他工作进程领取", candidate.id);
            return Ok(None);
        };

        info!("[任务 {}] 📥 已领取 (第 {} 次尝试)", task.id, task.attempt);
        self.event(
            &task.id,
            EventLevel::Info,
            "claimed",
            Some(json!({ "worker": self.worker_id, "attempt": task.attempt })),
        )
        .await;
        Ok(Some(task))
    }

    /// 执行已领取的任务，返回落库的结果
    pub async fn run(&self, task: Task) -> RunReport {
        let task_id = task.id.clone();
        let job_target_id = task.job_target_id.clone();

        match AssertUnwindSafe(self.execute(task)).catch_unwind().await {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                error!("[任务 {}] ❌ 执行出错: {}", task_id, e);
                self.force_fail(&task_id, &job_target_id, &e.to_string()).await
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("[任务 {}] ❌ 执行时 panic: {}", task_id, message);
                self.force_fail(&task_id, &job_target_id, &format!("panic: {message}"))
                    .await
            }
        }
    }

    async fn execute(&self, task: Task) -> AppResult<RunReport> {
        // ========== 加载依赖记录 ==========
        let Some(job) = self.store.get_job_target(&task.job_target_id).await? else {
            return self
                .fail_fatal(&task, codes::JOB_NOT_FOUND, format!("职位 {} 不存在", task.job_target_id), false)
                .await;
        };
        let Some(resume) = self.store.get_resume(&task.resume_id).await? else {
            return self
                .fail_fatal(&task, codes::RESUME_NOT_FOUND, format!("简历 {} 不存在", task.resume_id), true)
                .await;
        };
        let Some(profile) = self.store.get_profile(&task.user_id).await? else {
            return self
                .fail_fatal(&task, codes::PROFILE_NOT_FOUND, format!("用户 {} 没有资料", task.user_id), true)
                .await;
        };

        self.store
            .update_job_target_status(&job.id, JobTargetStatus::Applying)
            .await?;
        self.event(&task.id, EventLevel::Info, "applying", Some(json!({ "url": job.url })))
            .await;

        // ========== 执行 ==========
        let request = ApplyRequest {
            task,
            job,
            resume,
            profile,
        };
        let outcome = self.orchestrator.apply(&request).await;
        self.persist_outcome(&request, outcome).await
    }

    /// 把结果映射为任务 / 职位状态
    async fn persist_outcome(&self, request: &ApplyRequest, outcome: ApplyOutcome) -> AppResult<RunReport> {
        let task_id = request.task.id.as_str();
        let job_id = request.job.id.as_str();
        let result = outcome.result;
        let dry_run = result.status == ApplyStatus::DryRunComplete;

        let payload = TaskResultPayload {
            adapter: outcome.adapter.map(str::to_string),
            fields_filled: result.fields_filled_count,
            fields_failed: result.fields_failed.clone(),
            confirmation_text: result.confirmation_text.clone(),
            screenshots: result.screenshots.clone(),
            dry_run,
        };
        let payload = serde_json::to_value(&payload)?;

        let (status, job_status, update) = match result.status {
            ApplyStatus::Succeeded | ApplyStatus::DryRunComplete => (
                TaskStatus::Succeeded,
                (!dry_run).then_some(JobTargetStatus::Applied),
                TaskUpdate::finished().result(payload.clone()).required_inputs(Vec::new()),
            ),
            ApplyStatus::NeedsInput => (
                TaskStatus::NeedsInput,
                Some(JobTargetStatus::NeedsInput),
                TaskUpdate::default()
                    .result(payload.clone())
                    .required_inputs(result.required_inputs.clone().unwrap_or_default()),
            ),
            ApplyStatus::Blocked => (
                TaskStatus::Failed,
                Some(JobTargetStatus::Blocked),
                TaskUpdate::finished().result(payload.clone()).required_inputs(Vec::new()).error(
                    result.error_code.clone().unwrap_or_else(|| codes::UNKNOWN_ERROR.to_string()),
                    result.error_message.clone().unwrap_or_default(),
                ),
            ),
            ApplyStatus::Failed => (
                TaskStatus::Failed,
                Some(JobTargetStatus::Failed),
                TaskUpdate::finished().result(payload.clone()).required_inputs(Vec::new()).error(
                    result.error_code.clone().unwrap_or_else(|| codes::UNKNOWN_ERROR.to_string()),
                    result.error_message.clone().unwrap_or_default(),
                ),
            ),
        };

        self.store.update_task_status(task_id, status, update).await?;
        if let Some(job_status) = job_status {
            self.store.update_job_target_status(job_id, job_status).await?;
        }

        let (level, message) = match result.status {
            ApplyStatus::Succeeded => (EventLevel::Info, "succeeded"),
            ApplyStatus::DryRunComplete => (EventLevel::Info, "dry_run_complete"),
            ApplyStatus::NeedsInput => (EventLevel::Warn, "needs_input"),
            ApplyStatus::Blocked => (EventLevel::Warn, "blocked"),
            ApplyStatus::Failed => (EventLevel::Error, "failed"),
        };
        self.event(
            task_id,
            level,
            message,
            Some(json!({
                "status": status.as_str(),
                "error_code": result.error_code,
                "error_message": result.error_message,
                "required_inputs": result.required_inputs,
                "result": payload,
            })),
        )
        .await;

        log_outcome(task_id, status, &result.error_code, result.fields_filled_count);
        Ok(RunReport {
            task_id: task_id.to_string(),
            status,
            apply_status: Some(result.status),
            error_code: result.error_code,
        })
    }

    /// 依赖记录缺失：直接失败，不重试
    async fn fail_fatal(
        &self,
        task: &Task,
        code: &str,
        message: String,
        job_exists: bool,
    ) -> AppResult<RunReport> {
        warn!("[任务 {}] ❌ {}: {}", task.id, code, message);
        self.store
            .update_task_status(&task.id, TaskStatus::Failed, TaskUpdate::finished().error(code, message.as_str()))
            .await?;
        if job_exists {
            self.store
                .update_job_target_status(&task.job_target_id, JobTargetStatus::Failed)
                .await?;
        }
        self.event(&task.id, EventLevel::Error, "failed", Some(json!({ "error_code": code, "error_message": message })))
            .await;
        Ok(RunReport::failed(&task.id, code))
    }

    /// 兜底：任何未处理的错误或 panic 都强制落为 failed / UNEXPECTED_ERROR
    async fn force_fail(&self, task_id: &str, job_target_id: &str, message: &str) -> RunReport {
        let update = TaskUpdate::finished().error(codes::UNEXPECTED_ERROR, message);
        if let Err(e) = self.store.update_task_status(task_id, TaskStatus::Failed, update).await {
            error!("[任务 {}] ❌ 无法写入失败状态: {}", task_id, e);
        }
        if let Err(e) = self
            .store
            .update_job_target_status(job_target_id, JobTargetStatus::Failed)
            .await
        {
            debug!("[任务 {}] 无法更新职位状态: {}", task_id, e);
        }
        self.event(
            task_id,
            EventLevel::Error,
            "failed",
            Some(json!({ "error_code": codes::UNEXPECTED_ERROR, "error_message": message })),
        )
        .await;
        RunReport::failed(task_id, codes::UNEXPECTED_ERROR)
    }

    /// 把运行超过 `max_age` 的 running 任务标记为失败（不重新排队，避免重复提交）
    pub async fn reap_stale_tasks(&self, max_age: Duration) -> AppResult<usize> {
        let max_age = chrono::Duration::from_std(max_age)
            .map_err(|e| AppError::other(format!("超时时间无效: {e}")))?;
        let cutoff = Utc::now() - max_age;
        let stale = self.store.list_stale_running(cutoff).await?;

        for task in &stale {
            warn!("[任务 {}] 🧹 运行超时未结束，标记为失败", task.id);
            let message = format!(
                "任务自 {} 起一直处于 running，判定为工作进程异常退出",
                task.started_at.map(|t| t.to_rfc3339()).unwrap_or_else(|| "未知时间".to_string())
            );
            self.store
                .update_task_status(&task.id, TaskStatus::Failed, TaskUpdate::finished().error(codes::STALE_TASK, message.as_str()))
                .await?;
            if let Err(e) = self
                .store
                .update_job_target_status(&task.job_target_id, JobTargetStatus::Failed)
                .await
            {
                debug!("[任务 {}] 无法更新职位状态: {}", task.id, e);
            }
            self.event(
                &task.id,
                EventLevel::Warn,
                "reaped",
                Some(json!({ "error_code": codes::STALE_TASK, "worker": self.worker_id })),
            )
            .await;
        }
        Ok(stale.len())
    }

    /// 写审计事件；失败只记日志
    async fn event(&self, task_id: &str, level: EventLevel, message: &str, data: Option<serde_json::Value>) {
        if let Err(e) = self.store.append_event(task_id, level, message, data).await {
            warn!("[任务 {}] 写入事件失败 ({}): {}", task_id, message, e);
        }
    }
}

// ========== 日志辅助函数 ==========

fn log_outcome(task_id: &str, status: TaskStatus, error_code: &Option<String>, filled: usize) {
    match (status, error_code) {
        (TaskStatus::Succeeded, _) => info!("[任务 {}] ✅ 完成，填写 {} 个字段", task_id, filled),
        (TaskStatus::NeedsInput, _) => info!("[任务 {}] ✋ 等待人工输入", task_id),
        (_, Some(code)) => warn!("[任务 {}] ❌ {} ({})", task_id, status, code),
        _ => warn!("[任务 {}] ❌ {}", task_id, status),
    }
}
