//! 进程内存储
//!
//! 所有状态放在一把互斥锁之后；`compare_and_set_running` 在同一临界区内
//! 完成“检查仍为 queued + 改为 running”，等价于数据库的条件更新。

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::debug;

use super::{EventLevel, Persistence, TaskEvent, TaskUpdate};
use crate::error::{AppError, AppResult, RecordKind};
use crate::models::{
    ArtifactRecord, JobTarget, JobTargetStatus, Profile, Resume, Task, TaskStatus,
};

#[derive(Default)]
struct Inner {
    tasks: Vec<Task>,
    job_targets: HashMap<String, JobTarget>,
    resumes: HashMap<String, Resume>,
    profiles: HashMap<String, Profile>,
    events: Vec<TaskEvent>,
    files: HashMap<String, Vec<u8>>,
    content_types: HashMap<String, String>,
    artifacts: Vec<ArtifactRecord>,
}

/// 内存存储
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    /// 上传文件的本地镜像目录
    mirror_dir: Option<PathBuf>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 上传的文件同时写入本地目录
    pub fn with_mirror_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.mirror_dir = Some(dir.into());
        self
    }

    fn lock(&self) -> AppResult<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| AppError::Storage("内存存储锁已中毒".to_string()))
    }

    // ========== 写入种子数据 ==========

    pub fn insert_task(&self, task: Task) -> AppResult<()> {
        let mut inner = self.lock()?;
        inner.tasks.retain(|t| t.id != task.id);
        inner.tasks.push(task);
        Ok(())
    }

    pub fn insert_job_target(&self, job: JobTarget) -> AppResult<()> {
        self.lock()?.job_targets.insert(job.id.clone(), job);
        Ok(())
    }

    pub fn insert_resume(&self, resume: Resume) -> AppResult<()> {
        self.lock()?.resumes.insert(resume.id.clone(), resume);
        Ok(())
    }

    pub fn insert_profile(&self, profile: Profile) -> AppResult<()> {
        self.lock()?.profiles.insert(profile.user_id.clone(), profile);
        Ok(())
    }

    pub fn insert_file(&self, storage_path: impl Into<String>, bytes: Vec<u8>) -> AppResult<()> {
        self.lock()?.files.insert(storage_path.into(), bytes);
        Ok(())
    }

    // ========== 查询（供测试和统计使用） ==========

    pub fn task(&self, id: &str) -> Option<Task> {
        self.lock().ok()?.tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn job_target(&self, id: &str) -> Option<JobTarget> {
        self.lock().ok()?.job_targets.get(id).cloned()
    }

    pub fn events_for(&self, task_id: &str) -> Vec<TaskEvent> {
        self.lock()
            .map(|inner| {
                inner
                    .events
                    .iter()
                    .filter(|e| e.task_id == task_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn artifact_records(&self) -> Vec<ArtifactRecord> {
        self.lock().map(|inner| inner.artifacts.clone()).unwrap_or_default()
    }

    pub fn file(&self, storage_path: &str) -> Option<Vec<u8>> {
        self.lock().ok()?.files.get(storage_path).cloned()
    }

    pub fn content_type(&self, storage_path: &str) -> Option<String> {
        self.lock().ok()?.content_types.get(storage_path).cloned()
    }

    pub fn count_by_status(&self, status: TaskStatus) -> usize {
        self.lock()
            .map(|inner| inner.tasks.iter().filter(|t| t.status == status).count())
            .unwrap_or(0)
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn fetch_one_queued(&self) -> AppResult<Option<Task>> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Queued)
            .min_by_key(|t| t.created_at)
            .cloned())
    }

    async fn compare_and_set_running(&self, task_id: &str, expected: TaskStatus) -> AppResult<Option<Task>> {
        let mut inner = self.lock()?;
        let Some(task) = inner.tasks.iter_mut().find(|t| t.id == task_id) else {
            return Ok(None);
        };
        if task.status != expected {
            debug!("任务 {} 当前状态为 {}，条件更新未命中", task_id, task.status);
            return Ok(None);
        }
        task.status = TaskStatus::Running;
        task.attempt += 1;
        task.started_at = Some(Utc::now());
        // 新一次执行：清掉上次留下的结果
        task.finished_at = None;
        task.error_code = None;
        task.error_message = None;
        task.result = None;
        task.required_inputs.clear();
        Ok(Some(task.clone()))
    }

    async fn get_job_target(&self, id: &str) -> AppResult<Option<JobTarget>> {
        Ok(self.lock()?.job_targets.get(id).cloned())
    }

    async fn get_resume(&self, id: &str) -> AppResult<Option<Resume>> {
        Ok(self.lock()?.resumes.get(id).cloned())
    }

    async fn get_profile(&self, user_id: &str) -> AppResult<Option<Profile>> {
        Ok(self.lock()?.profiles.get(user_id).cloned())
    }

    async fn update_task_status(&self, task_id: &str, status: TaskStatus, update: TaskUpdate) -> AppResult<()> {
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| AppError::not_found(RecordKind::Task, task_id))?;
        task.status = status;
        if let Some(code) = update.error_code {
            task.error_code = Some(code);
        }
        if let Some(message) = update.error_message {
            task.error_message = Some(message);
        }
        if let Some(result) = update.result {
            task.result = Some(result);
        }
        if let Some(inputs) = update.required_inputs {
            task.required_inputs = inputs;
        }
        if let Some(finished_at) = update.finished_at {
            task.finished_at = Some(finished_at);
        }
        Ok(())
    }

    async fn update_job_target_status(&self, job_target_id: &str, status: JobTargetStatus) -> AppResult<()> {
        let mut inner = self.lock()?;
        let job = inner
            .job_targets
            .get_mut(job_target_id)
            .ok_or_else(|| AppError::not_found(RecordKind::JobTarget, job_target_id))?;
        job.status = status;
        Ok(())
    }

    async fn append_event(
        &self,
        task_id: &str,
        level: EventLevel,
        message: &str,
        data: Option<JsonValue>,
    ) -> AppResult<()> {
        self.lock()?.events.push(TaskEvent {
            task_id: task_id.to_string(),
            level,
            message: message.to_string(),
            data,
            created_at: Utc::now(),
        });
        Ok(())
    }

    async fn download_file(&self, storage_path: &str) -> AppResult<Vec<u8>> {
        self.lock()?
            .files
            .get(storage_path)
            .cloned()
            .ok_or_else(|| AppError::not_found(RecordKind::File, storage_path))
    }

    async fn upload_file(&self, storage_path: &str, bytes: &[u8], content_type: &str) -> AppResult<()> {
        {
            let mut inner = self.lock()?;
            inner.files.insert(storage_path.to_string(), bytes.to_vec());
            inner
                .content_types
                .insert(storage_path.to_string(), content_type.to_string());
        }

        if let Some(dir) = &self.mirror_dir {
            let target = dir.join(storage_path.trim_start_matches('/'));
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, bytes).await?;
            debug!("上传文件已镜像到 {}", target.display());
        }
        Ok(())
    }

    async fn insert_artifact_records(&self, records: &[ArtifactRecord]) -> AppResult<()> {
        self.lock()?.artifacts.extend_from_slice(records);
        Ok(())
    }

    async fn list_stale_running(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<Task>> {
        let inner = self.lock()?;
        Ok(inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Running)
            .filter(|t| t.started_at.map_or(true, |started| started < cutoff))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_ok;

    #[tokio::test]
    async fn cas_only_succeeds_from_expected_status() {
        let store = MemoryStore::new();
        assert_ok!(store.insert_task(Task::queued("t1", "u1", "j1", "r1")));

        let first = assert_ok!(store.compare_and_set_running("t1", TaskStatus::Queued).await);
        let claimed = first.expect("第一次条件更新应成功");
        assert_eq!(claimed.status, TaskStatus::Running);
        assert_eq!(claimed.attempt, 1);
        assert!(claimed.started_at.is_some());

        let second = assert_ok!(store.compare_and_set_running("t1", TaskStatus::Queued).await);
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn fetch_queued_prefers_oldest() {
        let store = MemoryStore::new();
        let mut newer = Task::queued("new", "u", "j", "r");
        let mut older = Task::queued("old", "u", "j", "r");
        older.created_at = Utc::now() - chrono::Duration::minutes(5);
        newer.created_at = Utc::now();
        store.insert_task(newer).unwrap();
        store.insert_task(older).unwrap();

        let task = store.fetch_one_queued().await.unwrap().unwrap();
        assert_eq!(task.id, "old");
    }

    #[tokio::test]
    async fn update_leaves_unset_fields_alone() {
        let store = MemoryStore::new();
        store.insert_task(Task::queued("t", "u", "j", "r")).unwrap();
        store
            .update_task_status("t", TaskStatus::NeedsInput, TaskUpdate::default())
            .await
            .unwrap();
        let task = store.task("t").unwrap();
        assert_eq!(task.status, TaskStatus::NeedsInput);
        assert!(task.finished_at.is_none());
        assert!(task.error_code.is_none());
    }

    #[tokio::test]
    async fn missing_file_is_not_found() {
        let store = MemoryStore::new();
        let err = store.download_file("nope").await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { kind: RecordKind::File, .. }));
    }
}
