//! 调试产物采集
//!
//! 每个任务一个采集器，独占一个临时目录；截图、HTML 快照和控制台日志先写到本地，
//! 再统一上传到存储层。临时目录在 `cleanup`（或 Drop）时无条件删除。

use std::sync::Mutex;

use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};
use crate::infrastructure::FormPage;
use crate::models::{Artifact, ArtifactKind, ArtifactRecord};
use crate::store::Persistence;

/// 产物采集器
pub struct ArtifactCollector {
    task_id: String,
    dir: Mutex<Option<TempDir>>,
    artifacts: Mutex<Vec<Artifact>>,
}

impl ArtifactCollector {
    /// 为任务创建采集器及其临时目录
    pub fn new(task_id: impl Into<String>) -> AppResult<Self> {
        let task_id = task_id.into();
        let dir = tempfile::Builder::new()
            .prefix(&format!("artifacts-{}-", sanitize(&task_id)))
            .tempdir()?;
        Ok(Self {
            task_id,
            dir: Mutex::new(Some(dir)),
            artifacts: Mutex::new(Vec::new()),
        })
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// 已采集的产物
    pub fn artifacts(&self) -> Vec<Artifact> {
        self.artifacts.lock().map(|a| a.clone()).unwrap_or_default()
    }

    /// 截图
    pub async fn capture_screenshot(&self, page: &dyn FormPage, label: &str) -> AppResult<Artifact> {
        let bytes = page.screenshot().await?;
        let url = page.current_url().await.unwrap_or_default();
        self.store(ArtifactKind::Screenshot, label, &bytes, json!({ "url": url }))
    }

    /// 当前页面的 HTML
    pub async fn capture_html(&self, page: &dyn FormPage, label: &str) -> AppResult<Artifact> {
        let html = page.html().await?;
        let url = page.current_url().await.unwrap_or_default();
        self.store(ArtifactKind::HtmlSnapshot, label, html.as_bytes(), json!({ "url": url }))
    }

    /// 到目前为止的控制台与页面错误；没有任何记录时返回 None
    pub async fn capture_console_log(&self, page: &dyn FormPage, label: &str) -> AppResult<Option<Artifact>> {
        let entries = page.console_entries().await;
        if entries.is_empty() {
            return Ok(None);
        }
        let text = entries
            .iter()
            .map(|e| format!("[{}] {}", e.level, e.text))
            .collect::<Vec<_>>()
            .join("\n");
        let errors = entries
            .iter()
            .filter(|e| e.level == "error" || e.level == "pageerror")
            .count();
        self.store(
            ArtifactKind::ConsoleLog,
            label,
            text.as_bytes(),
            json!({ "entries": entries.len(), "errors": errors }),
        )
        .map(Some)
    }

    /// 尽力截图，失败只记日志
    pub async fn try_screenshot(&self, page: &dyn FormPage, label: &str) -> Option<Artifact> {
        match self.capture_screenshot(page, label).await {
            Ok(artifact) => Some(artifact),
            Err(e) => {
                warn!("[任务 {}] 截图失败 ({}): {}", self.task_id, label, e);
                None
            }
        }
    }

    fn store(&self, kind: ArtifactKind, label: &str, bytes: &[u8], metadata: JsonValue) -> AppResult<Artifact> {
        let captured_at = Utc::now();
        let file_name = format!(
            "{}_{}.{}",
            captured_at.format("%Y%m%dT%H%M%S%3f"),
            sanitize(label),
            kind.extension()
        );

        let local_path = {
            let dir = self
                .dir
                .lock()
                .map_err(|_| AppError::other("产物目录锁已中毒"))?;
            let dir = dir
                .as_ref()
                .ok_or_else(|| AppError::other("产物目录已清理"))?;
            dir.path().join(&file_name)
        };
        std::fs::write(&local_path, bytes)?;

        let artifact = Artifact {
            kind,
            label: label.to_string(),
            local_path,
            storage_path: None,
            captured_at,
            metadata,
        };
        debug!("[任务 {}] 采集 {}: {}", self.task_id, kind, file_name);
        if let Ok(mut artifacts) = self.artifacts.lock() {
            artifacts.push(artifact.clone());
        }
        Ok(artifact)
    }

    /// 上传尚未上传的产物并写入产物记录，返回所有截图的存储路径
    ///
    /// 单个文件上传失败只跳过该文件。
    pub async fn persist(&self, store: &dyn Persistence, user_id: &str) -> AppResult<Vec<String>> {
        let pending: Vec<(usize, Artifact)> = self
            .artifacts()
            .into_iter()
            .enumerate()
            .filter(|(_, a)| a.storage_path.is_none())
            .collect();

        let mut records = Vec::new();
        let mut uploaded = Vec::new();
        for (index, artifact) in pending {
            let Some(file_name) = artifact.local_path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            let storage_path = format!("{}/{}/{}", user_id, self.task_id, file_name);
            let bytes = match tokio::fs::read(&artifact.local_path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("[任务 {}] 读取产物失败 {}: {}", self.task_id, artifact.local_path.display(), e);
                    continue;
                }
            };
            if let Err(e) = store
                .upload_file(&storage_path, &bytes, artifact.kind.content_type())
                .await
            {
                warn!("[任务 {}] 上传产物失败 {}: {}", self.task_id, storage_path, e);
                continue;
            }
            records.push(ArtifactRecord {
                task_id: self.task_id.clone(),
                kind: artifact.kind,
                storage_path: storage_path.clone(),
                captured_at: artifact.captured_at,
                metadata: artifact.metadata.clone(),
            });
            uploaded.push((index, storage_path));
        }

        if !records.is_empty() {
            store.insert_artifact_records(&records).await?;
        }

        if let Ok(mut artifacts) = self.artifacts.lock() {
            for (index, path) in uploaded {
                if let Some(artifact) = artifacts.get_mut(index) {
                    artifact.storage_path = Some(path);
                }
            }
        }

        Ok(self
            .artifacts()
            .into_iter()
            .filter(|a| a.kind == ArtifactKind::Screenshot)
            .filter_map(|a| a.storage_path)
            .collect())
    }

    /// 删除临时目录
    pub fn cleanup(&self) {
        let taken = self.dir.lock().ok().and_then(|mut d| d.take());
        if let Some(dir) = taken {
            let path = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("[任务 {}] 删除产物目录失败 {}: {}", self.task_id, path.display(), e);
            }
        }
    }
}

fn sanitize(label: &str) -> String {
    label
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::FakePage;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn captures_and_persists_under_task_prefix() {
        let page = FakePage::new("https://jobs.lever.co/acme/1")
            .with_body_text("hello")
            .with_console("error", "Uncaught TypeError");
        let collector = ArtifactCollector::new("task-1").unwrap();

        collector.capture_screenshot(&page, "after fill").await.unwrap();
        collector.capture_html(&page, "final").await.unwrap();
        let log = collector.capture_console_log(&page, "console").await.unwrap();
        assert!(log.is_some());

        let store = MemoryStore::new();
        let screenshots = collector.persist(&store, "user-1").await.unwrap();

        assert_eq!(screenshots.len(), 1);
        assert!(screenshots[0].starts_with("user-1/task-1/"));
        assert!(screenshots[0].ends_with("_after_fill.png"));

        let records = store.artifact_records();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.task_id == "task-1"));
        assert_eq!(store.content_type(&screenshots[0]).as_deref(), Some("image/png"));

        // 再次持久化不会重复上传
        collector.persist(&store, "user-1").await.unwrap();
        assert_eq!(store.artifact_records().len(), 3);
    }

    #[tokio::test]
    async fn empty_console_produces_no_artifact() {
        let page = FakePage::new("https://example.com");
        let collector = ArtifactCollector::new("t").unwrap();
        assert!(collector.capture_console_log(&page, "console").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn cleanup_removes_temp_dir() {
        let page = FakePage::new("https://example.com");
        let collector = ArtifactCollector::new("t").unwrap();
        let artifact = collector.capture_screenshot(&page, "x").await.unwrap();
        let dir = artifact.local_path.parent().unwrap().to_path_buf();
        assert!(dir.exists());

        collector.cleanup();
        assert!(!dir.exists());
        // 清理后再采集报错而不是 panic
        assert!(collector.capture_screenshot(&page, "y").await.is_err());
    }
}
