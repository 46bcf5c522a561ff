use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// 调试产物类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    Screenshot,
    HtmlSnapshot,
    ConsoleLog,
}

impl ArtifactKind {
    pub fn extension(self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "png",
            ArtifactKind::HtmlSnapshot => "html",
            ArtifactKind::ConsoleLog => "log",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ArtifactKind::Screenshot => "image/png",
            ArtifactKind::HtmlSnapshot => "text/html; charset=utf-8",
            ArtifactKind::ConsoleLog => "text/plain; charset=utf-8",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArtifactKind::Screenshot => "screenshot",
            ArtifactKind::HtmlSnapshot => "html_snapshot",
            ArtifactKind::ConsoleLog => "console_log",
        };
        f.write_str(name)
    }
}

/// 采集到的产物（由单个任务的 ArtifactCollector 独占）
#[derive(Debug, Clone)]
pub struct Artifact {
    pub kind: ArtifactKind,
    pub label: String,
    /// 临时目录中的本地路径
    pub local_path: PathBuf,
    /// 上传后的远端路径
    pub storage_path: Option<String>,
    pub captured_at: DateTime<Utc>,
    pub metadata: JsonValue,
}

/// 写入存储层的产物记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactRecord {
    pub task_id: String,
    pub kind: ArtifactKind,
    pub storage_path: String,
    pub captured_at: DateTime<Utc>,
    pub metadata: JsonValue,
}
