use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::url::{detect_site_type, normalize_url};

/// ATS 站点类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiteType {
    Greenhouse,
    Lever,
    Ashby,
    Workday,
    Unknown,
}

impl fmt::Display for SiteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SiteType::Greenhouse => "greenhouse",
            SiteType::Lever => "lever",
            SiteType::Ashby => "ashby",
            SiteType::Workday => "workday",
            SiteType::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// 职位状态，镜像最近一次任务的结果类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobTargetStatus {
    New,
    Queued,
    Applying,
    Applied,
    Failed,
    Blocked,
    NeedsInput,
}

impl JobTargetStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            JobTargetStatus::New => "new",
            JobTargetStatus::Queued => "queued",
            JobTargetStatus::Applying => "applying",
            JobTargetStatus::Applied => "applied",
            JobTargetStatus::Failed => "failed",
            JobTargetStatus::Blocked => "blocked",
            JobTargetStatus::NeedsInput => "needs_input",
        }
    }
}

impl fmt::Display for JobTargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 目标职位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobTarget {
    pub id: String,
    pub user_id: String,
    pub url: String,
    /// 去重键
    pub normalized_url: String,
    pub site_type: SiteType,
    pub status: JobTargetStatus,
}

impl JobTarget {
    /// 从 URL 创建，自动计算规范化 URL 和站点类型
    pub fn new(id: impl Into<String>, user_id: impl Into<String>, url: impl Into<String>) -> Self {
        let url = url.into();
        Self {
            id: id.into(),
            user_id: user_id.into(),
            normalized_url: normalize_url(&url),
            site_type: detect_site_type(&url),
            url,
            status: JobTargetStatus::New,
        }
    }
}
