//! 投递上下文
//!
//! 封装一次适配器调用需要的全部输入：页面、资料、简历文件、人工答案和超时设置

use std::collections::HashMap;
use std::fmt::Display;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::infrastructure::FormPage;
use crate::models::Profile;
use crate::services::{ArtifactCollector, RetryConfig};

/// 一次投递的上下文
#[derive(Clone)]
pub struct ApplyContext {
    /// 任务ID（用于日志前缀）
    pub task_id: String,

    /// 职位原始链接
    pub job_url: String,

    pub page: Arc<dyn FormPage>,

    pub profile: Profile,

    /// 已下载到本地临时目录的简历
    pub resume_path: PathBuf,

    /// 人工补充的答案（字段名 → 值）
    pub user_inputs: HashMap<String, String>,

    /// 只填写不提交
    pub dry_run: bool,

    /// 等待表单出现的上限
    pub element_timeout: Duration,

    /// 点击提交后等待页面稳定的时间
    pub post_submit_wait: Duration,

    /// 单个 DOM 操作的重试策略
    pub retry: RetryConfig,

    pub artifacts: Arc<ArtifactCollector>,
}

impl ApplyContext {
    /// 创建新的投递上下文，超时取自配置
    pub fn new(
        task_id: impl Into<String>,
        job_url: impl Into<String>,
        page: Arc<dyn FormPage>,
        profile: Profile,
        resume_path: PathBuf,
        artifacts: Arc<ArtifactCollector>,
        config: &Config,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            job_url: job_url.into(),
            page,
            profile,
            resume_path,
            user_inputs: HashMap::new(),
            dry_run: config.dry_run,
            element_timeout: config.element_timeout(),
            post_submit_wait: config.post_submit_wait(),
            retry: field_retry(),
            artifacts,
        }
    }

    pub fn with_user_inputs(mut self, inputs: HashMap<String, String>) -> Self {
        self.user_inputs = inputs;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn page(&self) -> &dyn FormPage {
        self.page.as_ref()
    }
}

/// 表单操作比导航更轻，重试也更快
fn field_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 2,
        base_delay: Duration::from_millis(500),
        max_delay: Duration::from_secs(2),
        multiplier: 2.0,
    }
}

impl Display for ApplyContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[任务 {}]", self.task_id)
    }
}
