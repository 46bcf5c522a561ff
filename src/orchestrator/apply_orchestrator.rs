//! 投递编排器 - 编排层
//!
//! ## 职责
//!
//! 为一次投递准备资源、调用适配器，并保证资源一定被释放。
//!
//! ## 处理顺序
//!
//! 1. **适配器解析**：按 URL 找第一个支持的适配器；找不到直接返回 `UNSUPPORTED_ATS`，不做任何浏览器操作
//! 2. **限速**：等待该域名的请求名额
//! 3. **产物采集器**：为任务创建独立的临时目录
//! 4. **简历下载**：写入临时目录
//! 5. **浏览器页面**：受并发上限约束，超限立即失败
//! 6. **导航**：带退避重试
//! 7. **预检**：页面已被拦截（验证码、限流、已申请）时保存现场并返回 `blocked`，不调用适配器
//! 8. **适配器执行**
//! 9. **产物上传**：截图路径合并进结果
//! 10. **清理**：关闭页面、删除简历和产物临时目录，无论成功、失败还是 panic

use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;

use futures::FutureExt;
use tempfile::TempDir;
use tracing::{error, info, warn};

use crate::adapters::{AdapterRegistry, SiteAdapter};
use crate::config::Config;
use crate::error::{codes, AppError, AppResult};
use crate::infrastructure::BrowserProvider;
use crate::models::{ApplyResult, ApplyStatus, JobTarget, Profile, Resume, Task};
use crate::services::{
    classify, detect_blocking_condition, with_retry, ArtifactCollector, PageState, RateLimiter, RetryConfig,
};
use crate::store::Persistence;
use crate::workflow::ApplyContext;

/// 一次投递所需的已加载记录
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub task: Task,
    pub job: JobTarget,
    pub resume: Resume,
    pub profile: Profile,
}

/// 编排结果：适配器结果加上实际使用的适配器名称
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    pub result: ApplyResult,
    pub adapter: Option<&'static str>,
}

/// 投递编排器
pub struct ApplyOrchestrator {
    store: Arc<dyn Persistence>,
    browser: Arc<dyn BrowserProvider>,
    rate_limiter: Arc<RateLimiter>,
    registry: AdapterRegistry,
    config: Config,
    navigation_retry: RetryConfig,
    field_retry: Option<RetryConfig>,
}

impl ApplyOrchestrator {
    /// 创建编排器，使用默认的适配器注册表
    pub fn new(
        store: Arc<dyn Persistence>,
        browser: Arc<dyn BrowserProvider>,
        rate_limiter: Arc<RateLimiter>,
        config: Config,
    ) -> Self {
        Self {
            store,
            browser,
            rate_limiter,
            registry: AdapterRegistry::default(),
            config,
            navigation_retry: RetryConfig::default(),
            field_retry: None,
        }
    }

    /// 导航和表单操作的重试策略（测试中用来缩短退避）
    pub fn with_retry_config(mut self, navigation: RetryConfig, field: RetryConfig) -> Self {
        self.navigation_retry = navigation;
        self.field_retry = Some(field);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 执行一次投递；所有错误都转换为 `ApplyResult`
    pub async fn apply(&self, request: &ApplyRequest) -> ApplyOutcome {
        let task_id = request.task.id.as_str();
        let url = request.job.url.as_str();

        // ========== 适配器解析 ==========
        let Some(adapter) = self.registry.resolve(url) else {
            warn!("[任务 {}] ❌ 不支持的站点: {}", task_id, url);
            return ApplyOutcome {
                result: ApplyResult::failed(codes::UNSUPPORTED_ATS, format!("没有适配器支持该链接: {url}")),
                adapter: None,
            };
        };
        let adapter_name = adapter.name();
        info!("[任务 {}] 🔗 {} ({})", task_id, url, adapter_name);

        // ========== 限速 ==========
        self.rate_limiter.wait_for_slot(url).await;

        // ========== 产物采集器 ==========
        let collector = match ArtifactCollector::new(task_id) {
            Ok(collector) => Arc::new(collector),
            Err(e) => {
                error!("[任务 {}] 创建产物目录失败: {}", task_id, e);
                return ApplyOutcome {
                    result: ApplyResult::failed(codes::UNEXPECTED_ERROR, e.to_string()),
                    adapter: Some(adapter_name),
                };
            }
        };

        let result = self.apply_with_collector(request, adapter, collector.clone()).await;
        collector.cleanup();

        ApplyOutcome {
            result,
            adapter: Some(adapter_name),
        }
    }

    async fn apply_with_collector(
        &self,
        request: &ApplyRequest,
        adapter: Arc<dyn SiteAdapter>,
        collector: Arc<ArtifactCollector>,
    ) -> ApplyResult {
        let task_id = request.task.id.as_str();

        // ========== 简历下载 ==========
        let (resume_dir, resume_path) = match self.fetch_resume(&request.resume).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("[任务 {}] ❌ 简历下载失败: {}", task_id, e);
                return ApplyResult::failed(codes::RESUME_DOWNLOAD_FAILED, e.to_string());
            }
        };

        // ========== 浏览器页面 ==========
        let page = match self.browser.open_page().await {
            Ok(page) => page,
            Err(e) => {
                warn!("[任务 {}] ❌ 无法获取浏览器页面: {}", task_id, e);
                drop(resume_dir);
                return ApplyResult::failed(codes::BROWSER_UNAVAILABLE, e.to_string());
            }
        };

        let ctx = ApplyContext::new(
            task_id,
            request.job.url.clone(),
            page.clone(),
            request.profile.clone(),
            resume_path,
            collector.clone(),
            &self.config,
        )
        .with_user_inputs(request.task.user_inputs.clone());
        let ctx = match self.field_retry {
            Some(retry) => ctx.with_retry(retry),
            None => ctx,
        };

        let driven = AssertUnwindSafe(self.drive(&ctx, adapter.as_ref())).catch_unwind().await;
        let mut result = match driven {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("[任务 {}] ❌ 适配器 panic: {}", task_id, message);
                ApplyResult::failed(codes::ADAPTER_ERROR, format!("适配器 panic: {message}"))
            }
        };

        // ========== 产物 ==========
        self.capture_final_artifacts(&ctx, &result).await;
        match collector.persist(self.store.as_ref(), &request.task.user_id).await {
            Ok(screenshots) if !screenshots.is_empty() => result.screenshots = screenshots,
            Ok(_) => {}
            Err(e) => warn!("[任务 {}] ⚠️ 产物上传失败: {}", task_id, e),
        }

        // ========== 清理 ==========
        if let Err(e) = page.close().await {
            warn!("[任务 {}] 关闭页面失败: {}", task_id, e);
        }
        drop(resume_dir);

        result
    }

    /// 导航 → 预检 → 适配器
    async fn drive(&self, ctx: &ApplyContext, adapter: &dyn SiteAdapter) -> ApplyResult {
        let page = ctx.page();

        if let Err(e) = with_retry(&self.navigation_retry, || page.goto(&ctx.job_url)).await {
            let classified = classify(&e);
            warn!("{} ❌ 打开职位页失败 ({}): {}", ctx, classified.category, e);
            return ApplyResult::failed(
                codes::NAVIGATION_FAILED,
                format!("[{}] {}", classified.category, classified.message),
            );
        }

        let state = PageState::capture(page).await;
        if let Some(blocked) = detect_blocking_condition(&state) {
            warn!("{} ⛔ 页面已被拦截: {}", ctx, blocked);
            ctx.artifacts.try_screenshot(page, "preflight-blocked").await;
            if let Err(e) = ctx.artifacts.capture_html(page, "preflight-blocked").await {
                warn!("{} 保存 HTML 快照失败: {}", ctx, e);
            }
            return ApplyResult::blocked(blocked.code, blocked.message);
        }

        adapter.apply(ctx).await
    }

    /// 失败或被拦截时保存最终截图和 HTML；控制台日志总是保存
    async fn capture_final_artifacts(&self, ctx: &ApplyContext, result: &ApplyResult) {
        let page = ctx.page();
        if matches!(result.status, ApplyStatus::Failed | ApplyStatus::Blocked) {
            ctx.artifacts.try_screenshot(page, "final").await;
            if let Err(e) = ctx.artifacts.capture_html(page, "final").await {
                warn!("{} 保存 HTML 快照失败: {}", ctx, e);
            }
        }
        if let Err(e) = ctx.artifacts.capture_console_log(page, "console").await {
            warn!("{} 保存控制台日志失败: {}", ctx, e);
        }
    }

    /// 下载简历到独立的临时目录；目录随返回的 TempDir 一起删除
    async fn fetch_resume(&self, resume: &Resume) -> AppResult<(TempDir, PathBuf)> {
        let bytes = self.store.download_file(&resume.storage_path).await?;
        if bytes.is_empty() {
            return Err(AppError::Storage(format!("简历文件为空: {}", resume.storage_path)));
        }
        let dir = tempfile::Builder::new().prefix("resume-").tempdir()?;
        let path = dir.path().join(resume.safe_file_name());
        tokio::fs::write(&path, &bytes).await?;
        Ok((dir, path))
    }
}

/// 从 panic 载荷中取出可读的消息
pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
