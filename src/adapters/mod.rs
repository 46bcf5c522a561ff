//! 站点适配器
//!
//! 每个 ATS 一个适配器：`supports` 按主机名判断，`apply` 驱动表单流程。
//! 新增站点只需新增一个实现并注册到 `AdapterRegistry`，分发逻辑不变。

pub mod ashby;
pub mod greenhouse;
pub mod lever;

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ApplyResult, Profile};
use crate::utils::url::host_matches;
use crate::workflow::ApplyContext;

pub use ashby::AshbyAdapter;
pub use greenhouse::GreenhouseAdapter;
pub use lever::LeverAdapter;

/// 站点适配器
#[async_trait]
pub trait SiteAdapter: Send + Sync {
    /// 用于日志和结果载荷
    fn name(&self) -> &'static str;

    /// 是否能处理该链接（纯函数，只看主机名）
    fn supports(&self, url: &str) -> bool;

    /// 执行投递；内部错误转换为 `ApplyResult`，不会返回 Err
    async fn apply(&self, ctx: &ApplyContext) -> ApplyResult;
}

/// 适配器注册表：第一个 `supports` 返回 true 的适配器胜出
#[derive(Clone)]
pub struct AdapterRegistry {
    adapters: Vec<Arc<dyn SiteAdapter>>,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
            .register(Arc::new(GreenhouseAdapter::new()))
            .register(Arc::new(LeverAdapter::new()))
            .register(Arc::new(AshbyAdapter::new()))
    }
}

impl AdapterRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self { adapters: Vec::new() }
    }

    pub fn register(mut self, adapter: Arc<dyn SiteAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<dyn SiteAdapter>> {
        self.adapters.iter().find(|a| a.supports(url)).cloned()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.adapters.iter().map(|a| a.name()).collect()
    }
}

// ========== 各站点共用的资料取值 ==========

pub(crate) fn first_name(p: &Profile) -> Option<String> {
    Some(p.first_name.clone())
}

pub(crate) fn last_name(p: &Profile) -> Option<String> {
    Some(p.last_name.clone())
}

pub(crate) fn full_name(p: &Profile) -> Option<String> {
    Some(p.full_name())
}

pub(crate) fn email(p: &Profile) -> Option<String> {
    Some(p.email.clone())
}

pub(crate) fn phone(p: &Profile) -> Option<String> {
    p.phone.clone()
}

pub(crate) fn linkedin(p: &Profile) -> Option<String> {
    p.linkedin_url.clone()
}

pub(crate) fn github(p: &Profile) -> Option<String> {
    p.github_url.clone()
}

pub(crate) fn portfolio(p: &Profile) -> Option<String> {
    p.portfolio_url.clone()
}

pub(crate) fn location(p: &Profile) -> Option<String> {
    p.location()
}

pub(crate) fn country(p: &Profile) -> Option<String> {
    p.country.clone()
}

pub(crate) fn current_company(p: &Profile) -> Option<String> {
    p.current_company.clone()
}

pub(crate) fn work_authorization(p: &Profile) -> Option<String> {
    p.work_authorization
        .map(|a| (if a.is_authorized() { "Yes" } else { "No" }).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_first_match_wins() {
        let registry = AdapterRegistry::default();
        assert_eq!(registry.names(), vec!["greenhouse", "lever", "ashby"]);

        let name = |url: &str| registry.resolve(url).map(|a| a.name());
        assert_eq!(name("https://boards.greenhouse.io/acme/jobs/123"), Some("greenhouse"));
        assert_eq!(name("https://job-boards.greenhouse.io/acme/jobs/123"), Some("greenhouse"));
        assert_eq!(name("https://jobs.lever.co/acme/abc"), Some("lever"));
        assert_eq!(name("https://jobs.ashbyhq.com/acme/abc"), Some("ashby"));
        assert_eq!(name("https://acme.wd1.myworkdayjobs.com/en-US/careers/job/1"), None);
        assert_eq!(name("not a url"), None);
    }

    #[test]
    fn host_matching_requires_label_boundary() {
        assert!(host_matches("https://greenhouse.io/x", "greenhouse.io"));
        assert!(host_matches("https://boards.greenhouse.io/x", "greenhouse.io"));
        assert!(!host_matches("https://notgreenhouse.io/x", "greenhouse.io"));
    }
}
