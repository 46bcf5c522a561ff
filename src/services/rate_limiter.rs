//! 按域名的最小请求间隔
//!
//! 状态只保存在进程内存中，重启即清空；多个工作进程之间不共享。

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tracing::debug;

use crate::utils::url::registrable_domain;

/// 默认最小间隔
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(3000);

/// 对已知 ATS 域名更严格的间隔
const DOMAIN_OVERRIDES: &[(&str, u64)] = &[
    ("greenhouse.io", 5000),
    ("lever.co", 5000),
    ("ashbyhq.com", 5000),
    ("myworkdayjobs.com", 10000),
];

/// 非阻塞的状态查询结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotStatus {
    pub can_request: bool,
    /// 距离可以请求还需等待的时间
    pub wait: Duration,
}

#[derive(Debug)]
struct LimiterState {
    limits: HashMap<String, Duration>,
    /// 每个域名下一个可用时间点
    next_slot: HashMap<String, Instant>,
}

/// 域名限速器
#[derive(Debug)]
pub struct RateLimiter {
    default_interval: Duration,
    state: Mutex<LimiterState>,
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

impl RateLimiter {
    /// 创建带有内置域名覆盖表的限速器
    pub fn new() -> Self {
        let limits = DOMAIN_OVERRIDES
            .iter()
            .map(|(domain, ms)| (domain.to_string(), Duration::from_millis(*ms)))
            .collect();
        Self {
            default_interval: DEFAULT_INTERVAL,
            state: Mutex::new(LimiterState {
                limits,
                next_slot: HashMap::new(),
            }),
        }
    }

    /// 修改默认间隔（测试 / 配置覆盖）
    pub fn with_default_interval(mut self, interval: Duration) -> Self {
        self.default_interval = interval;
        self
    }

    /// 运行时修改某个域名的间隔
    pub fn set_domain_limit(&self, domain: &str, interval: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.limits.insert(domain.to_lowercase(), interval);
        }
    }

    /// 某个域名当前生效的间隔
    pub fn interval_for(&self, domain: &str) -> Duration {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.limits.get(domain).copied())
            .unwrap_or(self.default_interval)
    }

    /// 等待该 URL 所在域名的下一个请求名额
    ///
    /// 在锁内预订名额、锁外睡眠，同一域名的并发调用按预订顺序排开。
    pub async fn wait_for_slot(&self, url: &str) {
        let domain = domain_key(url);
        let deadline = {
            let Ok(mut state) = self.state.lock() else {
                return;
            };
            let interval = state
                .limits
                .get(&domain)
                .copied()
                .unwrap_or(self.default_interval);
            let now = Instant::now();
            let slot = match state.next_slot.get(&domain) {
                Some(next) if *next > now => *next,
                _ => now,
            };
            state.next_slot.insert(domain.clone(), slot + interval);
            slot
        };

        let now = Instant::now();
        if deadline > now {
            debug!("⏳ 域名 {} 限速，等待 {:?}", domain, deadline - now);
            sleep_until(deadline).await;
        }
    }

    /// 非阻塞地查看能否立即请求
    pub fn get_status(&self, url: &str) -> SlotStatus {
        let domain = domain_key(url);
        let now = Instant::now();
        let next = self
            .state
            .lock()
            .ok()
            .and_then(|state| state.next_slot.get(&domain).copied());
        match next {
            Some(next) if next > now => SlotStatus {
                can_request: false,
                wait: next - now,
            },
            _ => SlotStatus {
                can_request: true,
                wait: Duration::ZERO,
            },
        }
    }
}

fn domain_key(url: &str) -> String {
    registrable_domain(url).unwrap_or_else(|| url.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn same_domain_waits_for_interval() {
        let limiter = RateLimiter::new();
        let start = Instant::now();
        limiter.wait_for_slot("https://boards.greenhouse.io/acme/jobs/1").await;
        let first = Instant::now();
        limiter.wait_for_slot("https://boards.greenhouse.io/acme/jobs/2").await;
        let second = Instant::now();

        assert_eq!(first - start, Duration::ZERO);
        assert!(second - first >= Duration::from_millis(5000));
    }

    #[tokio::test(start_paused = true)]
    async fn different_domains_do_not_block_each_other() {
        let limiter = RateLimiter::new();
        limiter.wait_for_slot("https://jobs.lever.co/acme/1").await;
        let before = Instant::now();
        limiter.wait_for_slot("https://boards.greenhouse.io/acme/jobs/1").await;
        assert_eq!(Instant::now() - before, Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn status_reports_remaining_wait() {
        let limiter = RateLimiter::new();
        let url = "https://careers.example.com/apply";
        assert!(limiter.get_status(url).can_request);

        limiter.wait_for_slot(url).await;
        let status = limiter.get_status(url);
        assert!(!status.can_request);
        assert_eq!(status.wait, DEFAULT_INTERVAL);

        tokio::time::advance(DEFAULT_INTERVAL).await;
        assert!(limiter.get_status(url).can_request);
    }

    #[tokio::test(start_paused = true)]
    async fn domain_limit_is_mutable() {
        let limiter = RateLimiter::new();
        limiter.set_domain_limit("example.com", Duration::from_millis(200));
        assert_eq!(limiter.interval_for("example.com"), Duration::from_millis(200));

        limiter.wait_for_slot("https://a.example.com/x").await;
        let before = Instant::now();
        limiter.wait_for_slot("https://b.example.com/y").await;
        assert_eq!(Instant::now() - before, Duration::from_millis(200));
    }

    #[test]
    fn workday_uses_stricter_interval() {
        let limiter = RateLimiter::new();
        assert_eq!(limiter.interval_for("myworkdayjobs.com"), Duration::from_millis(10000));
        assert_eq!(limiter.interval_for("unknown.org"), DEFAULT_INTERVAL);
    }
}
