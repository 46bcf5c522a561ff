//! 带分类的指数退避重试

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::error_classifier::classify;
use crate::error::{AppError, AppResult};

/// 重试配置
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// 最多执行次数（含第一次）
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// 第 `attempt` 次失败后的等待：`min(max_delay, base * multiplier^(attempt-1))`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let millis = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped.max(0.0) as u64)
    }
}

/// 重试执行 `operation`，退避使用 tokio 的 sleep
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    with_retry_sleep(config, operation, tokio::time::sleep).await
}

/// 同 [`with_retry`]，但由调用方提供 sleep 实现
///
/// 每次失败都会分类：不可重试、或已超过该类别自身的重试上限时立即返回错误；
/// 用完全部次数后返回最后一次的错误。
pub async fn with_retry_sleep<T, F, Fut, S, SFut>(config: &RetryConfig, mut operation: F, mut sleeper: S) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
    S: FnMut(Duration) -> SFut,
    SFut: Future<Output = ()>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        let error: AppError = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let classified = classify(&error);
        if !classified.retryable {
            debug!("错误不可重试 ({}): {}", classified.category, classified.message);
            return Err(error);
        }
        if attempt > classified.max_retries {
            debug!(
                "{} 类错误已达重试上限 {}: {}",
                classified.category, classified.max_retries, classified.message
            );
            return Err(error);
        }
        if attempt >= max_attempts {
            warn!("重试 {} 次后仍失败: {}", attempt, classified.message);
            return Err(error);
        }

        let delay = config.delay_for_attempt(attempt);
        warn!(
            "第 {}/{} 次尝试失败 ({})，{:?} 后重试: {}",
            attempt, max_attempts, classified.category, delay, classified.message
        );
        sleeper(delay).await;
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;

    fn recording_sleeper(log: Rc<RefCell<Vec<Duration>>>) -> impl FnMut(Duration) -> std::future::Ready<()> {
        move |d| {
            log.borrow_mut().push(d);
            std::future::ready(())
        }
    }

    #[test]
    fn delay_grows_and_caps() {
        let config = RetryConfig::default();
        assert_eq!(config.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(config.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(config.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(config.delay_for_attempt(10), Duration::from_secs(10));
    }

    #[tokio::test]
    async fn succeeds_after_two_failures_with_two_sleeps() {
        let config = RetryConfig::default();
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let calls = RefCell::new(0);

        let result = with_retry_sleep(
            &config,
            || {
                *calls.borrow_mut() += 1;
                let n = *calls.borrow();
                async move {
                    if n <= 2 {
                        Err(AppError::Network("net::ERR_CONNECTION_RESET".into()))
                    } else {
                        Ok("done")
                    }
                }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

        assert_eq!(result.ok(), Some("done"));
        assert_eq!(*calls.borrow(), 3);
        let sleeps = sleeps.borrow();
        assert_eq!(sleeps.len(), 2);
        assert!(sleeps[1] > sleeps[0]);
    }

    #[tokio::test]
    async fn non_retryable_error_aborts_immediately() {
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let calls = RefCell::new(0);

        let result: AppResult<()> = with_retry_sleep(
            &RetryConfig::default(),
            || {
                *calls.borrow_mut() += 1;
                async { Err(AppError::other("session expired")) }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 1);
        assert!(sleeps.borrow().is_empty());
    }

    #[tokio::test]
    async fn category_ceiling_limits_retries() {
        // VALIDATION 只允许重试 1 次
        let config = RetryConfig {
            max_attempts: 5,
            ..Default::default()
        };
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let calls = RefCell::new(0);

        let result: AppResult<()> = with_retry_sleep(
            &config,
            || {
                *calls.borrow_mut() += 1;
                async { Err(AppError::other("validation failed: email is required")) }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*calls.borrow(), 2);
        assert_eq!(sleeps.borrow().len(), 1);
    }

    #[tokio::test]
    async fn exhausting_attempts_returns_last_error() {
        let config = RetryConfig {
            max_attempts: 2,
            ..Default::default()
        };
        let sleeps = Rc::new(RefCell::new(Vec::new()));
        let calls = RefCell::new(0u32);

        let result: AppResult<()> = with_retry_sleep(
            &config,
            || {
                *calls.borrow_mut() += 1;
                let n = *calls.borrow();
                async move { Err(AppError::Timeout(format!("attempt {n}"))) }
            },
            recording_sleeper(sleeps.clone()),
        )
        .await;

        match result {
            Err(AppError::Timeout(msg)) => assert_eq!(msg, "attempt 2"),
            other => panic!("unexpected: {other:?}"),
        }
        assert_eq!(sleeps.borrow().len(), 1);
    }
}
