use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

/// 程序配置（全部来自环境变量）
#[derive(Clone, Debug)]
pub struct Config {
    /// 工作进程名称（用于日志和事件）
    pub worker_id: String,
    /// 队列为空时的轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 同时打开的浏览器上下文上限
    pub max_concurrent_browsers: usize,
    /// 只填表不提交
    pub dry_run: bool,
    /// 页面导航超时（毫秒）
    pub navigation_timeout_ms: u64,
    /// 等待表单出现的超时（毫秒）
    pub element_timeout_ms: u64,
    /// 点击提交后等待页面稳定的时间（毫秒）
    pub post_submit_wait_ms: u64,
    /// 是否无头启动浏览器
    pub headless: bool,
    /// 浏览器调试端口（设置后连接已有浏览器而不是启动新浏览器）
    pub browser_debug_port: Option<u16>,
    /// 浏览器可执行文件路径
    pub chrome_executable: Option<PathBuf>,
    /// 内存存储的种子文件
    pub seed_file: Option<PathBuf>,
    /// 上传文件的本地镜像目录
    pub upload_dir: Option<PathBuf>,
    /// 超过该时长仍处于 running 的任务在启动时被回收（秒）
    pub stale_task_timeout_secs: Option<u64>,
    /// 日志级别
    pub log_level: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            worker_id: format!("worker-{}", std::process::id()),
            poll_interval_secs: 5,
            max_concurrent_browsers: 2,
            dry_run: false,
            navigation_timeout_ms: 30_000,
            element_timeout_ms: 10_000,
            post_submit_wait_ms: 3_000,
            headless: true,
            browser_debug_port: None,
            chrome_executable: None,
            seed_file: None,
            upload_dir: None,
            stale_task_timeout_secs: None,
            log_level: "info".to_string(),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let default = Self::default();
        Self {
            worker_id: std::env::var("WORKER_ID").unwrap_or(default.worker_id),
            poll_interval_secs: env_parse("POLL_INTERVAL_SECS").unwrap_or(default.poll_interval_secs),
            max_concurrent_browsers: env_parse("MAX_CONCURRENT_BROWSERS")
                .filter(|v: &usize| *v > 0)
                .unwrap_or(default.max_concurrent_browsers),
            dry_run: env_parse("DRY_RUN").unwrap_or(default.dry_run),
            navigation_timeout_ms: env_parse("NAVIGATION_TIMEOUT_MS").unwrap_or(default.navigation_timeout_ms),
            element_timeout_ms: env_parse("ELEMENT_TIMEOUT_MS").unwrap_or(default.element_timeout_ms),
            post_submit_wait_ms: env_parse("POST_SUBMIT_WAIT_MS").unwrap_or(default.post_submit_wait_ms),
            headless: env_parse("HEADLESS").unwrap_or(default.headless),
            browser_debug_port: env_parse("BROWSER_DEBUG_PORT"),
            chrome_executable: std::env::var("CHROME_EXECUTABLE").ok().map(PathBuf::from),
            seed_file: std::env::var("SEED_FILE").ok().map(PathBuf::from),
            upload_dir: std::env::var("UPLOAD_DIR").ok().map(PathBuf::from),
            stale_task_timeout_secs: env_parse("STALE_TASK_TIMEOUT_SECS"),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(default.log_level),
            verbose_logging: env_parse("VERBOSE_LOGGING").unwrap_or(default.verbose_logging),
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn element_timeout(&self) -> Duration {
        Duration::from_millis(self.element_timeout_ms)
    }

    pub fn post_submit_wait(&self) -> Duration {
        Duration::from_millis(self.post_submit_wait_ms)
    }

    pub fn stale_task_timeout(&self) -> Option<Duration> {
        self.stale_task_timeout_secs.map(Duration::from_secs)
    }
}

/// 读取并解析环境变量；格式错误时告警并返回 None（调用方回退到默认值）
fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = std::env::var(var).ok()?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("⚠️ 环境变量 {} 的值 '{}' 无法解析，使用默认值", var, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_conservative() {
        let config = Config::default();
        assert!(!config.dry_run);
        assert_eq!(config.max_concurrent_browsers, 2);
        assert_eq!(config.poll_interval(), Duration::from_secs(5));
        assert!(config.stale_task_timeout().is_none());
    }

    #[test]
    fn malformed_value_falls_back() {
        std::env::set_var("AUTO_APPLY_TEST_BAD_NUMBER", "not-a-number");
        let parsed: Option<u64> = env_parse("AUTO_APPLY_TEST_BAD_NUMBER");
        assert!(parsed.is_none());
        std::env::remove_var("AUTO_APPLY_TEST_BAD_NUMBER");
    }
}
