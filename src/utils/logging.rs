/// 日志工具模块
///
/// 负责初始化 tracing 订阅者，并提供启动/统计类日志的辅助函数
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化全局日志
///
/// 优先使用 `RUST_LOG`，否则使用配置中的日志级别。重复调用是安全的（测试中常见）。
pub fn init(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.verbose_logging)
        .with_thread_ids(config.verbose_logging)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 投递工作进程启动: {}", config.worker_id);
    info!("📊 浏览器并发上限: {}", config.max_concurrent_browsers);
    info!("⏱️ 轮询间隔: {} 秒", config.poll_interval_secs);
    if config.dry_run {
        info!("🧪 DRY RUN 模式：只填表，不提交");
    }
    info!("{}", "=".repeat(60));
}

/// 工作进程累计统计
#[derive(Debug, Default, Clone)]
pub struct WorkerStats {
    pub succeeded: usize,
    pub failed: usize,
    pub blocked: usize,
    pub needs_input: usize,
}

impl WorkerStats {
    pub fn total(&self) -> usize {
        self.succeeded + self.failed + self.blocked + self.needs_input
    }
}

/// 打印最终统计信息
pub fn print_final_stats(stats: &WorkerStats) {
    info!("\n{}", "=".repeat(60));
    info!("📊 工作进程退出统计");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 成功: {}/{}", stats.succeeded, stats.total());
    info!("⛔ 被拦截: {}", stats.blocked);
    info!("✋ 等待人工输入: {}", stats.needs_input);
    info!("❌ 失败: {}", stats.failed);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
