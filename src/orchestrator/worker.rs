//! 工作进程主循环 - 编排层
//!
//! ## 职责
//!
//! 1. **启动**：可选地回收超时未结束的任务
//! 2. **轮询**：领取一个任务并执行完毕后才领取下一个；队列为空时休眠一个轮询间隔
//! 3. **停止**：收到取消信号后不再领取新任务；当前任务执行完毕后退出
//! 4. **收尾**：关闭浏览器，输出统计
//!
//! 单个任务的任何失败都不会让循环退出。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::task_runner::{RunReport, TaskRunner};
use crate::config::Config;
use crate::infrastructure::BrowserProvider;
use crate::models::{ApplyStatus, TaskStatus};
use crate::utils::logging::{print_final_stats, WorkerStats};

/// 工作进程
pub struct Worker {
    runner: TaskRunner,
    browser: Arc<dyn BrowserProvider>,
    config: Config,
    shutdown: CancellationToken,
    stats: WorkerStats,
}

impl Worker {
    pub fn new(runner: TaskRunner, browser: Arc<dyn BrowserProvider>, config: Config) -> Self {
        Self {
            runner,
            browser,
            config,
            shutdown: CancellationToken::new(),
            stats: WorkerStats::default(),
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn stats(&self) -> &WorkerStats {
        &self.stats
    }

    /// 运行直到收到停止信号
    pub async fn run(mut self) -> WorkerStats {
        info!("👷 工作进程 {} 开始轮询", self.runner.worker_id());
        self.reap_on_startup().await;

        while !self.shutdown.is_cancelled() {
            let processed = self.tick().await;
            if processed {
                continue;
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        info!("🛑 收到停止信号，工作进程退出");
        if let Err(e) = self.browser.shutdown().await {
            warn!("关闭浏览器失败: {}", e);
        }
        print_final_stats(&self.stats);
        self.stats
    }

    /// 领取并执行一个任务；返回是否处理了任务
    pub async fn tick(&mut self) -> bool {
        match self.runner.claim_next().await {
            Ok(Some(task)) => {
                let report = self.runner.run(task).await;
                self.record(&report);
                true
            }
            Ok(None) => false,
            Err(e) => {
                error!("❌ 领取任务失败: {}", e);
                false
            }
        }
    }

    async fn reap_on_startup(&self) {
        let Some(max_age) = self.config.stale_task_timeout() else {
            return;
        };
        match self.runner.reap_stale_tasks(max_age).await {
            Ok(0) => {}
            Ok(n) => warn!("🧹 已回收 {} 个超时任务", n),
            Err(e) => error!("❌ 回收超时任务失败: {}", e),
        }
    }

    fn record(&mut self, report: &RunReport) {
        match (report.status, report.apply_status) {
            (TaskStatus::Succeeded, _) => self.stats.succeeded += 1,
            (TaskStatus::NeedsInput, _) => self.stats.needs_input += 1,
            (_, Some(ApplyStatus::Blocked)) => self.stats.blocked += 1,
            _ => self.stats.failed += 1,
        }
    }
}
