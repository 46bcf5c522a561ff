use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use auto_apply::store::load_seed_file;
use auto_apply::utils::logging;
use auto_apply::{ApplyOrchestrator, ChromeBrowserPool, Config, MemoryStore, RateLimiter, TaskRunner, Worker};

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置
    let config = Config::from_env();

    // 初始化日志
    logging::init(&config);
    logging::log_startup(&config);

    // 存储
    let mut store = MemoryStore::new();
    if let Some(dir) = &config.upload_dir {
        store = store.with_mirror_dir(dir);
    }
    if let Some(seed) = &config.seed_file {
        let count = load_seed_file(&store, seed).await?;
        info!("🌱 已从 {} 载入 {} 个任务", seed.display(), count);
    } else {
        warn!("⚠️ 未设置 SEED_FILE，队列为空");
    }
    let store = Arc::new(store);

    // 浏览器
    let browser = Arc::new(
        ChromeBrowserPool::from_config(&config)
            .await
            .context("无法启动或连接浏览器")?,
    );

    let orchestrator = ApplyOrchestrator::new(
        store.clone(),
        browser.clone(),
        Arc::new(RateLimiter::new()),
        config.clone(),
    );
    let runner = TaskRunner::new(store, orchestrator, config.worker_id.clone());
    let worker = Worker::new(runner, browser, config);

    // Ctrl-C：不再领取新任务，当前任务完成后退出
    let shutdown = worker.shutdown_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("⏹️ 收到 Ctrl-C，等待当前任务完成...");
            shutdown.cancel();
        }
    });

    worker.run().await;
    Ok(())
}
