use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::target::{
    CreateBrowserContextParams, CreateTargetParams, DisposeBrowserContextParams,
};
use chromiumoxide::{Browser, BrowserConfig};
use futures::StreamExt;
use tokio::sync::{Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::chrome_page::ChromePage;
use super::dom::{BrowserProvider, FormPage};
use crate::config::Config;
use crate::error::{AppError, AppResult};

/// 浏览器池：持有唯一的 Browser，并用信号量限制同时打开的上下文数量
pub struct ChromeBrowserPool {
    browser: Arc<AsyncMutex<Option<Browser>>>,
    handler: std::sync::Mutex<Option<JoinHandle<()>>>,
    permits: Arc<Semaphore>,
    limit: usize,
    navigation_timeout: Duration,
    /// 连接的是外部浏览器时，退出时不关闭它
    owns_browser: bool,
}

impl ChromeBrowserPool {
    /// 按配置启动无头浏览器，或连接到已有浏览器的调试端口
    pub async fn from_config(config: &Config) -> AppResult<Self> {
        let (browser, handler, owns_browser) = match config.browser_debug_port {
            Some(port) => {
                let (browser, handler) = connect_to_browser(port).await?;
                (browser, handler, false)
            }
            None => {
                let (browser, handler) = launch_browser(
                    config.headless,
                    config.chrome_executable.as_deref(),
                    config.navigation_timeout(),
                )
                .await?;
                (browser, handler, true)
            }
        };

        Ok(Self {
            browser: Arc::new(AsyncMutex::new(Some(browser))),
            handler: std::sync::Mutex::new(Some(handler)),
            permits: Arc::new(Semaphore::new(config.max_concurrent_browsers)),
            limit: config.max_concurrent_browsers,
            navigation_timeout: config.navigation_timeout(),
            owns_browser,
        })
    }
}

#[async_trait]
impl BrowserProvider for ChromeBrowserPool {
    async fn open_page(&self) -> AppResult<Arc<dyn FormPage>> {
        // 超过上限立即失败，不排队
        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| AppError::BrowserBusy { limit: self.limit })?;

        let guard = self.browser.lock().await;
        let browser = guard
            .as_ref()
            .ok_or_else(|| AppError::Browser("浏览器已关闭".to_string()))?;

        let context_id = match browser.execute(CreateBrowserContextParams::default()).await {
            Ok(response) => Some(response.result.browser_context_id),
            Err(e) => {
                warn!("创建独立浏览器上下文失败，使用默认上下文: {}", e);
                None
            }
        };

        let mut target = CreateTargetParams::builder().url("about:blank");
        if let Some(id) = context_id.clone() {
            target = target.browser_context_id(id);
        }
        let page = match target.build() {
            Ok(target) => browser.new_page(target).await.map_err(AppError::from),
            Err(e) => Err(AppError::Browser(e)),
        };
        let page = match page {
            Ok(page) => page,
            Err(e) => {
                error!("创建新页面失败: {}", e);
                if let Some(id) = context_id {
                    dispose_context(browser, id).await;
                }
                return Err(e);
            }
        };
        drop(guard);

        debug!("已打开新页面 (剩余名额 {})", self.permits.available_permits());
        let page = ChromePage::attach(
            page,
            self.browser.clone(),
            context_id,
            self.navigation_timeout,
            permit,
        )
        .await?;
        Ok(Arc::new(page))
    }

    async fn shutdown(&self) -> AppResult<()> {
        let taken = self.browser.lock().await.take();
        if let Some(mut browser) = taken {
            if self.owns_browser {
                info!("🛑 正在关闭浏览器...");
                if let Err(e) = browser.close().await {
                    warn!("关闭浏览器失败: {}", e);
                }
                if let Err(e) = browser.wait().await {
                    warn!("等待浏览器进程退出失败: {}", e);
                }
            } else {
                info!("断开与外部浏览器的连接");
            }
        }
        if let Ok(mut handler) = self.handler.lock() {
            if let Some(handle) = handler.take() {
                handle.abort();
            }
        }
        Ok(())
    }
}

/// 释放页面创建失败时留下的浏览器上下文
async fn dispose_context(browser: &Browser, context_id: BrowserContextId) {
    if let Err(e) = browser.execute(DisposeBrowserContextParams::new(context_id)).await {
        warn!("释放浏览器上下文失败: {}", e);
    }
}

/// 在后台处理浏览器事件
fn spawn_handler(mut handler: chromiumoxide::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(h) = handler.next().await {
            if h.is_err() {
                break;
            }
        }
    })
}

/// 连接到已有浏览器
async fn connect_to_browser(port: u16) -> AppResult<(Browser, JoinHandle<()>)> {
    let browser_url = format!("http://localhost:{}", port);
    info!("正在连接到浏览器: {}", browser_url);

    let (browser, handler) = Browser::connect(&browser_url).await.map_err(|e| {
        error!("连接浏览器失败: {}", e);
        AppError::Browser(format!("无法连接到浏览器 (端口: {port}): {e}"))
    })?;
    let handle = spawn_handler(handler);

    // 添加短暂延迟以等待浏览器状态同步
    sleep(Duration::from_millis(300)).await;
    debug!("浏览器连接成功");
    Ok((browser, handle))
}

/// 启动浏览器
async fn launch_browser(
    headless: bool,
    executable: Option<&Path>,
    request_timeout: Duration,
) -> AppResult<(Browser, JoinHandle<()>)> {
    info!("🚀 启动浏览器 (headless: {})...", headless);

    let mut builder = BrowserConfig::builder();
    builder = if headless {
        builder.new_headless_mode()
    } else {
        builder.with_head()
    };
    if let Some(path) = executable {
        builder = builder.chrome_executable(path);
    }
    let config = builder
        .request_timeout(request_timeout)
        .args(vec![
            "--disable-gpu",
            "--no-sandbox",
            "--disable-dev-shm-usage",
            "--disable-blink-features=AutomationControlled",
        ])
        .build()
        .map_err(|e| {
            error!("配置浏览器失败: {}", e);
            AppError::Browser(format!("配置浏览器失败: {e}"))
        })?;

    let (browser, handler) = Browser::launch(config).await.map_err(|e| {
        error!("启动浏览器失败: {}", e);
        AppError::Browser(format!("启动浏览器失败: {e}"))
    })?;
    let handle = spawn_handler(handler);

    sleep(Duration::from_millis(300)).await;
    info!("✅ 浏览器已启动");
    Ok((browser, handle))
}
