//! 基于 chromiumoxide 的 `FormPage` 实现
//!
//! DOM 查询统一通过注入的 JS 完成（见 `JsExecutor`），
//! 点击和文件上传走真实的 CDP 输入事件。

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chromiumoxide::cdp::browser_protocol::browser::BrowserContextId;
use chromiumoxide::cdp::browser_protocol::dom::SetFileInputFilesParams;
use chromiumoxide::cdp::browser_protocol::target::DisposeBrowserContextParams;
use chromiumoxide::cdp::js_protocol::runtime::{EventConsoleApiCalled, EventExceptionThrown};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use futures::StreamExt;
use serde_json::json;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit};
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, warn};

use super::dom::{ConsoleEntry, FormControl, FormPage, QuestionBlock};
use super::js_executor::JsExecutor;
use crate::error::{AppError, AppResult};

/// 所有 DOM 脚本共享的辅助函数
const HELPERS: &str = r#"
    const clean = (t) => (t || '').replace(/\s+/g, ' ').trim();
    const isVisible = (el) => {
        const style = window.getComputedStyle(el);
        const rect = el.getBoundingClientRect();
        return style.display !== 'none' && style.visibility !== 'hidden'
            && style.opacity !== '0' && (rect.width > 0 || rect.height > 0);
    };
    let seq = Number(window.__autoApplySeq || 0);
    const handleOf = (el) => {
        if (!el.dataset.autoApplyId) { seq += 1; el.dataset.autoApplyId = String(seq); }
        window.__autoApplySeq = seq;
        return `[data-auto-apply-id="${el.dataset.autoApplyId}"]`;
    };
    const describe = (el) => {
        const tag = el.tagName.toLowerCase();
        const type = tag === 'input' ? (el.type || 'text').toLowerCase() : '';
        const forLabel = el.id ? document.querySelector(`label[for="${CSS.escape(el.id)}"]`) : null;
        const ancestor = el.closest('label');
        return {
            selector: handleOf(el),
            tag,
            inputType: type,
            name: el.name || '',
            id: el.id || '',
            value: type === 'file'
                ? Array.from(el.files || []).map((f) => f.name).join(',')
                : (type === 'radio' || type === 'checkbox' ? (el.value || '') : clean(el.value)),
            labelFor: forLabel ? clean(forLabel.innerText) : null,
            ancestorLabel: ancestor ? clean(ancestor.innerText) : null,
            placeholder: el.placeholder || '',
            required: !!el.required || el.getAttribute('aria-required') === 'true',
            checked: !!el.checked,
            visible: type === 'file' || isVisible(el),
            options: tag === 'select'
                ? Array.from(el.options).map((o) => ({ value: o.value, text: clean(o.text), selected: o.selected }))
                : [],
        };
    };
"#;

const CONTROLS_JS: &str = r#"
    const out = [];
    for (const node of document.querySelectorAll(arg)) {
        if (node.matches('input, select, textarea')) out.push(node);
        else out.push(...node.querySelectorAll('input, select, textarea'));
    }
    return out.map(describe);
"#;

const QUESTIONS_JS: &str = r#"
    return Array.from(document.querySelectorAll(arg)).map((box) => {
        const labelEl = box.querySelector('label, legend, .application-label, .text, [class*="label"]');
        const label = labelEl ? clean(labelEl.innerText) : clean((box.innerText || '').split('\n')[0]);
        const controls = Array.from(box.querySelectorAll('input, select, textarea')).map(describe);
        return { label, controls };
    });
"#;

const VISIBLE_JS: &str = r#"
    return Array.from(document.querySelectorAll(arg)).some(isVisible);
"#;

const TEXTS_JS: &str = r#"
    return Array.from(document.querySelectorAll(arg)).filter(isVisible).map((el) => clean(el.innerText)).filter((t) => t.length > 0);
"#;

const FILL_JS: &str = r#"
    const el = document.querySelector(arg.selector);
    if (!el) return false;
    el.focus();
    const proto = el.tagName === 'TEXTAREA' ? HTMLTextAreaElement.prototype : HTMLInputElement.prototype;
    const setter = Object.getOwnPropertyDescriptor(proto, 'value').set;
    setter.call(el, arg.value);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    el.blur();
    return true;
"#;

const SELECT_JS: &str = r#"
    const el = document.querySelector(arg.selector);
    if (!el || el.tagName !== 'SELECT') return false;
    const setter = Object.getOwnPropertyDescriptor(HTMLSelectElement.prototype, 'value').set;
    setter.call(el, arg.value);
    el.dispatchEvent(new Event('input', { bubbles: true }));
    el.dispatchEvent(new Event('change', { bubbles: true }));
    return el.value === arg.value;
"#;

const CHECK_JS: &str = r#"
    const el = document.querySelector(arg);
    if (!el) return false;
    if (!el.checked) el.click();
    return !!el.checked;
"#;

const CLICK_TEXT_JS: &str = r#"
    const needle = arg.text.toLowerCase();
    const target = Array.from(document.querySelectorAll(arg.selector))
        .find((el) => isVisible(el) && clean(el.innerText || el.value).toLowerCase().includes(needle));
    if (!target) return false;
    target.click();
    return true;
"#;

fn script(body: &str) -> String {
    format!("(arg) => {{ {HELPERS} {body} }}")
}

/// 浏览器页面（一个独立的浏览器上下文）
pub struct ChromePage {
    executor: JsExecutor,
    browser: Arc<AsyncMutex<Option<Browser>>>,
    context_id: Option<BrowserContextId>,
    console: Arc<Mutex<Vec<ConsoleEntry>>>,
    navigation_timeout: Duration,
    permit: Mutex<Option<OwnedSemaphorePermit>>,
    closed: AtomicBool,
}

impl ChromePage {
    /// 包装新建的页面并开始采集控制台和页面错误事件
    pub(crate) async fn attach(
        page: Page,
        browser: Arc<AsyncMutex<Option<Browser>>>,
        context_id: Option<BrowserContextId>,
        navigation_timeout: Duration,
        permit: OwnedSemaphorePermit,
    ) -> AppResult<Self> {
        let console = Arc::new(Mutex::new(Vec::new()));

        let mut console_events = page.event_listener::<EventConsoleApiCalled>().await?;
        let sink = console.clone();
        tokio::spawn(async move {
            while let Some(event) = console_events.next().await {
                let text = event
                    .args
                    .iter()
                    .filter_map(|arg| {
                        arg.value
                            .as_ref()
                            .map(|v| v.as_str().map(str::to_string).unwrap_or_else(|| v.to_string()))
                            .or_else(|| arg.description.clone())
                    })
                    .collect::<Vec<_>>()
                    .join(" ");
                let level = format!("{:?}", event.r#type).to_lowercase();
                if let Ok(mut entries) = sink.lock() {
                    entries.push(ConsoleEntry { level, text });
                }
            }
        });

        let mut error_events = page.event_listener::<EventExceptionThrown>().await?;
        let sink = console.clone();
        tokio::spawn(async move {
            while let Some(event) = error_events.next().await {
                let details = &event.exception_details;
                let text = details
                    .exception
                    .as_ref()
                    .and_then(|e| e.description.clone())
                    .unwrap_or_else(|| details.text.clone());
                if let Ok(mut entries) = sink.lock() {
                    entries.push(ConsoleEntry {
                        level: "pageerror".to_string(),
                        text,
                    });
                }
            }
        });

        Ok(Self {
            executor: JsExecutor::new(page),
            browser,
            context_id,
            console,
            navigation_timeout,
            permit: Mutex::new(Some(permit)),
            closed: AtomicBool::new(false),
        })
    }

    fn page(&self) -> &Page {
        self.executor.page()
    }

    fn ensure_open(&self) -> AppResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AppError::Browser("页面已关闭".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl FormPage for ChromePage {
    async fn goto(&self, url: &str) -> AppResult<()> {
        self.ensure_open()?;
        debug!("导航到: {}", url);
        timeout(self.navigation_timeout, self.page().goto(url))
            .await
            .map_err(|_| AppError::Timeout(format!("导航超时 ({:?}): {}", self.navigation_timeout, url)))??;
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.page().url().await?.unwrap_or_default())
    }

    async fn title(&self) -> AppResult<String> {
        Ok(self.page().get_title().await?.unwrap_or_default())
    }

    async fn body_text(&self) -> AppResult<String> {
        self.executor
            .eval_as::<Option<String>>("document.body ? document.body.innerText : ''")
            .await
            .map(Option::unwrap_or_default)
    }

    async fn html(&self) -> AppResult<String> {
        Ok(self.page().content().await?)
    }

    async fn exists(&self, selector: &str) -> AppResult<bool> {
        self.executor
            .call("(s) => document.querySelector(s) !== null", &selector)
            .await
    }

    async fn is_visible(&self, selector: &str) -> AppResult<bool> {
        self.executor.call(&script(VISIBLE_JS), &selector).await
    }

    async fn wait_for(&self, selector: &str, wait: Duration) -> AppResult<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.exists(selector).await? {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(Duration::from_millis(250)).await;
        }
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        self.ensure_open()?;
        let element = self
            .page()
            .find_element(selector)
            .await
            .map_err(|_| AppError::element_not_found(selector))?;
        element.click().await?;
        Ok(())
    }

    async fn click_text(&self, selector: &str, text: &str) -> AppResult<bool> {
        self.executor
            .call(&script(CLICK_TEXT_JS), &json!({ "selector": selector, "text": text }))
            .await
    }

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        let filled: bool = self
            .executor
            .call(&script(FILL_JS), &json!({ "selector": selector, "value": value }))
            .await?;
        if filled {
            Ok(())
        } else {
            Err(AppError::element_not_found(selector))
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> AppResult<()> {
        let selected: bool = self
            .executor
            .call(&script(SELECT_JS), &json!({ "selector": selector, "value": value }))
            .await?;
        if selected {
            Ok(())
        } else {
            Err(AppError::other(format!("下拉框 {selector} 无法选中值 '{value}'")))
        }
    }

    async fn check(&self, selector: &str) -> AppResult<()> {
        let checked: bool = self.executor.call(&script(CHECK_JS), &selector).await?;
        if checked {
            Ok(())
        } else {
            Err(AppError::element_not_found(selector))
        }
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> AppResult<()> {
        self.ensure_open()?;
        let element = self
            .page()
            .find_element(selector)
            .await
            .map_err(|_| AppError::element_not_found(selector))?;
        let params = SetFileInputFilesParams::builder()
            .file(path.to_string_lossy().to_string())
            .backend_node_id(element.backend_node_id)
            .build()
            .map_err(AppError::Browser)?;
        self.page().execute(params).await?;
        Ok(())
    }

    async fn texts(&self, selector: &str) -> AppResult<Vec<String>> {
        self.executor.call(&script(TEXTS_JS), &selector).await
    }

    async fn form_controls(&self, scope: &str) -> AppResult<Vec<FormControl>> {
        self.executor.call(&script(CONTROLS_JS), &scope).await
    }

    async fn question_blocks(&self, container: &str) -> AppResult<Vec<QuestionBlock>> {
        self.executor.call(&script(QUESTIONS_JS), &container).await
    }

    async fn screenshot(&self) -> AppResult<Vec<u8>> {
        self.ensure_open()?;
        let params = ScreenshotParams::builder().full_page(true).build();
        Ok(self.page().screenshot(params).await?)
    }

    async fn console_entries(&self) -> Vec<ConsoleEntry> {
        self.console
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    async fn close(&self) -> AppResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        if let Err(e) = self.page().clone().close().await {
            warn!("关闭页面失败: {}", e);
        }

        if let Some(context_id) = self.context_id.clone() {
            let guard = self.browser.lock().await;
            if let Some(browser) = guard.as_ref() {
                if let Err(e) = browser.execute(DisposeBrowserContextParams::new(context_id)).await {
                    warn!("释放浏览器上下文失败: {}", e);
                }
            }
        }

        // 释放并发名额
        if let Ok(mut permit) = self.permit.lock() {
            permit.take();
        }
        debug!("浏览器页面已关闭");
        Ok(())
    }
}
