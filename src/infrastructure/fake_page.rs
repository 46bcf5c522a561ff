//! 内存中的页面替身
//!
//! 不启动浏览器就能驱动适配器：预置元素、控件、问题容器和点击后的页面变化，
//! 并记录所有交互供断言使用。用于测试和离线演练。

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use super::dom::{BrowserProvider, ConsoleEntry, FormControl, FormPage, QuestionBlock, SelectOption};
use crate::error::{AppError, AppResult};

/// 点击某元素后页面发生的变化
#[derive(Debug, Clone, Default)]
pub struct PageChange {
    pub url: Option<String>,
    pub body_text: Option<String>,
    pub add_elements: Vec<String>,
    pub texts: Vec<(String, Vec<String>)>,
}

impl PageChange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn body_text(mut self, text: impl Into<String>) -> Self {
        self.body_text = Some(text.into());
        self
    }

    pub fn reveal(mut self, selector: impl Into<String>) -> Self {
        self.add_elements.push(selector.into());
        self
    }

    pub fn texts(mut self, selector: impl Into<String>, texts: &[&str]) -> Self {
        self.texts
            .push((selector.into(), texts.iter().map(|t| t.to_string()).collect()));
        self
    }
}

#[derive(Debug, Default)]
struct FakeState {
    url: String,
    title: String,
    body_text: String,
    visible: HashSet<String>,
    hidden: HashSet<String>,
    controls: Vec<FormControl>,
    questions: HashMap<String, Vec<(String, Vec<String>)>>,
    texts: HashMap<String, Vec<String>>,
    click_effects: HashMap<String, PageChange>,
    text_buttons: Vec<(String, String, PageChange)>,
    failing: HashSet<String>,
    navigation_failures: u32,
    console: Vec<ConsoleEntry>,
    calls: Vec<String>,
    closed: bool,
}

impl FakeState {
    fn control_mut(&mut self, selector: &str) -> Option<&mut FormControl> {
        self.controls.iter_mut().find(|c| c.selector == selector)
    }

    /// 逗号分隔的选择器列表任一项命中即可
    fn has(&self, selector: &str) -> bool {
        selector.split(',').map(str::trim).any(|part| {
            self.visible.contains(part)
                || self.hidden.contains(part)
                || self.controls.iter().any(|c| c.selector == part)
        })
    }

    fn shown(&self, selector: &str) -> bool {
        selector.split(',').map(str::trim).any(|part| {
            self.visible.contains(part) || self.controls.iter().any(|c| c.selector == part && c.visible)
        })
    }

    fn check_failing(&self, selector: &str) -> AppResult<()> {
        if self.failing.contains(selector) {
            return Err(AppError::Browser(format!("element is detached: {selector}")));
        }
        Ok(())
    }

    fn apply(&mut self, change: PageChange) {
        if let Some(url) = change.url {
            self.url = url;
        }
        if let Some(text) = change.body_text {
            self.body_text = text;
        }
        for selector in change.add_elements {
            self.visible.insert(selector);
        }
        for (selector, texts) in change.texts {
            self.texts.insert(selector, texts);
        }
    }
}

/// 内存页面
#[derive(Debug, Default)]
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new(url: impl Into<String>) -> Self {
        let page = Self::default();
        if let Ok(mut state) = page.state.lock() {
            state.url = url.into();
        }
        page
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        // 测试替身：锁中毒说明测试本身已经 panic
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    // ========== 构建页面 ==========

    pub fn with_title(self, title: impl Into<String>) -> Self {
        self.lock().title = title.into();
        self
    }

    pub fn with_body_text(self, text: impl Into<String>) -> Self {
        self.lock().body_text = text.into();
        self
    }

    /// 一个可见元素
    pub fn with_element(self, selector: impl Into<String>) -> Self {
        self.lock().visible.insert(selector.into());
        self
    }

    /// 存在于 DOM 但未渲染的元素（例如只引用了脚本的验证码容器）
    pub fn with_hidden_element(self, selector: impl Into<String>) -> Self {
        self.lock().hidden.insert(selector.into());
        self
    }

    pub fn with_control(self, control: FormControl) -> Self {
        self.lock().controls.push(control);
        self
    }

    /// 在 `container` 下添加一个问题容器，控件同时加入表单
    pub fn with_question(self, container: impl Into<String>, label: impl Into<String>, controls: Vec<FormControl>) -> Self {
        {
            let mut state = self.lock();
            let selectors = controls.iter().map(|c| c.selector.clone()).collect();
            state.controls.extend(controls);
            state
                .questions
                .entry(container.into())
                .or_default()
                .push((label.into(), selectors));
        }
        self
    }

    pub fn on_click(self, selector: impl Into<String>, change: PageChange) -> Self {
        let selector = selector.into();
        {
            let mut state = self.lock();
            state.visible.insert(selector.clone());
            state.click_effects.insert(selector, change);
        }
        self
    }

    /// 一个带文字的按钮，`click_text` 命中后应用变化
    pub fn with_text_button(self, selector: impl Into<String>, text: impl Into<String>, change: PageChange) -> Self {
        self.lock()
            .text_buttons
            .push((selector.into(), text.into(), change));
        self
    }

    /// 对该选择器的任何操作都报错
    pub fn failing(self, selector: impl Into<String>) -> Self {
        self.lock().failing.insert(selector.into());
        self
    }

    /// 前 n 次导航返回网络错误
    pub fn with_navigation_failures(self, times: u32) -> Self {
        self.lock().navigation_failures = times;
        self
    }

    pub fn with_console(self, level: &str, text: &str) -> Self {
        self.lock().console.push(ConsoleEntry {
            level: level.to_string(),
            text: text.to_string(),
        });
        self
    }

    // ========== 断言辅助 ==========

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn was_clicked(&self, selector: &str) -> bool {
        let needle = format!("click:{selector}");
        self.lock().calls.iter().any(|c| *c == needle)
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.lock()
            .controls
            .iter()
            .find(|c| c.selector == selector)
            .map(|c| c.value.clone())
    }

    pub fn is_checked(&self, selector: &str) -> bool {
        self.lock()
            .controls
            .iter()
            .any(|c| c.selector == selector && c.checked)
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[async_trait]
impl FormPage for FakePage {
    async fn goto(&self, url: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.calls.push(format!("goto:{url}"));
        if state.navigation_failures > 0 {
            state.navigation_failures -= 1;
            return Err(AppError::Network("net::ERR_CONNECTION_RESET".to_string()));
        }
        state.url = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> AppResult<String> {
        Ok(self.lock().url.clone())
    }

    async fn title(&self) -> AppResult<String> {
        Ok(self.lock().title.clone())
    }

    async fn body_text(&self) -> AppResult<String> {
        Ok(self.lock().body_text.clone())
    }

    async fn html(&self) -> AppResult<String> {
        Ok(format!("<html><body>{}</body></html>", self.lock().body_text))
    }

    async fn exists(&self, selector: &str) -> AppResult<bool> {
        Ok(self.lock().has(selector))
    }

    async fn is_visible(&self, selector: &str) -> AppResult<bool> {
        Ok(self.lock().shown(selector))
    }

    async fn wait_for(&self, selector: &str, _timeout: Duration) -> AppResult<bool> {
        Ok(self.lock().has(selector))
    }

    async fn click(&self, selector: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.check_failing(selector)?;
        if !state.has(selector) {
            return Err(AppError::element_not_found(selector));
        }
        state.calls.push(format!("click:{selector}"));
        if let Some(change) = state.click_effects.get(selector).cloned() {
            state.apply(change);
        }
        Ok(())
    }

    async fn click_text(&self, selector: &str, text: &str) -> AppResult<bool> {
        let mut state = self.lock();
        let needle = text.to_lowercase();
        let hit = state
            .text_buttons
            .iter()
            .find(|(sel, label, _)| sel == selector && label.to_lowercase().contains(&needle))
            .map(|(_, _, change)| change.clone());
        match hit {
            Some(change) => {
                state.calls.push(format!("click_text:{selector}:{text}"));
                state.apply(change);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.check_failing(selector)?;
        state.calls.push(format!("fill:{selector}={value}"));
        let visible = state.visible.contains(selector);
        match state.control_mut(selector) {
            Some(control) => {
                control.value = value.to_string();
                Ok(())
            }
            None if visible => Ok(()),
            None => Err(AppError::element_not_found(selector)),
        }
    }

    async fn select_option(&self, selector: &str, value: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.check_failing(selector)?;
        state.calls.push(format!("select:{selector}={value}"));
        let control = state
            .control_mut(selector)
            .ok_or_else(|| AppError::element_not_found(selector))?;
        if !control.options.iter().any(|o| o.value == value) {
            return Err(AppError::other(format!("下拉框 {selector} 没有值 '{value}'")));
        }
        for option in control.options.iter_mut() {
            option.selected = option.value == value;
        }
        control.value = value.to_string();
        Ok(())
    }

    async fn check(&self, selector: &str) -> AppResult<()> {
        let mut state = self.lock();
        state.check_failing(selector)?;
        state.calls.push(format!("check:{selector}"));
        let (name, is_radio) = {
            let control = state
                .control_mut(selector)
                .ok_or_else(|| AppError::element_not_found(selector))?;
            control.checked = true;
            (control.name.clone(), control.input_type == "radio")
        };
        if is_radio && !name.is_empty() {
            for other in state.controls.iter_mut() {
                if other.name == name && other.input_type == "radio" && other.selector != selector {
                    other.checked = false;
                }
            }
        }
        Ok(())
    }

    async fn set_input_files(&self, selector: &str, path: &Path) -> AppResult<()> {
        let mut state = self.lock();
        state.check_failing(selector)?;
        state.calls.push(format!("upload:{selector}"));
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let control = state
            .control_mut(selector)
            .ok_or_else(|| AppError::element_not_found(selector))?;
        control.value = file_name;
        Ok(())
    }

    async fn texts(&self, selector: &str) -> AppResult<Vec<String>> {
        Ok(self.lock().texts.get(selector).cloned().unwrap_or_default())
    }

    async fn form_controls(&self, scope: &str) -> AppResult<Vec<FormControl>> {
        let state = self.lock();
        let direct: Vec<FormControl> = state
            .controls
            .iter()
            .filter(|c| c.selector == scope)
            .cloned()
            .collect();
        if !direct.is_empty() {
            Ok(direct)
        } else if state.has(scope) {
            Ok(state.controls.clone())
        } else {
            Ok(Vec::new())
        }
    }

    async fn question_blocks(&self, container: &str) -> AppResult<Vec<QuestionBlock>> {
        let state = self.lock();
        let Some(blocks) = state.questions.get(container) else {
            return Ok(Vec::new());
        };
        Ok(blocks
            .iter()
            .map(|(label, selectors)| QuestionBlock {
                label: label.clone(),
                controls: selectors
                    .iter()
                    .filter_map(|s| state.controls.iter().find(|c| &c.selector == s).cloned())
                    .collect(),
            })
            .collect())
    }

    async fn screenshot(&self) -> AppResult<Vec<u8>> {
        let mut state = self.lock();
        if state.closed {
            return Err(AppError::Browser("页面已关闭".to_string()));
        }
        state.calls.push("screenshot".to_string());
        Ok(b"\x89PNG\r\n\x1a\nfake".to_vec())
    }

    async fn console_entries(&self) -> Vec<ConsoleEntry> {
        self.lock().console.clone()
    }

    async fn close(&self) -> AppResult<()> {
        let mut state = self.lock();
        state.calls.push("close".to_string());
        state.closed = true;
        Ok(())
    }
}

// ========== 控件构造 ==========

pub fn text_field(selector: &str, label: &str) -> FormControl {
    FormControl {
        selector: selector.to_string(),
        label_for: Some(label.to_string()),
        ..Default::default()
    }
}

/// 下拉框；第一个 `(value, text)` 通常是占位项
pub fn select_field(selector: &str, label: &str, options: &[(&str, &str)]) -> FormControl {
    FormControl {
        selector: selector.to_string(),
        tag: "select".to_string(),
        input_type: String::new(),
        label_for: Some(label.to_string()),
        options: options
            .iter()
            .map(|(value, text)| SelectOption::new(*value, *text))
            .collect(),
        ..Default::default()
    }
}

pub fn radio_field(selector: &str, name: &str, value: &str, label: &str) -> FormControl {
    FormControl {
        selector: selector.to_string(),
        input_type: "radio".to_string(),
        name: name.to_string(),
        value: value.to_string(),
        ancestor_label: Some(label.to_string()),
        ..Default::default()
    }
}

pub fn checkbox_field(selector: &str, name: &str, value: &str, label: &str) -> FormControl {
    FormControl {
        selector: selector.to_string(),
        input_type: "checkbox".to_string(),
        name: name.to_string(),
        value: value.to_string(),
        ancestor_label: Some(label.to_string()),
        ..Default::default()
    }
}

pub fn file_field(selector: &str, label: &str) -> FormControl {
    FormControl {
        selector: selector.to_string(),
        input_type: "file".to_string(),
        label_for: Some(label.to_string()),
        ..Default::default()
    }
}

/// 将控件标记为必填
pub fn required(mut control: FormControl) -> FormControl {
    control.required = true;
    control
}

// ========== 浏览器替身 ==========

/// 依次交出预置页面的浏览器替身
#[derive(Default)]
pub struct FakeBrowser {
    pages: Mutex<VecDeque<Arc<FakePage>>>,
    opened: AtomicUsize,
    shut_down: AtomicUsize,
}

impl FakeBrowser {
    pub fn new(pages: Vec<Arc<FakePage>>) -> Self {
        Self {
            pages: Mutex::new(pages.into()),
            ..Default::default()
        }
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn was_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst) > 0
    }
}

#[async_trait]
impl BrowserProvider for FakeBrowser {
    async fn open_page(&self) -> AppResult<Arc<dyn FormPage>> {
        let page = self
            .pages
            .lock()
            .map_err(|_| AppError::Browser("浏览器替身锁已中毒".to_string()))?
            .pop_front()
            .ok_or(AppError::BrowserBusy { limit: 0 })?;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(page)
    }

    async fn shutdown(&self) -> AppResult<()> {
        self.shut_down.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
