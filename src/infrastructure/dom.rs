//! 页面能力接口与 DOM 描述类型
//!
//! 适配器只通过 `FormPage` 操作页面：真实实现走 CDP，测试中使用 `FakePage`。
//! 表单控件以“快照”形式返回，每个控件带一个可以再次定位它的选择器。

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;

/// 下拉框选项
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub value: String,
    pub text: String,
    #[serde(default)]
    pub selected: bool,
}

impl SelectOption {
    pub fn new(value: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            text: text.into(),
            selected: false,
        }
    }
}

/// 表单控件快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormControl {
    /// 能重新定位到该控件的选择器
    pub selector: String,
    /// input / select / textarea
    pub tag: String,
    /// input 的 type 属性（text、email、radio、checkbox、file...）
    #[serde(default)]
    pub input_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub id: String,
    /// 当前值；file 输入为已选文件名
    #[serde(default)]
    pub value: String,
    /// 通过 `<label for=...>` 关联的文本
    #[serde(default)]
    pub label_for: Option<String>,
    /// 祖先 `<label>` 的文本
    #[serde(default)]
    pub ancestor_label: Option<String>,
    #[serde(default)]
    pub placeholder: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub checked: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub options: Vec<SelectOption>,
}

fn default_true() -> bool {
    true
}

impl Default for FormControl {
    fn default() -> Self {
        Self {
            selector: String::new(),
            tag: "input".to_string(),
            input_type: "text".to_string(),
            name: String::new(),
            id: String::new(),
            value: String::new(),
            label_for: None,
            ancestor_label: None,
            placeholder: String::new(),
            required: false,
            checked: false,
            visible: true,
            options: Vec::new(),
        }
    }
}

impl FormControl {
    /// 关联的标签文本：先看 for 关联，再看祖先 label
    pub fn label(&self) -> Option<&str> {
        self.label_for
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .or_else(|| self.ancestor_label.as_deref().filter(|s| !s.trim().is_empty()))
    }

    pub fn kind(&self) -> ControlKind {
        match self.tag.as_str() {
            "select" => ControlKind::Select,
            "textarea" => ControlKind::TextArea,
            _ => match self.input_type.as_str() {
                "radio" => ControlKind::Radio,
                "checkbox" => ControlKind::Checkbox,
                "file" => ControlKind::File,
                "hidden" | "submit" | "button" | "reset" | "image" => ControlKind::Ignored,
                _ => ControlKind::Text,
            },
        }
    }
}

/// 控件类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Text,
    TextArea,
    Select,
    Radio,
    Checkbox,
    File,
    Ignored,
}

impl ControlKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ControlKind::Text => "text",
            ControlKind::TextArea => "textarea",
            ControlKind::Select => "select",
            ControlKind::Radio => "radio",
            ControlKind::Checkbox => "checkbox",
            ControlKind::File => "file",
            ControlKind::Ignored => "ignored",
        }
    }
}

/// 站点自定义问题容器：一个问题文本加上它内部的控件
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestionBlock {
    pub label: String,
    #[serde(default)]
    pub controls: Vec<FormControl>,
}

/// 控制台 / 页面错误记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    /// log / warning / error / pageerror ...
    pub level: String,
    pub text: String,
}

/// 页面操作能力
#[async_trait]
pub trait FormPage: Send + Sync {
    async fn goto(&self, url: &str) -> AppResult<()>;

    async fn current_url(&self) -> AppResult<String>;

    async fn title(&self) -> AppResult<String>;

    /// 渲染后的可见文本（`document.body.innerText`）
    async fn body_text(&self) -> AppResult<String>;

    async fn html(&self) -> AppResult<String>;

    /// 选择器是否命中至少一个元素
    async fn exists(&self, selector: &str) -> AppResult<bool>;

    /// 选择器命中的元素中是否有实际渲染可见的
    async fn is_visible(&self, selector: &str) -> AppResult<bool>;

    /// 在超时内等待元素出现，超时返回 false 而不是错误
    async fn wait_for(&self, selector: &str, timeout: Duration) -> AppResult<bool>;

    async fn click(&self, selector: &str) -> AppResult<()>;

    /// 点击第一个匹配 `selector` 且文本包含 `text`（不区分大小写）的元素
    async fn click_text(&self, selector: &str, text: &str) -> AppResult<bool>;

    async fn fill(&self, selector: &str, value: &str) -> AppResult<()>;

    /// 按 value 选中下拉项
    async fn select_option(&self, selector: &str, value: &str) -> AppResult<()>;

    /// 勾选 radio / checkbox
    async fn check(&self, selector: &str) -> AppResult<()>;

    async fn set_input_files(&self, selector: &str, path: &Path) -> AppResult<()>;

    /// 所有可见匹配元素的文本
    async fn texts(&self, selector: &str) -> AppResult<Vec<String>>;

    /// `scope` 命中的控件本身，或其内部的全部表单控件；未命中返回空
    async fn form_controls(&self, scope: &str) -> AppResult<Vec<FormControl>>;

    /// 匹配 `container` 的问题容器
    async fn question_blocks(&self, container: &str) -> AppResult<Vec<QuestionBlock>>;

    /// PNG 截图
    async fn screenshot(&self) -> AppResult<Vec<u8>>;

    /// 到目前为止采集到的控制台与页面错误
    async fn console_entries(&self) -> Vec<ConsoleEntry>;

    async fn close(&self) -> AppResult<()>;
}

/// 浏览器资源提供方（受并发上限约束，超限立即失败）
#[async_trait]
pub trait BrowserProvider: Send + Sync {
    /// 打开一个独立上下文中的新页面
    async fn open_page(&self) -> AppResult<Arc<dyn FormPage>>;

    /// 关闭浏览器进程 / 连接
    async fn shutdown(&self) -> AppResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_prefers_for_linkage_over_ancestor() {
        let control = FormControl {
            label_for: Some("Linked".into()),
            ancestor_label: Some("Wrapped".into()),
            ..Default::default()
        };
        assert_eq!(control.label(), Some("Linked"));

        let control = FormControl {
            label_for: Some("   ".into()),
            ancestor_label: Some("Wrapped".into()),
            ..Default::default()
        };
        assert_eq!(control.label(), Some("Wrapped"));
    }

    #[test]
    fn kind_from_tag_and_type() {
        let mk = |tag: &str, ty: &str| FormControl {
            tag: tag.into(),
            input_type: ty.into(),
            ..Default::default()
        };
        assert_eq!(mk("select", "").kind(), ControlKind::Select);
        assert_eq!(mk("input", "email").kind(), ControlKind::Text);
        assert_eq!(mk("input", "radio").kind(), ControlKind::Radio);
        assert_eq!(mk("input", "hidden").kind(), ControlKind::Ignored);
        assert_eq!(mk("textarea", "").kind(), ControlKind::TextArea);
    }
}
