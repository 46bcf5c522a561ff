use serde::{Deserialize, Serialize};

/// 适配器执行结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyStatus {
    Succeeded,
    Failed,
    Blocked,
    DryRunComplete,
    NeedsInput,
}

/// 需要人工补充的表单字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredInput {
    pub field_name: String,
    /// text / textarea / select / radio / checkbox / file
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    pub required: bool,
}

/// 一次适配器调用的内存结果（不直接持久化）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApplyResult {
    pub status: ApplyStatus,
    pub fields_filled_count: usize,
    pub fields_failed: Vec<String>,
    pub screenshots: Vec<String>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub confirmation_text: Option<String>,
    pub required_inputs: Option<Vec<RequiredInput>>,
}

impl ApplyResult {
    fn with_status(status: ApplyStatus) -> Self {
        Self {
            status,
            fields_filled_count: 0,
            fields_failed: Vec::new(),
            screenshots: Vec::new(),
            error_code: None,
            error_message: None,
            confirmation_text: None,
            required_inputs: None,
        }
    }

    pub fn succeeded() -> Self {
        Self::with_status(ApplyStatus::Succeeded)
    }

    pub fn dry_run_complete() -> Self {
        Self::with_status(ApplyStatus::DryRunComplete)
    }

    pub fn failed(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::with_status(ApplyStatus::Failed);
        result.error_code = Some(code.into());
        result.error_message = Some(message.into());
        result
    }

    pub fn blocked(code: impl Into<String>, message: impl Into<String>) -> Self {
        let mut result = Self::with_status(ApplyStatus::Blocked);
        result.error_code = Some(code.into());
        result.error_message = Some(message.into());
        result
    }

    pub fn needs_input(inputs: Vec<RequiredInput>) -> Self {
        let mut result = Self::with_status(ApplyStatus::NeedsInput);
        result.required_inputs = Some(inputs);
        result
    }

    /// 沿用另一个结果的字段统计和截图（状态不变）
    pub fn with_progress(mut self, filled: usize, failed: Vec<String>, screenshots: Vec<String>) -> Self {
        self.fields_filled_count = filled;
        self.fields_failed = failed;
        self.screenshots = screenshots;
        self
    }

    pub fn with_confirmation(mut self, text: Option<String>) -> Self {
        self.confirmation_text = text;
        self
    }
}
