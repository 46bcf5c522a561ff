//! 表单投递流程 - 流程层
//!
//! 核心职责：定义"一个申请表单"的完整处理流程，由站点的选择器表驱动
//!
//! 流程顺序：
//! 1. 导航：必要时点击 Apply 入口，等待表单出现
//! 2. 静态字段：每个字段按候选选择器顺序只填一次
//! 3. 自定义问题：只填能确定答案的问题，其余留空
//! 4. 上传简历（尽力而为）
//! 5. 提交前检查：必填项仍为空则返回 needs_input，绝不提交
//! 6. dry run 在提交前停止
//! 7. 提交
//! 8. 判定结果

use std::collections::BTreeMap;

use regex::Regex;
use tracing::{debug, error, info, warn};
use url::Url;

use super::apply_ctx::ApplyContext;
use super::outcome::{detect_outcome, OutcomeSignals};
use crate::error::{codes, AppError, AppResult};
use crate::infrastructure::{ControlKind, FormControl, FormPage, QuestionBlock};
use crate::models::{ApplyResult, Profile, RequiredInput};
use crate::services::field_mapper::{
    self, check_required_checkbox, fill_checkbox_group, fill_dropdown, fill_radio_group,
    fill_work_authorization_dropdown, generic_answer, match_user_input, real_options, resolve_control, resolve_label,
    select_is_unset,
};
use crate::services::with_retry;

/// 静态字段的控件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldWidget {
    Text,
    /// 普通下拉框，按文本匹配
    Select,
    /// 工作许可下拉框，使用类别同义词
    WorkAuthorization,
}

/// 站点上的一个已知字段
#[derive(Clone, Copy)]
pub struct StaticField {
    /// 用于日志和 fields_failed 的名称
    pub label: &'static str,
    /// 候选选择器，按优先级排列
    pub selectors: &'static [&'static str],
    pub value: fn(&Profile) -> Option<String>,
    pub widget: FieldWidget,
    /// 页面上没有该字段时静默跳过
    pub optional: bool,
}

/// 一个站点的声明式选择器表
#[derive(Clone, Copy)]
pub struct SiteSelectors {
    /// 追加到职位链接后直接进入表单的路径（Lever 的 `/apply`）
    pub apply_path: Option<&'static str>,
    /// Apply 入口按钮
    pub apply_buttons: &'static [&'static str],
    /// 表单容器候选
    pub form: &'static [&'static str],
    pub static_fields: &'static [StaticField],
    pub resume_inputs: &'static [&'static str],
    /// 自定义问题容器
    pub question_containers: &'static [&'static str],
    pub submit_buttons: &'static [&'static str],
    /// 提交后可见的校验错误元素
    pub validation_errors: &'static [&'static str],
    /// 必须勾选的确认框（条款、隐私政策）的标签模式
    pub consent_label: Option<&'static str>,
}

/// 填写进度
#[derive(Debug, Default)]
struct Progress {
    filled: usize,
    failed: Vec<String>,
    screenshots: Vec<String>,
}

impl Progress {
    fn fail(&mut self, label: impl Into<String>) {
        let label = label.into();
        if !self.failed.contains(&label) {
            self.failed.push(label);
        }
    }

    fn apply_to(&self, result: ApplyResult) -> ApplyResult {
        result.with_progress(self.filled, self.failed.clone(), self.screenshots.clone())
    }
}

/// 表单流程
///
/// - 编排单个表单的完整处理步骤
/// - 不持有任何资源（page 由上下文借入）
/// - 站点差异全部在 `SiteSelectors` 里
pub struct FormFlow {
    site: &'static str,
    selectors: SiteSelectors,
}

impl FormFlow {
    pub fn new(site: &'static str, selectors: SiteSelectors) -> Self {
        Self { site, selectors }
    }

    /// 运行整个流程；内部错误转换为 `ADAPTER_ERROR`，并尽量截一张调试图
    pub async fn run(&self, ctx: &ApplyContext) -> ApplyResult {
        let mut progress = Progress::default();
        match self.run_steps(ctx, &mut progress).await {
            Ok(result) => result,
            Err(e) => {
                error!("{} ❌ {} 适配器异常: {}", ctx, self.site, e);
                self.screenshot(ctx, &mut progress, "adapter-error").await;
                progress.apply_to(ApplyResult::failed(codes::ADAPTER_ERROR, e.to_string()))
            }
        }
    }

    async fn run_steps(&self, ctx: &ApplyContext, progress: &mut Progress) -> AppResult<ApplyResult> {
        let page = ctx.page();

        // ========== 1. 导航 ==========
        let Some(form) = self.navigate(ctx).await? else {
            warn!("{} ⚠️ 未找到申请表单", ctx);
            self.screenshot(ctx, progress, "form-not-found").await;
            return Ok(progress.apply_to(ApplyResult::failed(
                codes::FORM_NOT_FOUND,
                format!("{:?} 内未出现申请表单", ctx.element_timeout),
            )));
        };
        info!("{} ✓ 表单已就绪 ({})", ctx, form);

        // ========== 2. 静态字段 ==========
        self.fill_static_fields(ctx, progress).await;

        // ========== 3. 自定义问题 ==========
        self.answer_questions(ctx, progress).await?;

        // ========== 4. 简历 ==========
        self.upload_resume(ctx, progress).await?;

        // 人工补充的答案、确认框
        self.apply_user_inputs(ctx, form, progress).await?;
        self.accept_consent(ctx, form, progress).await?;

        info!(
            "{} ✓ 填写完成: 成功 {} 项，失败 {} 项",
            ctx,
            progress.filled,
            progress.failed.len()
        );
        self.screenshot(ctx, progress, "form-filled").await;

        // ========== 5. 提交前检查 ==========
        let controls = page.form_controls(form).await?;
        let unresolved = unresolved_required(&controls);
        if !unresolved.is_empty() {
            info!("{} ✋ {} 个必填项无法确定，等待人工输入", ctx, unresolved.len());
            for input in &unresolved {
                debug!("{}   - {} ({})", ctx, input.field_name, input.field_type);
            }
            return Ok(progress.apply_to(ApplyResult::needs_input(unresolved)));
        }

        // ========== 6. Dry run ==========
        if ctx.dry_run {
            info!("{} 🧪 dry run，跳过提交", ctx);
            return Ok(progress.apply_to(ApplyResult::dry_run_complete()));
        }

        // ========== 7. 提交 ==========
        let Some(submit) = first_existing(page, self.selectors.submit_buttons).await? else {
            warn!("{} ❌ 未找到提交按钮", ctx);
            return Ok(progress.apply_to(ApplyResult::failed(codes::SUBMIT_FAILED, "未找到提交按钮")));
        };
        if let Err(e) = with_retry(&ctx.retry, || page.click(submit)).await {
            warn!("{} ❌ 点击提交按钮失败: {}", ctx, e);
            return Ok(progress.apply_to(ApplyResult::failed(codes::SUBMIT_FAILED, e.to_string())));
        }
        info!("{} 📤 已提交，等待页面响应...", ctx);
        if !ctx.post_submit_wait.is_zero() {
            tokio::time::sleep(ctx.post_submit_wait).await;
        }

        // ========== 8. 结果判定 ==========
        let signals = OutcomeSignals {
            body_text: page.body_text().await.unwrap_or_default(),
            url: page.current_url().await.unwrap_or_default(),
            validation_errors: self.validation_texts(page).await,
        };
        let outcome = detect_outcome(&signals);
        info!("{} 📋 提交结果: {:?}", ctx, outcome);
        self.screenshot(ctx, progress, "after-submit").await;
        Ok(progress.apply_to(outcome.into_result()))
    }

    // ========== 步骤实现 ==========

    /// 返回命中的表单选择器；超时返回 None
    async fn navigate(&self, ctx: &ApplyContext) -> AppResult<Option<&'static str>> {
        let page = ctx.page();
        if let Some(form) = first_existing(page, self.selectors.form).await? {
            return Ok(Some(form));
        }

        if let Some(path) = self.selectors.apply_path {
            let current = page.current_url().await.unwrap_or_else(|_| ctx.job_url.clone());
            if let Some(target) = with_path_suffix(&current, path) {
                debug!("{} 跳转到申请页 {}", ctx, target);
                with_retry(&ctx.retry, || page.goto(&target)).await?;
            }
        }

        if first_existing(page, self.selectors.form).await?.is_none() {
            match first_existing(page, self.selectors.apply_buttons).await? {
                Some(button) => {
                    debug!("{} 点击 Apply 入口 {}", ctx, button);
                    with_retry(&ctx.retry, || page.click(button)).await?;
                }
                None => {
                    if page.click_text("a, button", "apply").await? {
                        debug!("{} 通过文字点击了 Apply 入口", ctx);
                    }
                }
            }
        }

        let all_forms = self.selectors.form.join(", ");
        if !page.wait_for(&all_forms, ctx.element_timeout).await? {
            return Ok(None);
        }
        first_existing(page, self.selectors.form).await
    }

    async fn fill_static_fields(&self, ctx: &ApplyContext, progress: &mut Progress) {
        let page = ctx.page();
        for field in self.selectors.static_fields {
            let Some(value) = (field.value)(&ctx.profile).filter(|v| !v.trim().is_empty()) else {
                debug!("{} 资料中没有 {}，跳过", ctx, field.label);
                continue;
            };

            let selector = match first_existing(page, field.selectors).await {
                Ok(Some(selector)) => selector,
                Ok(None) if field.optional => {
                    debug!("{} 页面上没有 {} 字段", ctx, field.label);
                    continue;
                }
                Ok(None) => {
                    warn!("{} ⚠️ 未找到字段 {}", ctx, field.label);
                    progress.fail(field.label);
                    continue;
                }
                Err(e) => {
                    warn!("{} ⚠️ 查找字段 {} 失败: {}", ctx, field.label, e);
                    progress.fail(field.label);
                    continue;
                }
            };

            match self.fill_static(ctx, field, selector, &value).await {
                Ok(true) => {
                    debug!("{} ✓ {} = {}", ctx, field.label, value);
                    progress.filled += 1;
                }
                Ok(false) => {
                    warn!("{} ⚠️ {} 没有匹配 '{}' 的选项", ctx, field.label, value);
                    progress.fail(field.label);
                }
                Err(e) => {
                    warn!("{} ⚠️ 填写 {} 失败: {}", ctx, field.label, e);
                    progress.fail(field.label);
                }
            }
        }
    }

    async fn fill_static(&self, ctx: &ApplyContext, field: &StaticField, selector: &str, value: &str) -> AppResult<bool> {
        let page = ctx.page();
        match field.widget {
            FieldWidget::Text => {
                with_retry(&ctx.retry, || page.fill(selector, value)).await?;
                Ok(true)
            }
            FieldWidget::Select => {
                let control = single_control(page, selector).await?;
                fill_dropdown(page, &control, value, &[]).await
            }
            FieldWidget::WorkAuthorization => {
                let control = single_control(page, selector).await?;
                match ctx.profile.work_authorization {
                    Some(auth) => fill_work_authorization_dropdown(page, &control, auth).await,
                    None => fill_dropdown(page, &control, value, &[]).await,
                }
            }
        }
    }

    async fn answer_questions(&self, ctx: &ApplyContext, progress: &mut Progress) -> AppResult<()> {
        let page = ctx.page();
        for container in self.selectors.question_containers {
            let blocks = page.question_blocks(container).await?;
            if blocks.is_empty() {
                continue;
            }
            debug!("{} {} 下有 {} 个问题", ctx, container, blocks.len());
            for block in &blocks {
                match answer_block(ctx, block).await {
                    Ok(true) => progress.filled += 1,
                    Ok(false) => {}
                    Err(e) => {
                        warn!("{} ⚠️ 回答问题 '{}' 失败: {}", ctx, block.label, e);
                        progress.fail(block.label.clone());
                    }
                }
            }
        }
        Ok(())
    }

    async fn upload_resume(&self, ctx: &ApplyContext, progress: &mut Progress) -> AppResult<()> {
        let page = ctx.page();
        let Some(input) = first_existing(page, self.selectors.resume_inputs).await? else {
            warn!("{} ⚠️ 未找到简历上传控件", ctx);
            progress.fail("Resume");
            return Ok(());
        };
        match with_retry(&ctx.retry, || page.set_input_files(input, &ctx.resume_path)).await {
            Ok(()) => {
                info!("{} 📎 简历已上传", ctx);
                progress.filled += 1;
            }
            Err(e) => {
                warn!("{} ⚠️ 简历上传失败: {}", ctx, e);
                progress.fail("Resume");
            }
        }
        Ok(())
    }

    /// 把人工答案填进仍为空的控件（问题容器以外的字段也覆盖到）
    async fn apply_user_inputs(&self, ctx: &ApplyContext, form: &str, progress: &mut Progress) -> AppResult<()> {
        if ctx.user_inputs.is_empty() {
            return Ok(());
        }
        let page = ctx.page();
        let controls = page.form_controls(form).await?;
        let mut radio_groups_done: Vec<String> = Vec::new();

        for control in &controls {
            let Some(answer) = match_user_input(&ctx.user_inputs, control) else {
                continue;
            };
            let filled = match control.kind() {
                ControlKind::Text | ControlKind::TextArea if control.value.trim().is_empty() => {
                    page.fill(&control.selector, answer).await.map(|_| true)
                }
                ControlKind::Select if select_is_unset(control) => fill_dropdown(page, control, answer, &[]).await,
                ControlKind::Radio if !radio_groups_done.contains(&control.name) => {
                    radio_groups_done.push(control.name.clone());
                    let group: Vec<FormControl> =
                        controls.iter().filter(|c| c.kind() == ControlKind::Radio && c.name == control.name).cloned().collect();
                    if group.iter().any(|r| r.checked) {
                        Ok(false)
                    } else {
                        fill_radio_group(page, &group, answer).await
                    }
                }
                _ => Ok(false),
            };
            match filled {
                Ok(true) => {
                    debug!("{} ✓ 使用人工答案填写 {}", ctx, control.label().unwrap_or(&control.name));
                    progress.filled += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!("{} ⚠️ 人工答案填写失败: {}", ctx, e);
                    progress.fail(field_name(control));
                }
            }
        }
        Ok(())
    }

    async fn accept_consent(&self, ctx: &ApplyContext, form: &str, progress: &mut Progress) -> AppResult<()> {
        let Some(pattern) = self.selectors.consent_label else {
            return Ok(());
        };
        let pattern = Regex::new(pattern).map_err(|e| AppError::other(format!("确认框模式无效: {e}")))?;
        let controls = ctx.page().form_controls(form).await?;
        if check_required_checkbox(ctx.page(), &controls, &pattern).await? {
            debug!("{} ✓ 已勾选确认框", ctx);
            progress.filled += 1;
        }
        Ok(())
    }

    async fn validation_texts(&self, page: &dyn FormPage) -> Vec<String> {
        let mut texts = Vec::new();
        for selector in self.selectors.validation_errors {
            match page.texts(selector).await {
                Ok(found) => texts.extend(found),
                Err(e) => debug!("读取校验错误 {} 失败: {}", selector, e),
            }
        }
        texts
    }

    async fn screenshot(&self, ctx: &ApplyContext, progress: &mut Progress, label: &str) {
        if let Some(artifact) = ctx.artifacts.try_screenshot(ctx.page(), label).await {
            progress
                .screenshots
                .push(artifact.local_path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
        }
    }
}

// ========== 辅助函数 ==========

/// 第一个存在于页面上的候选选择器
async fn first_existing(page: &dyn FormPage, candidates: &[&'static str]) -> AppResult<Option<&'static str>> {
    for &selector in candidates {
        if page.exists(selector).await? {
            return Ok(Some(selector));
        }
    }
    Ok(None)
}

/// 在 URL 路径末尾追加 `suffix`（保留查询参数）；已经以它结尾时返回 None
fn with_path_suffix(raw: &str, suffix: &str) -> Option<String> {
    let mut url = Url::parse(raw).ok()?;
    let path = url.path().trim_end_matches('/').to_string();
    if path.ends_with(suffix) {
        return None;
    }
    url.set_path(&format!("{path}{suffix}"));
    Some(url.to_string())
}

async fn single_control(page: &dyn FormPage, selector: &str) -> AppResult<FormControl> {
    page.form_controls(selector)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| AppError::element_not_found(selector))
}

/// 回答一个问题容器；返回是否填写了内容
///
/// 答案来源依次为：人工答案 → 资料映射 → 通用答案表。都没有时留空。
async fn answer_block(ctx: &ApplyContext, block: &QuestionBlock) -> AppResult<bool> {
    let page = ctx.page();
    let controls: Vec<&FormControl> = block
        .controls
        .iter()
        .filter(|c| !matches!(c.kind(), ControlKind::Ignored | ControlKind::File))
        .collect();
    let Some(first) = controls.first() else {
        return Ok(false);
    };
    if already_answered(&controls) {
        return Ok(false);
    }

    let from_user = ctx
        .user_inputs
        .iter()
        .find(|(k, _)| field_mapper::normalize_label(k) == field_mapper::normalize_label(&block.label))
        .map(|(_, v)| v.clone())
        .or_else(|| match_user_input(&ctx.user_inputs, first).map(str::to_string));
    let mapped = resolve_label(&block.label, &ctx.profile).or_else(|| resolve_control(first, &ctx.profile));
    let mapped_key = mapped.as_ref().map(|m| m.key);
    let answer = from_user
        .or_else(|| mapped.map(|m| m.value))
        .or_else(|| generic_answer(&block.label).map(str::to_string));

    let Some(answer) = answer else {
        debug!("{} 问题 '{}' 无法确定答案，留空", ctx, block.label);
        return Ok(false);
    };

    match first.kind() {
        ControlKind::Text | ControlKind::TextArea => {
            with_retry(&ctx.retry, || page.fill(&first.selector, &answer)).await?;
            Ok(true)
        }
        ControlKind::Select => {
            if fill_dropdown(page, first, &answer, &[]).await? {
                return Ok(true);
            }
            match (mapped_key, ctx.profile.work_authorization) {
                (Some("work_authorization"), Some(auth)) => fill_work_authorization_dropdown(page, first, auth).await,
                _ => Ok(false),
            }
        }
        ControlKind::Radio => {
            let radios: Vec<FormControl> = controls
                .iter()
                .filter(|c| c.kind() == ControlKind::Radio)
                .map(|c| (*c).clone())
                .collect();
            fill_radio_group(page, &radios, &answer).await
        }
        ControlKind::Checkbox => {
            let boxes: Vec<FormControl> = controls.iter().map(|c| (*c).clone()).collect();
            let targets: Vec<&str> = answer.split(',').map(str::trim).filter(|t| !t.is_empty()).collect();
            Ok(fill_checkbox_group(page, &boxes, &targets).await? > 0)
        }
        ControlKind::File | ControlKind::Ignored => Ok(false),
    }
}

fn already_answered(controls: &[&FormControl]) -> bool {
    controls.iter().any(|c| match c.kind() {
        ControlKind::Text | ControlKind::TextArea => !c.value.trim().is_empty(),
        ControlKind::Select => !select_is_unset(c),
        ControlKind::Radio | ControlKind::Checkbox => c.checked,
        ControlKind::File | ControlKind::Ignored => false,
    })
}

/// 给人看的字段名：标签 → name → id → 选择器
fn field_name(control: &FormControl) -> String {
    control
        .label()
        .map(str::to_string)
        .or_else(|| (!control.name.is_empty()).then(|| control.name.clone()))
        .or_else(|| (!control.id.is_empty()).then(|| control.id.clone()))
        .unwrap_or_else(|| control.selector.clone())
}

/// 提交前检查：可见、必填且仍为空（或停留在占位项）的控件
///
/// 单选按钮按 name 合并为一项；下拉框带上去掉占位项后的全部选项文本。
pub fn unresolved_required(controls: &[FormControl]) -> Vec<RequiredInput> {
    let mut inputs = Vec::new();
    let mut radio_groups: BTreeMap<String, Vec<&FormControl>> = BTreeMap::new();
    let mut radio_order: Vec<String> = Vec::new();

    for control in controls.iter().filter(|c| c.visible) {
        let kind = control.kind();
        if kind == ControlKind::Radio {
            let key = if control.name.is_empty() {
                control.selector.clone()
            } else {
                control.name.clone()
            };
            if !radio_groups.contains_key(&key) {
                radio_order.push(key.clone());
            }
            radio_groups.entry(key).or_default().push(control);
            continue;
        }
        if !control.required {
            continue;
        }

        let missing = match kind {
            ControlKind::Text | ControlKind::TextArea | ControlKind::File => control.value.trim().is_empty(),
            ControlKind::Select => select_is_unset(control),
            ControlKind::Checkbox => !control.checked,
            ControlKind::Radio | ControlKind::Ignored => false,
        };
        if !missing {
            continue;
        }

        let options = (kind == ControlKind::Select)
            .then(|| real_options(&control.options).iter().map(|o| o.text.clone()).collect());
        inputs.push(RequiredInput {
            field_name: field_name(control),
            field_type: kind.as_str().to_string(),
            options,
            required: true,
        });
    }

    for key in radio_order {
        let Some(group) = radio_groups.get(&key) else {
            continue;
        };
        if !group.iter().any(|r| r.required) || group.iter().any(|r| r.checked) {
            continue;
        }
        let options = group
            .iter()
            .map(|r| r.label().map(str::to_string).unwrap_or_else(|| r.value.clone()))
            .collect();
        inputs.push(RequiredInput {
            field_name: key,
            field_type: ControlKind::Radio.as_str().to_string(),
            options: Some(options),
            required: true,
        });
    }

    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::fake_page::{radio_field, required, select_field, text_field};
    use pretty_assertions::assert_eq;

    #[test]
    fn apply_suffix_keeps_query() {
        assert_eq!(
            with_path_suffix("https://jobs.lever.co/acme/123?lever-source=x", "/apply").as_deref(),
            Some("https://jobs.lever.co/acme/123/apply?lever-source=x")
        );
        assert_eq!(with_path_suffix("https://jobs.lever.co/acme/123/apply/", "/apply"), None);
    }

    #[test]
    fn gate_reports_placeholder_select_without_placeholder_option() {
        let controls = vec![
            required(text_field("#first_name", "First Name")),
            required(select_field(
                "#q1",
                "Are you willing to relocate?",
                &[("", "Select..."), ("yes", "Yes"), ("no", "No")],
            )),
        ];
        let mut filled = controls.clone();
        filled[0].value = "Ada".into();

        let inputs = unresolved_required(&filled);
        assert_eq!(
            inputs,
            vec![RequiredInput {
                field_name: "Are you willing to relocate?".into(),
                field_type: "select".into(),
                options: Some(vec!["Yes".into(), "No".into()]),
                required: true,
            }]
        );
    }

    #[test]
    fn gate_groups_radios_and_skips_hidden_or_optional() {
        let mut hidden = required(text_field("#hidden", "Hidden"));
        hidden.visible = false;
        let controls = vec![
            hidden,
            text_field("#optional", "Optional"),
            required(radio_field("#v_yes", "veteran", "yes", "Yes")),
            required(radio_field("#v_no", "veteran", "no", "No")),
        ];
        let inputs = unresolved_required(&controls);
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].field_name, "veteran");
        assert_eq!(inputs[0].field_type, "radio");
        assert_eq!(inputs[0].options, Some(vec!["Yes".to_string(), "No".to_string()]));

        let mut answered = controls.clone();
        answered[3].checked = true;
        assert!(unresolved_required(&answered).is_empty());
    }
}
