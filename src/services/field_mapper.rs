//! 字段映射
//!
//! 无状态的工具函数：把表单标签映射到资料字段，以及下拉框、单选、复选框的通用填写。
//! 只做启发式匹配；匹配不上的字段留空，由提交前检查交给人工。

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::error::AppResult;
use crate::infrastructure::{ControlKind, FormControl, FormPage, SelectOption};
use crate::models::{Profile, WorkAuthorization};

/// 标签匹配结果
#[derive(Debug, Clone, PartialEq)]
pub struct FieldMatch {
    /// 命中的规则名
    pub key: &'static str,
    pub value: String,
    /// 置信度，目前只用于日志
    pub confidence: f32,
}

struct FieldRule {
    key: &'static str,
    pattern: &'static str,
    confidence: f32,
    extract: fn(&Profile) -> Option<String>,
}

fn yes_no(flag: bool) -> String {
    let answer = if flag { "Yes" } else { "No" };
    answer.to_string()
}

/// 按优先级排列：更具体的规则在前
const RULES: &[FieldRule] = &[
    FieldRule {
        key: "first_name",
        pattern: r"first\s*name|given\s*name|forename|preferred\s*name",
        confidence: 0.95,
        extract: |p| Some(p.first_name.clone()),
    },
    FieldRule {
        key: "last_name",
        pattern: r"last\s*name|surname|family\s*name",
        confidence: 0.95,
        extract: |p| Some(p.last_name.clone()),
    },
    FieldRule {
        key: "email",
        pattern: r"e-?mail",
        confidence: 0.95,
        extract: |p| Some(p.email.clone()),
    },
    FieldRule {
        key: "phone",
        pattern: r"phone|mobile|cell\b|telephone",
        confidence: 0.9,
        extract: |p| p.phone.clone(),
    },
    FieldRule {
        key: "linkedin",
        pattern: r"linked\s*in",
        confidence: 0.95,
        extract: |p| p.linkedin_url.clone(),
    },
    FieldRule {
        key: "github",
        pattern: r"git\s*hub",
        confidence: 0.95,
        extract: |p| p.github_url.clone(),
    },
    FieldRule {
        key: "portfolio",
        pattern: r"portfolio|personal\s*(web)?site|website|blog|other\s*(url|link)",
        confidence: 0.8,
        extract: |p| p.portfolio_url.clone(),
    },
    FieldRule {
        key: "sponsorship",
        pattern: r"sponsor",
        confidence: 0.85,
        extract: |p| p.work_authorization.map(|a| yes_no(a.requires_sponsorship())),
    },
    FieldRule {
        key: "work_authorization",
        pattern: r"authori[sz]ed\s+to\s+work|work\s+authori[sz]ation|eligible\s+to\s+work|legally\s+(able|permitted)\s+to\s+work",
        confidence: 0.85,
        extract: |p| p.work_authorization.map(|a| yes_no(a.is_authorized())),
    },
    FieldRule {
        key: "full_name",
        pattern: r"^(full\s+|legal\s+|your\s+)?name$|full\s+name|legal\s+name",
        confidence: 0.9,
        extract: |p| {
            let name = p.full_name();
            (!name.is_empty()).then_some(name)
        },
    },
    FieldRule {
        key: "current_company",
        pattern: r"current\s+(company|employer)|^company|^organi[sz]ation|^org$",
        confidence: 0.75,
        extract: |p| p.current_company.clone(),
    },
    FieldRule {
        key: "current_title",
        pattern: r"current\s+(job\s+)?(title|role|position)|^job\s+title|^title$",
        confidence: 0.75,
        extract: |p| p.current_title.clone(),
    },
    FieldRule {
        key: "location",
        pattern: r"location|where\s+are\s+you\s+(based|located)|current\s+address",
        confidence: 0.8,
        extract: |p| p.location(),
    },
    FieldRule {
        key: "city",
        pattern: r"\bcity\b",
        confidence: 0.8,
        extract: |p| p.city.clone(),
    },
    FieldRule {
        key: "state",
        pattern: r"\bstate\b|province|region",
        confidence: 0.7,
        extract: |p| p.state.clone(),
    },
    FieldRule {
        key: "country",
        pattern: r"country",
        confidence: 0.8,
        extract: |p| p.country.clone(),
    },
];

static COMPILED_RULES: LazyLock<Vec<(Regex, &'static FieldRule)>> = LazyLock::new(|| {
    RULES
        .iter()
        .filter_map(|rule| Regex::new(rule.pattern).ok().map(|re| (re, rule)))
        .collect()
});

/// 标签归一化：小写、去掉必填星号、合并空白
pub fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace(['*', '✱'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// 按规则表解析标签；第一个命中且取值非空的规则胜出
pub fn resolve_label(label: &str, profile: &Profile) -> Option<FieldMatch> {
    let normalized = normalize_label(label);
    if normalized.is_empty() {
        return None;
    }
    for (regex, rule) in COMPILED_RULES.iter() {
        if !regex.is_match(&normalized) {
            continue;
        }
        let value = (rule.extract)(profile).filter(|v| !v.trim().is_empty());
        if let Some(value) = value {
            debug!("标签 '{}' → {} (置信度 {:.2})", normalized, rule.key, rule.confidence);
            return Some(FieldMatch {
                key: rule.key,
                value,
                confidence: rule.confidence,
            });
        }
    }
    None
}

/// 综合控件的标签、name 和 placeholder 解析取值
pub fn resolve_control(control: &FormControl, profile: &Profile) -> Option<FieldMatch> {
    if let Some(found) = control.label().and_then(|l| resolve_label(l, profile)) {
        return Some(found);
    }
    let name = humanize(&control.name);
    if let Some(found) = resolve_label(&name, profile) {
        return Some(found);
    }
    if !control.id.is_empty() {
        if let Some(found) = resolve_label(&humanize(&control.id), profile) {
            return Some(found);
        }
    }
    resolve_label(&control.placeholder, profile)
}

/// `urls[LinkedIn]`、`first_name` 这类属性转为可匹配的文本
fn humanize(attr: &str) -> String {
    attr.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { ' ' })
        .collect()
}

/// 在人工补充的答案里查找该控件的答案（按标签或 name 匹配）
pub fn match_user_input<'a>(inputs: &'a HashMap<String, String>, control: &FormControl) -> Option<&'a str> {
    if inputs.is_empty() {
        return None;
    }
    let mut keys = Vec::new();
    if let Some(label) = control.label() {
        keys.push(normalize_label(label));
    }
    if !control.name.is_empty() {
        keys.push(normalize_label(&control.name));
    }
    inputs
        .iter()
        .find(|(k, _)| keys.iter().any(|key| *key == normalize_label(k)))
        .map(|(_, v)| v.as_str())
}

// ========== 下拉框 ==========

static PLACEHOLDER_TEXT: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(select|choose|please select|--)").ok());

/// 是否为占位选项（空值，或 "Select..."、"-- choose --" 之类的文字）
pub fn is_placeholder_option(option: &SelectOption) -> bool {
    if option.value.trim().is_empty() {
        return true;
    }
    PLACEHOLDER_TEXT
        .as_ref()
        .map(|re| re.is_match(&option.text))
        .unwrap_or(false)
}

/// 去掉占位项后的真实选项
pub fn real_options(options: &[SelectOption]) -> Vec<&SelectOption> {
    options.iter().filter(|o| !is_placeholder_option(o)).collect()
}

/// 下拉框是否仍停留在占位状态
pub fn select_is_unset(control: &FormControl) -> bool {
    match control.options.iter().find(|o| o.selected) {
        Some(selected) => is_placeholder_option(selected),
        None => control.value.trim().is_empty() || control.options.iter().all(is_placeholder_option),
    }
}

/// 三轮匹配选项：精确 → 包含（含备选同义词）→ 单词模糊
pub fn choose_option<'a>(options: &'a [SelectOption], target: &str, fallbacks: &[&str]) -> Option<&'a SelectOption> {
    let candidates = real_options(options);
    let target = target.trim().to_lowercase();
    if target.is_empty() {
        return None;
    }

    if let Some(hit) = candidates
        .iter()
        .find(|o| o.text.trim().to_lowercase() == target || o.value.trim().to_lowercase() == target)
    {
        return Some(*hit);
    }

    let needles: Vec<String> = std::iter::once(target.clone())
        .chain(fallbacks.iter().map(|f| f.to_lowercase()))
        .filter(|n| !n.is_empty())
        .collect();
    for needle in &needles {
        if let Some(hit) = candidates.iter().find(|o| contains_phrase(&o.text.to_lowercase(), needle)) {
            return Some(*hit);
        }
    }

    let words: Vec<&str> = target.split_whitespace().filter(|w| w.chars().count() > 3).collect();
    candidates
        .iter()
        .find(|o| {
            let text = o.text.to_lowercase();
            words.iter().any(|w| contains_phrase(&text, w))
        })
        .copied()
}

const NEGATIONS: &[&str] = &["not", "no", "non", "never"];

/// `needle` 以完整单词出现在 `text` 中，且前一个词不是否定词
///
/// "no" 不匹配 "now"，"authorized" 不匹配 "not authorized"。
/// 两者均为小写。
pub fn contains_phrase(text: &str, needle: &str) -> bool {
    let needle = needle.trim();
    let (Some(first), Some(last)) = (needle.chars().next(), needle.chars().last()) else {
        return false;
    };
    let pattern = format!(
        "{}{}{}",
        if is_word_char(first) { r"\b" } else { "" },
        regex::escape(needle),
        if is_word_char(last) { r"\b" } else { "" },
    );
    let Ok(re) = Regex::new(&pattern) else {
        return false;
    };
    let negated_needle = NEGATIONS.iter().any(|n| needle.starts_with(&format!("{n} ")));
    let found = re
        .find_iter(text)
        .any(|m| negated_needle || !preceded_by_negation(&text[..m.start()]));
    found
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn preceded_by_negation(before: &str) -> bool {
    let before = before.trim_end_matches(|c: char| c.is_whitespace() || c == '-');
    let last_word = before
        .rsplit(|c: char| !is_word_char(c))
        .next()
        .unwrap_or_default();
    NEGATIONS.contains(&last_word)
}

/// 在下拉框里选中与目标最接近的项，返回是否选中了
pub async fn fill_dropdown(page: &dyn FormPage, control: &FormControl, target: &str, fallbacks: &[&str]) -> AppResult<bool> {
    let Some(option) = choose_option(&control.options, target, fallbacks) else {
        debug!("下拉框 {} 没有匹配 '{}' 的选项", control.selector, target);
        return Ok(false);
    };
    page.select_option(&control.selector, &option.value).await?;
    Ok(true)
}

/// 各工作许可类别的同义词，第一个为首选
pub fn work_authorization_synonyms(auth: WorkAuthorization) -> &'static [&'static str] {
    match auth {
        WorkAuthorization::Citizen => &["u.s. citizen", "us citizen", "citizen", "citizenship"],
        WorkAuthorization::PermanentResident => &["permanent resident", "green card", "lawful permanent"],
        WorkAuthorization::H1b => &["h-1b", "h1b", "h1-b"],
        WorkAuthorization::Opt => &["opt", "f-1", "f1", "stem opt"],
        WorkAuthorization::Tn => &["tn visa", "tn", "nafta"],
        WorkAuthorization::NeedsSponsorship => &["require sponsorship", "need sponsorship", "not authorized"],
    }
}

/// 工作许可下拉框：类别同义词，再退回到通用的 "authorized / yes"
pub async fn fill_work_authorization_dropdown(
    page: &dyn FormPage,
    control: &FormControl,
    auth: WorkAuthorization,
) -> AppResult<bool> {
    let synonyms = work_authorization_synonyms(auth);
    let generic: &[&str] = if auth.is_authorized() {
        &["authorized", "yes"]
    } else {
        &["sponsorship", "no"]
    };
    let fallbacks: Vec<&str> = synonyms[1..].iter().chain(generic.iter()).copied().collect();
    fill_dropdown(page, control, synonyms[0], &fallbacks).await
}

// ========== 单选 / 是否题 ==========

const YES_VALUES: &[&str] = &["yes", "true", "1", "y"];
const NO_VALUES: &[&str] = &["no", "false", "0", "n"];

/// 在一组单选按钮中选出与答案对应的那个
///
/// 先比较 value 属性，再比较关联标签（for 关联优先，其次祖先 label）。
/// 答案是是/否时按 {yes,true,1} / {no,false,0} 匹配。
pub fn choose_radio<'a>(radios: &'a [FormControl], answer: &str) -> Option<&'a FormControl> {
    let answer = answer.trim().to_lowercase();
    let accepted: Vec<&str> = if YES_VALUES.contains(&answer.as_str()) {
        YES_VALUES.to_vec()
    } else if NO_VALUES.contains(&answer.as_str()) {
        NO_VALUES.to_vec()
    } else {
        vec![answer.as_str()]
    };
    let boolean = accepted.len() > 1;

    if let Some(hit) = radios
        .iter()
        .find(|r| accepted.contains(&r.value.trim().to_lowercase().as_str()))
    {
        return Some(hit);
    }
    radios.iter().find(|r| {
        let Some(label) = r.label() else {
            return false;
        };
        let label = label.trim().to_lowercase();
        if boolean {
            accepted.iter().any(|a| label == *a || label.starts_with(&format!("{a},")) || label.starts_with(&format!("{a} ")))
        } else {
            label == answer || label.contains(answer.as_str())
        }
    })
}

/// 勾选与答案对应的单选按钮
pub async fn fill_radio_group(page: &dyn FormPage, radios: &[FormControl], answer: &str) -> AppResult<bool> {
    match choose_radio(radios, answer) {
        Some(radio) => {
            page.check(&radio.selector).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

// ========== 复选框 ==========

/// 勾选 value 或 name 包含任一目标子串的复选框，已勾选的跳过；返回新勾选的数量
pub async fn fill_checkbox_group(page: &dyn FormPage, boxes: &[FormControl], targets: &[&str]) -> AppResult<usize> {
    let targets: Vec<String> = targets.iter().map(|t| t.to_lowercase()).collect();
    let mut checked = 0;
    for checkbox in boxes.iter().filter(|c| c.kind() == ControlKind::Checkbox) {
        if checkbox.checked {
            continue;
        }
        let value = checkbox.value.to_lowercase();
        let name = checkbox.name.to_lowercase();
        if targets.iter().any(|t| value.contains(t) || name.contains(t)) {
            page.check(&checkbox.selector).await?;
            checked += 1;
        }
    }
    Ok(checked)
}

/// 条款确认之类的必勾复选框：找到第一个标签匹配 `pattern` 的未勾选复选框并勾选
pub async fn check_required_checkbox(page: &dyn FormPage, controls: &[FormControl], pattern: &Regex) -> AppResult<bool> {
    let target = controls.iter().find(|c| {
        c.kind() == ControlKind::Checkbox && !c.checked && c.label().map(|l| pattern.is_match(l)).unwrap_or(false)
    });
    match target {
        Some(checkbox) => {
            page.check(&checkbox.selector).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

// ========== 通用答案 ==========

/// 少量固定的“问题 → 通用安全答案”；只作为显式、可审计的兜底，不为单个字段编造答案
const GENERIC_ANSWERS: &[(&str, &str)] = &[
    (r"how did you (hear|learn|find out) about", "Online job search"),
    (r"where did you (hear|find|see) (about )?(this|us|the)", "Online job search"),
    (r"referred by|referral source", "N/A"),
];

static COMPILED_ANSWERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    GENERIC_ANSWERS
        .iter()
        .filter_map(|(pattern, answer)| Regex::new(pattern).ok().map(|re| (re, *answer)))
        .collect()
});

pub fn generic_answer(question: &str) -> Option<&'static str> {
    let normalized = normalize_label(question);
    COMPILED_ANSWERS
        .iter()
        .find(|(re, _)| re.is_match(&normalized))
        .map(|(_, answer)| *answer)
}
