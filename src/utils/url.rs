//! URL 工具：去重用的规范化、可注册域名提取、ATS 站点识别

use url::Url;

use crate::models::SiteType;

/// 规范化时剔除的追踪参数
const TRACKING_PARAMS: &[&str] = &[
    "gclid",
    "fbclid",
    "ref",
    "source",
    "gh_src",
    "lever-source",
    "lever-origin",
    "mc_cid",
    "mc_eid",
];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// 规范化职位 URL（去重键）
///
/// - 主机名小写（由 `url` 解析保证）
/// - 丢弃 fragment
/// - 去掉路径末尾的 `/`（根路径除外）
/// - 删除追踪参数，其余参数保持原有顺序
///
/// 无法解析的输入原样（去空白）返回。结果是幂等的。
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    let Ok(mut url) = Url::parse(trimmed) else {
        return trimmed.to_string();
    };

    url.set_fragment(None);

    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept.iter());
    }

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    url.to_string()
}

/// 提取可注册域名（主机名最后两段），解析失败返回 None
pub fn registrable_domain(raw: &str) -> Option<String> {
    let url = Url::parse(raw.trim()).ok()?;
    let host = url.host_str()?.to_ascii_lowercase();
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    if labels.len() <= 2 {
        return Some(labels.join("."));
    }
    Some(labels[labels.len() - 2..].join("."))
}

/// 主机名（小写）
pub fn host_of(raw: &str) -> Option<String> {
    Url::parse(raw.trim())
        .ok()?
        .host_str()
        .map(|h| h.to_ascii_lowercase())
}

/// 主机名等于 `domain` 或是它的子域名
pub fn host_matches(raw: &str, domain: &str) -> bool {
    host_of(raw)
        .map(|host| host == domain || host.ends_with(&format!(".{domain}")))
        .unwrap_or(false)
}

/// 根据主机名识别 ATS 类型
pub fn detect_site_type(raw: &str) -> SiteType {
    if host_matches(raw, "greenhouse.io") {
        SiteType::Greenhouse
    } else if host_matches(raw, "lever.co") {
        SiteType::Lever
    } else if host_matches(raw, "ashbyhq.com") {
        SiteType::Ashby
    } else if host_matches(raw, "myworkdayjobs.com") || host_matches(raw, "workday.com") {
        SiteType::Workday
    } else {
        SiteType::Unknown
    }
}
