use serde::{Deserialize, Serialize};

/// 工作许可类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkAuthorization {
    Citizen,
    PermanentResident,
    H1b,
    Opt,
    Tn,
    /// 需要雇主担保才能工作
    NeedsSponsorship,
}

impl WorkAuthorization {
    /// 当前是否可以合法工作
    pub fn is_authorized(self) -> bool {
        !matches!(self, WorkAuthorization::NeedsSponsorship)
    }

    /// 现在或将来是否需要签证担保
    pub fn requires_sponsorship(self) -> bool {
        matches!(
            self,
            WorkAuthorization::H1b
                | WorkAuthorization::Opt
                | WorkAuthorization::Tn
                | WorkAuthorization::NeedsSponsorship
        )
    }
}

/// 申请人资料（对适配器只读）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub linkedin_url: Option<String>,
    #[serde(default)]
    pub github_url: Option<String>,
    #[serde(default)]
    pub portfolio_url: Option<String>,
    #[serde(default)]
    pub current_company: Option<String>,
    #[serde(default)]
    pub current_title: Option<String>,
    #[serde(default)]
    pub work_authorization: Option<WorkAuthorization>,
}

impl Profile {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
            .trim()
            .to_string()
    }

    /// "城市, 州" 形式的地点；两者都为空时返回 None
    pub fn location(&self) -> Option<String> {
        let parts: Vec<&str> = [self.city.as_deref(), self.state.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}
