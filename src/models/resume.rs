use serde::{Deserialize, Serialize};

/// 简历记录（文件本体在存储层，按 storage_path 下载）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resume {
    pub id: String,
    pub user_id: String,
    pub storage_path: String,
    pub file_name: String,
}

impl Resume {
    /// 本地落盘用的安全文件名
    pub fn safe_file_name(&self) -> String {
        let cleaned: String = self
            .file_name
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if cleaned.trim_matches(|c| c == '.' || c == '_').is_empty() {
            "resume.pdf".to_string()
        } else {
            cleaned
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resume(name: &str) -> Resume {
        Resume {
            id: "r".into(),
            user_id: "u".into(),
            storage_path: "u/resume.pdf".into(),
            file_name: name.into(),
        }
    }

    #[test]
    fn safe_file_name_strips_path_separators() {
        assert_eq!(resume("../../etc/passwd").safe_file_name(), ".._.._etc_passwd");
        assert_eq!(resume("Jane Doe CV.pdf").safe_file_name(), "Jane_Doe_CV.pdf");
        assert_eq!(resume("..").safe_file_name(), "resume.pdf");
    }
}
