use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// 站点设置，全库仅一行
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct SiteSetting {
    pub id: i64,
    pub blog_name: String,
    pub about_content: Option<String>,
    pub about_content_en: Option<String>,
    pub social_links: String, // JSON 字符串
    pub logo_filename: Option<String>,
    #[serde(skip_serializing)]
    pub deepseek_api_key: Option<String>,
    pub notification_content: Option<String>,
    pub theme: String, // 'dark' / 'white' 或模板目录名
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLink {
    pub icon: String,
    pub url: String,
}

impl SiteSetting {
    /// 解析社交链接，格式错误时返回空列表
    pub fn social_links(&self) -> Vec<SocialLink> {
        serde_json::from_str(&self.social_links).unwrap_or_default()
    }

    /// 站点设置中填写的 API Key 覆盖值
    pub fn api_key_override(&self) -> Option<&str> {
        self.deepseek_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }
}

impl Default for SiteSetting {
    fn default() -> Self {
        Self {
            id: 0,
            blog_name: "Wslll Blog".to_string(),
            about_content: None,
            about_content_en: None,
            social_links: "[]".to_string(),
            logo_filename: None,
            deepseek_api_key: None,
            notification_content: None,
            theme: "dark".to_string(),
        }
    }
}
