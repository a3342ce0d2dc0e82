use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub title_en: Option<String>,
    pub content: String, // Markdown 原文
    pub content_en: Option<String>,
    pub summary_zh: Option<String>,
    pub summary_en: Option<String>,
    pub created_at: DateTime<Utc>,
    pub custom_author: Option<String>,
    pub author_id: i64,
    pub category_id: Option<i64>,
}

/// 新建/编辑文章的表单
#[derive(Debug, Default, Deserialize)]
pub struct PostForm {
    pub title: String,
    pub content: String,
    pub category_id: Option<String>, // 下拉框可能提交空串
    pub new_category: Option<String>,
    pub custom_author: Option<String>,
    pub created_at: Option<String>, // 形如 2024-05-01T08:30
}
