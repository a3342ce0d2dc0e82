use serde::Serialize;

use crate::services::site_context::SiteContext;

pub mod auth_handler;
pub mod chat_handler;
pub mod photo_handler;
pub mod post_handler;
pub mod session_handler;
pub mod settings_handler;

/// 页面响应：站点上下文 + 页面自身数据
#[derive(Debug, Serialize)]
pub struct Page<T> {
    pub site: SiteContext,
    #[serde(flatten)]
    pub page: T,
}
