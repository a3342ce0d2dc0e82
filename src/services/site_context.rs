use std::convert::Infallible;

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use axum_extra::extract::CookieJar;
use serde::Serialize;
use sqlx::SqlitePool;

use crate::models::category::Category;
use crate::models::site_setting::{SiteSetting, SocialLink};
use crate::services::notice::parse_notifications;
use crate::services::renderer::Lang;

pub const LANG_COOKIE: &str = "lang";
pub const THEME_COOKIE: &str = "theme";
pub const THEME_CODE_BLACK: &str = "code_black";
pub const THEME_SIMPLE_WHITE: &str = "simple_white";

/// 访客偏好，保存在 Cookie 中
#[derive(Debug, Clone, Default)]
pub struct Preferences {
    pub lang: Lang,
    pub theme: Option<String>,
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for Preferences {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let lang = jar
            .get(LANG_COOKIE)
            .and_then(|c| Lang::parse(c.value()))
            .unwrap_or_default();
        let theme = jar.get(THEME_COOKIE).map(|c| c.value().to_string());
        Ok(Self { lang, theme })
    }
}

/// 当前生效的主题：Cookie 优先，其次站点设置 ('dark' / 'white' 为旧值)
pub fn resolve_theme(cookie: Option<&str>, setting: &str) -> &'static str {
    let raw = cookie.unwrap_or(setting);
    match raw {
        THEME_SIMPLE_WHITE | "white" => THEME_SIMPLE_WHITE,
        _ => THEME_CODE_BLACK,
    }
}

/// 每个页面都会带上的站点上下文
#[derive(Debug, Serialize)]
pub struct SiteContext {
    pub blog_name: String,
    pub logo_filename: Option<String>,
    pub social_links: Vec<SocialLink>,
    pub categories: Vec<Category>,
    pub current_lang: Lang,
    pub theme: &'static str,
    pub notifications: Vec<String>,
}

pub async fn build_site_context(
    db: &SqlitePool,
    settings: &SiteSetting,
    prefs: &Preferences,
) -> Result<SiteContext, sqlx::Error> {
    let categories = sqlx::query_as::<_, Category>("SELECT id, name FROM categories ORDER BY id")
        .fetch_all(db)
        .await?;

    Ok(SiteContext {
        blog_name: settings.blog_name.clone(),
        logo_filename: settings.logo_filename.clone(),
        social_links: settings.social_links(),
        categories,
        current_lang: prefs.lang,
        theme: resolve_theme(prefs.theme.as_deref(), &settings.theme),
        notifications: parse_notifications(settings.notification_content.as_deref().unwrap_or("")),
    })
}
