use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Redirect,
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Serialize;
use std::sync::Arc;

use crate::error::AppResult;
use crate::handlers::Page;
use crate::services::renderer::Lang;
use crate::services::site_context::{
    build_site_context, resolve_theme, Preferences, LANG_COOKIE, THEME_COOKIE, THEME_CODE_BLACK,
    THEME_SIMPLE_WHITE,
};
use crate::AppState;

#[derive(Serialize)]
pub struct Empty {}

/// 跳回来源页面，没有 Referer 时回首页
fn back(headers: &HeaderMap) -> Redirect {
    let target = headers
        .get(header::REFERER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .unwrap_or("/");
    Redirect::to(target)
}

fn pref_cookie(name: &'static str, value: &str) -> Cookie<'static> {
    Cookie::build((name, value.to_string()))
        .path("/")
        .max_age(time::Duration::days(365))
        .build()
}

/// 1. 切换主题 (code_black <-> simple_white)
pub async fn toggle_theme(
    State(state): State<Arc<AppState>>,
    prefs: Preferences,
    jar: CookieJar,
    headers: HeaderMap,
) -> (CookieJar, Redirect) {
    let settings = state.settings.current().await;
    let next = match resolve_theme(prefs.theme.as_deref(), &settings.theme) {
        THEME_SIMPLE_WHITE => THEME_CODE_BLACK,
        _ => THEME_SIMPLE_WHITE,
    };
    tracing::debug!("切换主题: {}", next);
    (jar.add(pref_cookie(THEME_COOKIE, next)), back(&headers))
}

/// 2. 切换语言，只接受 zh / en
pub async fn set_lang(Path(lang): Path<String>, jar: CookieJar, headers: HeaderMap) -> (CookieJar, Redirect) {
    let jar = match Lang::parse(&lang) {
        Some(lang) => jar.add(pref_cookie(LANG_COOKIE, lang.as_str())),
        None => {
            tracing::warn!("--- 不支持的语言: {}", lang);
            jar
        }
    };
    (jar, back(&headers))
}

/// 3. 站点上下文 (前端每个页面共用)
pub async fn site(State(state): State<Arc<AppState>>, prefs: Preferences) -> AppResult<Json<Page<Empty>>> {
    let settings = state.settings.current().await;
    let site = build_site_context(&state.db, &settings, &prefs).await?;
    Ok(Json(Page { site, page: Empty {} }))
}
