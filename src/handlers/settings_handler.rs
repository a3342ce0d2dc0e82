use axum::{
    extract::{Multipart, State},
    response::Redirect,
    Json,
};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::handlers::auth_handler::AdminUser;
use crate::handlers::Page;
use crate::models::site_setting::{SiteSetting, SocialLink};
use crate::services::enrichment::EnrichJob;
use crate::services::renderer::{localized_opt, render_markdown};
use crate::services::site_context::{build_site_context, Preferences};
use crate::services::upload_service::{save_file, secure_filename};
use crate::AppState;

#[derive(Serialize)]
pub struct AboutPage {
    pub content: String,
    pub social_links: Vec<SocialLink>,
}

#[derive(Serialize)]
pub struct SettingsView {
    #[serde(flatten)]
    pub settings: SiteSetting,
    pub has_api_key: bool,
}

/// 设置表单中收集到的字段，缺失的字段保持原值
#[derive(Debug, Default)]
struct SettingsForm {
    blog_name: Option<String>,
    about_content: Option<String>,
    notification_content: Option<String>,
    deepseek_api_key: Option<String>,
    theme: Option<String>,
    social_icons: Vec<String>,
    social_urls: Vec<String>,
    logo: Option<(String, Vec<u8>)>,
}

impl SettingsForm {
    /// 图标与链接按顺序配对，任一为空的行丢弃
    fn social_links(&self) -> Vec<SocialLink> {
        self.social_icons
            .iter()
            .zip(self.social_urls.iter())
            .filter(|(icon, url)| !icon.trim().is_empty() && !url.trim().is_empty())
            .map(|(icon, url)| SocialLink {
                icon: icon.trim().to_string(),
                url: url.trim().to_string(),
            })
            .collect()
    }
}

async fn read_form(mut multipart: Multipart) -> AppResult<SettingsForm> {
    let mut form = SettingsForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "logo" {
            let original = field.file_name().unwrap_or_default().to_string();
            let bytes = field.bytes().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
            if !original.is_empty() && !bytes.is_empty() {
                form.logo = Some((original, bytes.to_vec()));
            }
            continue;
        }

        let value = field.text().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
        match name.as_str() {
            "blog_name" => form.blog_name = Some(value),
            "about_content" => form.about_content = Some(value),
            "notification_content" => form.notification_content = Some(value),
            "deepseek_api_key" => form.deepseek_api_key = Some(value),
            "theme" => form.theme = Some(value),
            "social_icon[]" => form.social_icons.push(value),
            "social_url[]" => form.social_urls.push(value),
            _ => {}
        }
    }

    Ok(form)
}

/// 1. 关于页面
pub async fn about(
    State(state): State<Arc<AppState>>,
    prefs: Preferences,
) -> AppResult<Json<Page<AboutPage>>> {
    let settings = state.settings.current().await;

    let content = localized_opt(
        prefs.lang,
        settings.about_content.as_deref(),
        settings.about_content_en.as_deref(),
    )
    .map(render_markdown)
    .unwrap_or_default();

    let page = AboutPage {
        content,
        social_links: settings.social_links(),
    };
    let site = build_site_context(&state.db, &settings, &prefs).await?;
    Ok(Json(Page { site, page }))
}

/// 2. 读取站点设置 (不返回 API Key 明文)
pub async fn get_settings(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> AppResult<Json<SettingsView>> {
    let settings = state.settings.reload().await?;
    let has_api_key = settings.api_key_override().is_some();
    Ok(Json(SettingsView { settings, has_api_key }))
}

/// 3. 保存站点设置；"关于"内容变化后在后台重新翻译
pub async fn update_settings(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    multipart: Multipart,
) -> AppResult<Redirect> {
    let form = read_form(multipart).await?;
    let mut settings = state.settings.reload().await?;
    tracing::info!(">>> 保存站点设置");

    if let Some(name) = form.blog_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        settings.blog_name = name.to_string();
    }
    if let Some(about) = form.about_content.clone() {
        if settings.about_content.as_deref() != Some(about.as_str()) {
            settings.about_content_en = None;
        }
        settings.about_content = Some(about);
    }
    if let Some(notice) = form.notification_content.clone() {
        settings.notification_content = Some(notice);
    }
    // 留空表示不修改
    if let Some(key) = form.deepseek_api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
        settings.deepseek_api_key = Some(key.to_string());
    }
    if let Some(theme) = form.theme.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        settings.theme = theme.to_string();
    }
    settings.social_links = serde_json::to_string(&form.social_links())
        .map_err(|e| AppError::Internal(e.to_string()))?;

    if let Some((original, bytes)) = &form.logo {
        let filename = secure_filename(original)
            .ok_or_else(|| AppError::BadRequest("Logo 文件名无效".to_string()))?;
        save_file(&state.config.upload_dir.join("logo"), &filename, bytes).await?;
        settings.logo_filename = Some(filename);
    }

    sqlx::query(
        r#"
        UPDATE site_settings SET
            blog_name = ?, about_content = ?, about_content_en = ?, social_links = ?,
            logo_filename = ?, deepseek_api_key = ?, notification_content = ?, theme = ?
        WHERE id = ?
        "#,
    )
    .bind(&settings.blog_name)
    .bind(&settings.about_content)
    .bind(&settings.about_content_en)
    .bind(&settings.social_links)
    .bind(&settings.logo_filename)
    .bind(&settings.deepseek_api_key)
    .bind(&settings.notification_content)
    .bind(&settings.theme)
    .bind(settings.id)
    .execute(&state.db)
    .await?;

    state.settings.reload().await?;
    state.enrichment.submit(EnrichJob::About);
    tracing::info!("<<< 站点设置已保存，关于页面翻译在后台进行");
    Ok(Redirect::to("/settings"))
}
