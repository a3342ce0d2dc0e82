use axum::{
    extract::{Multipart, Path, State},
    response::Redirect,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::handlers::auth_handler::AdminUser;
use crate::handlers::Page;
use crate::models::photo::Photo;
use crate::services::enrichment::EnrichJob;
use crate::services::renderer::localized_opt;
use crate::services::site_context::{build_site_context, Preferences};
use crate::services::upload_service::{random_photo_name, save_file};
use crate::AppState;

#[derive(Serialize)]
pub struct PhotoView {
    pub id: i64,
    pub url: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct GalleryPage {
    pub photos: Vec<PhotoView>,
}

/// 1. 相册
pub async fn gallery(
    State(state): State<Arc<AppState>>,
    prefs: Preferences,
) -> AppResult<Json<Page<GalleryPage>>> {
    let photos = sqlx::query_as::<_, Photo>("SELECT * FROM photos ORDER BY created_at DESC")
        .fetch_all(&state.db)
        .await?;

    let photos = photos
        .into_iter()
        .map(|p| PhotoView {
            id: p.id,
            url: format!("/uploads/photos/{}", p.filename),
            title: localized_opt(prefs.lang, p.title.as_deref(), p.title_en.as_deref()).map(str::to_string),
            description: localized_opt(prefs.lang, p.description.as_deref(), p.description_en.as_deref())
                .map(str::to_string),
            created_at: p.created_at,
        })
        .collect();

    let settings = state.settings.current().await;
    let site = build_site_context(&state.db, &settings, &prefs).await?;
    Ok(Json(Page { site, page: GalleryPage { photos } }))
}

/// 2. 上传照片 (multipart: photo, title, description)
pub async fn upload_photo(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    mut multipart: Multipart,
) -> AppResult<Redirect> {
    let mut file: Option<(String, Vec<u8>)> = None;
    let mut title: Option<String> = None;
    let mut description: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "photo" => {
                let original = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
                if !original.is_empty() && !bytes.is_empty() {
                    file = Some((original, bytes.to_vec()));
                }
            }
            "title" | "description" => {
                let text = field.text().await.map_err(|e| AppError::BadRequest(e.to_string()))?;
                let text = Some(text.trim().to_string()).filter(|t| !t.is_empty());
                if name == "title" {
                    title = text;
                } else {
                    description = text;
                }
            }
            _ => {}
        }
    }

    let Some((original, bytes)) = file else {
        tracing::warn!("--- 上传请求中没有照片文件");
        return Ok(Redirect::to("/gallery"));
    };

    let filename = random_photo_name(&original);
    save_file(&state.config.upload_dir.join("photos"), &filename, &bytes).await?;

    let id: i64 = sqlx::query_scalar(
        "INSERT INTO photos (filename, title, description, created_at) VALUES (?, ?, ?, ?) RETURNING id",
    )
    .bind(&filename)
    .bind(title)
    .bind(description)
    .bind(Utc::now())
    .fetch_one(&state.db)
    .await?;

    state.enrichment.submit(EnrichJob::Photo(id));
    tracing::info!("<<< 照片已上传: id={}, file={}", id, filename);
    Ok(Redirect::to("/gallery"))
}

/// 3. 删除照片，文件删除失败不影响结果
pub async fn delete_photo(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    let filename: String = sqlx::query_scalar("SELECT filename FROM photos WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("照片 {id}")))?;

    let path = state.config.upload_dir.join("photos").join(&filename);
    if let Err(e) = tokio::fs::remove_file(&path).await {
        tracing::warn!("--- 照片文件删除失败: {}, Error: {}", path.display(), e);
    }

    sqlx::query("DELETE FROM photos WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    tracing::info!("<<< 照片已删除: id={}", id);
    Ok(Redirect::to("/gallery"))
}
