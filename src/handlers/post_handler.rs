use axum::{
    extract::{Path, Query, State},
    response::Redirect,
    Form, Json,
};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::handlers::auth_handler::AdminUser;
use crate::handlers::Page;
use crate::models::category::Category;
use crate::models::post::{Post, PostForm};
use crate::services::enrichment::EnrichJob;
use crate::services::renderer::{localized, localized_opt, render_markdown};
use crate::services::site_context::{build_site_context, Preferences};
use crate::AppState;

const FORM_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M";

#[derive(Deserialize)]
pub struct IndexQuery {
    pub category: Option<String>,
}

/// 文章 + 作者用户名
#[derive(FromRow)]
struct PostRow {
    #[sqlx(flatten)]
    post: Post,
    username: Option<String>,
}

impl PostRow {
    fn author(&self) -> String {
        self.post
            .custom_author
            .as_deref()
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .or(self.username.as_deref())
            .unwrap_or("admin")
            .to_string()
    }
}

#[derive(Serialize)]
pub struct PostListItem {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub author: String,
    pub category_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct IndexPage {
    pub active_category: Option<Category>,
    pub posts: Vec<PostListItem>,
}

#[derive(Serialize)]
pub struct PostView {
    pub id: i64,
    pub title: String,
    pub html_content: String,
    pub summary: Option<String>,
    pub author: String,
    pub category: Option<Category>,
    pub created_at: DateTime<Utc>,
}

/// 解析表单里的 datetime-local 值，格式不对返回 None
pub fn parse_form_time(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();
    NaiveDateTime::parse_from_str(value, FORM_TIME_FORMAT)
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// 新分类名优先 (已存在则复用)，否则使用下拉框选中的分类
async fn resolve_category(db: &SqlitePool, form: &PostForm) -> Result<Option<i64>, sqlx::Error> {
    if let Some(name) = form.new_category.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        let existing: Option<i64> = sqlx::query_scalar("SELECT id FROM categories WHERE name = ?")
            .bind(name)
            .fetch_optional(db)
            .await?;
        if let Some(id) = existing {
            return Ok(Some(id));
        }

        let id = sqlx::query_scalar("INSERT INTO categories (name) VALUES (?) RETURNING id")
            .bind(name)
            .fetch_one(db)
            .await?;
        tracing::info!("<<< 新建分类: {} (id={})", name, id);
        return Ok(Some(id));
    }

    Ok(form
        .category_id
        .as_deref()
        .and_then(|v| v.trim().parse::<i64>().ok()))
}

fn validate(form: &PostForm) -> AppResult<()> {
    if form.title.trim().is_empty() || form.content.trim().is_empty() {
        return Err(AppError::BadRequest("标题和正文不能为空".to_string()));
    }
    Ok(())
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

async fn find_category(db: &SqlitePool, id: Option<i64>) -> Result<Option<Category>, sqlx::Error> {
    match id {
        Some(id) => sqlx::query_as::<_, Category>("SELECT id, name FROM categories WHERE id = ?")
            .bind(id)
            .fetch_optional(db)
            .await,
        None => Ok(None),
    }
}

/// 1. 首页文章列表，可按分类筛选
pub async fn index(
    State(state): State<Arc<AppState>>,
    prefs: Preferences,
    Query(query): Query<IndexQuery>,
) -> AppResult<Json<Page<IndexPage>>> {
    let category_id = query.category.as_deref().and_then(|v| v.parse::<i64>().ok());

    let rows = sqlx::query_as::<_, PostRow>(
        r#"
        SELECT p.*, u.username
        FROM posts p LEFT JOIN users u ON u.id = p.author_id
        WHERE (? IS NULL OR p.category_id = ?)
        ORDER BY p.created_at DESC
        "#,
    )
    .bind(category_id)
    .bind(category_id)
    .fetch_all(&state.db)
    .await?;

    let posts = rows
        .iter()
        .map(|row| PostListItem {
            id: row.post.id,
            title: localized(prefs.lang, &row.post.title, row.post.title_en.as_deref()).to_string(),
            summary: localized_opt(prefs.lang, row.post.summary_zh.as_deref(), row.post.summary_en.as_deref())
                .map(str::to_string),
            author: row.author(),
            category_id: row.post.category_id,
            created_at: row.post.created_at,
        })
        .collect();

    let active_category = find_category(&state.db, category_id).await?;
    let settings = state.settings.current().await;
    let site = build_site_context(&state.db, &settings, &prefs).await?;

    Ok(Json(Page { site, page: IndexPage { active_category, posts } }))
}

/// 2. 文章详情，按语言偏好渲染
pub async fn get_post(
    State(state): State<Arc<AppState>>,
    prefs: Preferences,
    Path(id): Path<i64>,
) -> AppResult<Json<Page<PostView>>> {
    let row = sqlx::query_as::<_, PostRow>(
        "SELECT p.*, u.username FROM posts p LEFT JOIN users u ON u.id = p.author_id WHERE p.id = ?",
    )
    .bind(id)
    .fetch_optional(&state.db)
    .await?
    .ok_or_else(|| AppError::NotFound(format!("文章 {id}")))?;

    let post = &row.post;
    let content = localized(prefs.lang, &post.content, post.content_en.as_deref());
    let view = PostView {
        id: post.id,
        title: localized(prefs.lang, &post.title, post.title_en.as_deref()).to_string(),
        html_content: render_markdown(content),
        summary: localized_opt(prefs.lang, post.summary_zh.as_deref(), post.summary_en.as_deref())
            .map(str::to_string),
        author: row.author(),
        category: find_category(&state.db, post.category_id).await?,
        created_at: post.created_at,
    };

    let settings = state.settings.current().await;
    let site = build_site_context(&state.db, &settings, &prefs).await?;
    Ok(Json(Page { site, page: view }))
}

/// 3. 发布文章，AI 翻译与摘要在后台进行
pub async fn create_post(
    State(state): State<Arc<AppState>>,
    AdminUser(claims): AdminUser,
    Form(form): Form<PostForm>,
) -> AppResult<Redirect> {
    validate(&form)?;
    tracing::info!(">>> 发布文章: title={}", form.title);

    let created_at = parse_form_time(form.created_at.as_deref()).unwrap_or_else(Utc::now);
    let category_id = resolve_category(&state.db, &form).await?;

    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO posts (title, content, created_at, custom_author, author_id, category_id)
        VALUES (?, ?, ?, ?, ?, ?)
        RETURNING id
        "#,
    )
    .bind(&form.title)
    .bind(&form.content)
    .bind(created_at)
    .bind(non_blank(&form.custom_author))
    .bind(claims.sub)
    .bind(category_id)
    .fetch_one(&state.db)
    .await?;

    state.enrichment.submit(EnrichJob::Post(id));
    tracing::info!("<<< 文章已发布: id={}, AI 加工已在后台进行", id);
    Ok(Redirect::to("/"))
}

/// 4. 编辑文章；原文变化时清空对应的译文/摘要，交给后台重新生成
pub async fn edit_post(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
    Form(form): Form<PostForm>,
) -> AppResult<Redirect> {
    validate(&form)?;
    tracing::info!(">>> 编辑文章: id={}", id);

    let post = sqlx::query_as::<_, Post>("SELECT * FROM posts WHERE id = ?")
        .bind(id)
        .fetch_optional(&state.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("文章 {id}")))?;

    // 时间格式不对时保留原值
    let created_at = parse_form_time(form.created_at.as_deref()).unwrap_or(post.created_at);
    let category_id = resolve_category(&state.db, &form).await?;

    let title_changed = post.title != form.title;
    let content_changed = post.content != form.content;

    sqlx::query(
        r#"
        UPDATE posts SET
            title = ?, content = ?, custom_author = ?, created_at = ?, category_id = ?,
            title_en = CASE WHEN ? THEN NULL ELSE title_en END,
            content_en = CASE WHEN ? THEN NULL ELSE content_en END,
            summary_zh = CASE WHEN ? THEN NULL ELSE summary_zh END,
            summary_en = CASE WHEN ? THEN NULL ELSE summary_en END
        WHERE id = ?
        "#,
    )
    .bind(&form.title)
    .bind(&form.content)
    .bind(non_blank(&form.custom_author))
    .bind(created_at)
    .bind(category_id)
    .bind(title_changed)
    .bind(content_changed)
    .bind(content_changed)
    .bind(content_changed)
    .bind(id)
    .execute(&state.db)
    .await?;

    state.enrichment.submit(EnrichJob::Post(id));
    tracing::info!("<<< 文章已更新: id={}, 标题变化={}, 正文变化={}", id, title_changed, content_changed);
    Ok(Redirect::to(&format!("/post/{id}")))
}

/// 5. 删除文章
pub async fn delete_post(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<i64>,
) -> AppResult<Redirect> {
    tracing::warn!(">>> 正在删除文章: id={}", id);

    let result = sqlx::query("DELETE FROM posts WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await?;

    if result.rows_affected() == 0 {
        tracing::warn!("--- 尝试删除不存在的文章: id={}", id);
        return Err(AppError::NotFound(format!("文章 {id}")));
    }
    Ok(Redirect::to("/"))
}
