mod common;

use axum::body::Body;
use axum::http::{header, Request, Response, StatusCode};
use blog_backend::handlers::auth_handler::issue_token;
use blog_backend::services::otp_service;
use blog_backend::{build_router, AppState};
use chrono::Utc;
use common::*;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

async fn send(state: &Arc<AppState>, request: Request<Body>) -> Response<Body> {
    build_router(state.clone()).oneshot(request).await.unwrap()
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response<Body>) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

fn chat_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_form(state: &AppState, uri: &str, form: &str) -> Request<Body> {
    let token = issue_token(&state.config.secret_key, 1).unwrap();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn location(response: &Response<Body>) -> &str {
    response.headers().get(header::LOCATION).unwrap().to_str().unwrap()
}

fn set_cookie(response: &Response<Body>) -> String {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| v.to_str().unwrap().to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

// ---- AI 助手 ----

#[tokio::test]
async fn chat_without_message_is_rejected_before_any_model_call() {
    let llm = FakeLlm::ok();
    let state = test_state(llm.clone()).await;

    let response = send(&state, chat_request(json!({}))).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn chat_streams_model_tokens_as_plain_text() {
    let llm = FakeLlm::streaming(&["Hel", "lo", "!"]);
    let state = test_state(llm.clone()).await;
    let id = insert_post(&state.db, "第一篇", "正文内容").await;

    let history: Vec<Value> = (0..8)
        .map(|i| json!({ "role": "user", "content": format!("q{i}") }))
        .collect();
    let response = send(&state, chat_request(json!({ "message": "介绍一下", "history": history }))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));
    assert_eq!(body_text(response).await, "Hello!");

    let calls = llm.calls();
    let messages = &calls[0].messages;
    assert_eq!(messages.len(), 8);
    assert_eq!(messages[1].content, "q2");
    assert_eq!(messages[7].content, "介绍一下");
    assert!(messages[0].content.contains("Blog Name: Wslll Blog"));
    assert!(messages[0].content.contains(&format!("http://127.0.0.1:15013/post/{id}")));
    assert!(messages[0].content.contains("Summary: 正文内容..."));
}

#[tokio::test]
async fn chat_api_failure_becomes_an_error_line() {
    let llm = FakeLlm::failing();
    let state = test_state(llm.clone()).await;

    let response = send(&state, chat_request(json!({ "message": "hi" }))).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response).await.starts_with("Error:"));
}

#[tokio::test]
async fn chat_fault_mid_stream_keeps_partial_output() {
    let llm = Arc::new(FakeLlm {
        tokens: vec!["partial ".to_string()],
        fail_mid_stream: true,
        ..Default::default()
    });
    let state = test_state(llm.clone()).await;

    let response = send(&state, chat_request(json!({ "message": "hi" }))).await;

    let body = body_text(response).await;
    assert!(body.starts_with("partial Error:"), "body: {body}");
}

// ---- 文章 ----

#[tokio::test]
async fn unknown_post_is_not_found() {
    let state = test_state(FakeLlm::ok()).await;

    let response = send(&state, get("/post/42")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn english_preference_renders_translated_content() {
    let state = test_state(FakeLlm::ok()).await;
    let id = insert_post(&state.db, "标题", "# 中文").await;
    sqlx::query("UPDATE posts SET title_en = 'Title', content_en = '# English' WHERE id = ?")
        .bind(id)
        .execute(&state.db)
        .await
        .unwrap();

    let en = Request::builder()
        .uri(format!("/post/{id}"))
        .header(header::COOKIE, "lang=en")
        .body(Body::empty())
        .unwrap();
    let page = body_json(send(&state, en).await).await;
    assert_eq!(page["title"], "Title");
    assert_eq!(page["html_content"], "<h1>English</h1>\n");
    assert_eq!(page["site"]["current_lang"], "en");

    let page = body_json(send(&state, get(&format!("/post/{id}"))).await).await;
    assert_eq!(page["title"], "标题");
    assert_eq!(page["html_content"], "<h1>中文</h1>\n");
}

#[tokio::test]
async fn english_preference_falls_back_when_untranslated() {
    let state = test_state(FakeLlm::ok()).await;
    let id = insert_post(&state.db, "标题", "中文正文").await;

    let en = Request::builder()
        .uri(format!("/post/{id}"))
        .header(header::COOKIE, "lang=en")
        .body(Body::empty())
        .unwrap();
    let page = body_json(send(&state, en).await).await;

    assert_eq!(page["title"], "标题");
    assert_eq!(page["html_content"], "<p>中文正文</p>\n");
}

#[tokio::test]
async fn create_requires_login() {
    let state = test_state(FakeLlm::ok()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/create")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("title=Hello&content=World"))
        .unwrap();

    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn create_persists_redirects_and_enriches_in_background() {
    let llm = FakeLlm::ok();
    let state = test_state(llm.clone()).await;

    let response = send(
        &state,
        admin_form(&state, "/create", "title=Hello&content=World&new_category=Life&created_at=bad"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let (id, category): (i64, Option<i64>) =
        sqlx::query_as("SELECT id, category_id FROM posts WHERE title = 'Hello'")
            .fetch_one(&state.db)
            .await
            .unwrap();
    let category_name: String = sqlx::query_scalar("SELECT name FROM categories WHERE id = ?")
        .bind(category)
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(category_name, "Life");

    let db = state.db.clone();
    wait_until(|| {
        let db = db.clone();
        async move { derived(&db, id).await.summary_en.is_some() }
    })
    .await;
    assert_eq!(derived(&state.db, id).await.title_en.as_deref(), Some("EN(Hello)"));
}

#[tokio::test]
async fn edit_clears_only_translations_of_changed_originals() {
    let llm = FakeLlm::ok();
    let state = test_state(llm.clone()).await;
    let id = insert_post(&state.db, "Same", "Old body").await;
    sqlx::query(
        "UPDATE posts SET title_en = 'Kept', content_en = 'Old', summary_zh = '旧', summary_en = 'old' WHERE id = ?",
    )
    .bind(id)
    .execute(&state.db)
    .await
    .unwrap();

    let response = send(
        &state,
        admin_form(&state, &format!("/edit/{id}"), "title=Same&content=New+body"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), format!("/post/{id}"));

    let db = state.db.clone();
    wait_until(|| {
        let db = db.clone();
        async move { derived(&db, id).await.summary_en.as_deref() == Some("SUMMARY(New body)") }
    })
    .await;
    let d = derived(&state.db, id).await;
    assert_eq!(d.title_en.as_deref(), Some("Kept"));
    assert_eq!(d.content_en.as_deref(), Some("EN(New body)"));
    assert_eq!(d.summary_zh.as_deref(), Some("摘要(New body)"));
}

#[tokio::test]
async fn edit_and_delete_unknown_post_are_not_found() {
    let state = test_state(FakeLlm::ok()).await;

    let edit = send(&state, admin_form(&state, "/edit/77", "title=a&content=b")).await;
    let delete = send(&state, admin_form(&state, "/delete/77", "")).await;

    assert_eq!(edit.status(), StatusCode::NOT_FOUND);
    assert_eq!(delete.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn index_filters_by_category() {
    let state = test_state(FakeLlm::ok()).await;
    let a = insert_post(&state.db, "A", "a").await;
    insert_post(&state.db, "B", "b").await;
    sqlx::query("UPDATE posts SET category_id = 1 WHERE id = ?")
        .bind(a)
        .execute(&state.db)
        .await
        .unwrap();

    let page = body_json(send(&state, get("/?category=1")).await).await;

    assert_eq!(page["active_category"]["name"], "Tech");
    assert_eq!(page["posts"].as_array().unwrap().len(), 1);
    assert_eq!(page["posts"][0]["title"], "A");

    let page = body_json(send(&state, get("/?category=oops")).await).await;
    assert_eq!(page["posts"].as_array().unwrap().len(), 2);
}

// ---- 访客偏好与站点上下文 ----

#[tokio::test]
async fn set_lang_stores_cookie_and_returns_to_referer() {
    let state = test_state(FakeLlm::ok()).await;
    let request = Request::builder()
        .uri("/set_lang/en")
        .header(header::REFERER, "/post/1")
        .body(Body::empty())
        .unwrap();

    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/post/1");
    assert!(set_cookie(&response).contains("lang=en"));

    let response = send(&state, get("/set_lang/fr")).await;
    assert_eq!(location(&response), "/");
    assert!(set_cookie(&response).is_empty());
}

#[tokio::test]
async fn toggle_theme_flips_from_site_default() {
    let state = test_state(FakeLlm::ok()).await;

    let response = send(&state, get("/toggle-theme")).await;
    assert!(set_cookie(&response).contains("theme=simple_white"));

    let request = Request::builder()
        .uri("/toggle-theme")
        .header(header::COOKIE, "theme=simple_white")
        .body(Body::empty())
        .unwrap();
    let response = send(&state, request).await;
    assert!(set_cookie(&response).contains("theme=code_black"));
}

#[tokio::test]
async fn site_context_carries_parsed_notifications() {
    let state = test_state(FakeLlm::ok()).await;
    sqlx::query("UPDATE site_settings SET notification_content = '<notice>A</notice><notice>**B**</notice>'")
        .execute(&state.db)
        .await
        .unwrap();
    state.settings.reload().await.unwrap();

    let page = body_json(send(&state, get("/api/site")).await).await;

    assert_eq!(page["site"]["notifications"], json!(["<p>A</p>\n", "<p><strong>B</strong></p>\n"]));
    assert_eq!(page["site"]["theme"], "code_black");
    assert_eq!(page["site"]["categories"][0]["name"], "Tech");
}

// ---- 登录 ----

fn login_request(phone: &str, code: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/login")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(format!("phone={phone}&code={code}")))
        .unwrap()
}

#[tokio::test]
async fn login_with_valid_code_sets_token_and_consumes_code() {
    let state = test_state(FakeLlm::ok()).await;
    otp_service::store_code(&state.db, ADMIN_PHONE, "123456", Utc::now().timestamp())
        .await
        .unwrap();

    let response = send(&state, login_request(ADMIN_PHONE, "123456")).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(set_cookie(&response).contains("token="));

    // 验证码只能使用一次
    let again = send(&state, login_request(ADMIN_PHONE, "123456")).await;
    assert_eq!(again.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn login_rejects_wrong_or_expired_codes() {
    let state = test_state(FakeLlm::ok()).await;
    let now = Utc::now().timestamp();
    otp_service::store_code(&state.db, ADMIN_PHONE, "123456", now).await.unwrap();

    let wrong = send(&state, login_request(ADMIN_PHONE, "000000")).await;
    assert_eq!(wrong.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(wrong).await["success"], false);

    otp_service::store_code(&state.db, ADMIN_PHONE, "123456", now - otp_service::OTP_TTL_SECS - 1)
        .await
        .unwrap();
    let expired = send(&state, login_request(ADMIN_PHONE, "123456")).await;
    assert_eq!(expired.status(), StatusCode::UNAUTHORIZED);

    let left: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM otps")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(left, 0);
}

#[tokio::test]
async fn send_code_refuses_unknown_phone() {
    let state = test_state(FakeLlm::ok()).await;
    let request = Request::builder()
        .method("POST")
        .uri("/send-code")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(json!({ "phone": "10086" }).to_string()))
        .unwrap();

    let body = body_json(send(&state, request).await).await;

    assert_eq!(body["success"], false);
    let stored: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM otps")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(stored, 0);
}

fn raw_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .unwrap()
}

#[tokio::test]
async fn login_form_missing_fields_gets_a_readable_message() {
    let state = test_state(FakeLlm::ok()).await;

    let no_code = send(&state, raw_form("/login", &format!("phone={ADMIN_PHONE}"))).await;
    assert_eq!(no_code.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(no_code).await;
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "验证码错误");

    let empty = send(&state, raw_form("/login", "")).await;
    assert_eq!(empty.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(empty).await["success"], false);
}

#[tokio::test]
async fn logout_clears_token_cookie() {
    let state = test_state(FakeLlm::ok()).await;
    let token = issue_token(&state.config.secret_key, 1).unwrap();

    let request = Request::builder()
        .uri("/logout")
        .header(header::COOKIE, format!("token={token}"))
        .body(Body::empty())
        .unwrap();
    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    let cookie = set_cookie(&response);
    assert!(cookie.contains("token="));
    assert!(cookie.contains("Max-Age=0"));

    let anonymous = send(&state, get("/logout")).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);
}

// ---- 相册与站点设置 (multipart) ----

const BOUNDARY: &str = "----blog-test-boundary";

/// (字段名, 文件名, 内容)
fn admin_multipart(state: &AppState, uri: &str, parts: &[(&str, Option<&str>, &[u8])]) -> Request<Body> {
    let mut body: Vec<u8> = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        match filename {
            Some(filename) => body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n\
                     Content-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            ),
            None => body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
            ),
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

    let token = issue_token(&state.config.secret_key, 1).unwrap();
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn photo_upload_saves_file_and_translates_title() {
    let llm = FakeLlm::ok();
    let state = test_state(llm.clone()).await;

    let request = admin_multipart(
        &state,
        "/gallery/upload",
        &[
            ("photo", Some("sunset.JPG"), "fake-jpeg".as_bytes()),
            ("title", None, "日落".as_bytes()),
            ("description", None, "   ".as_bytes()),
        ],
    );
    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/gallery");

    let (id, filename, description): (i64, String, Option<String>) =
        sqlx::query_as("SELECT id, filename, description FROM photos")
            .fetch_one(&state.db)
            .await
            .unwrap();
    assert!(filename.ends_with(".JPG"));
    assert_eq!(filename.len(), 32 + 4);
    assert_eq!(description, None);
    let saved = tokio::fs::read(state.config.upload_dir.join("photos").join(&filename))
        .await
        .unwrap();
    assert_eq!(saved, b"fake-jpeg");

    let db = state.db.clone();
    wait_until(|| {
        let db = db.clone();
        async move {
            let title_en: Option<String> = sqlx::query_scalar("SELECT title_en FROM photos WHERE id = ?")
                .bind(id)
                .fetch_one(&db)
                .await
                .unwrap();
            title_en.as_deref() == Some("EN(日落)")
        }
    })
    .await;

    let page = body_json(send(&state, get("/gallery")).await).await;
    assert_eq!(page["photos"][0]["url"], format!("/uploads/photos/{filename}"));
}

#[tokio::test]
async fn upload_without_file_creates_nothing() {
    let state = test_state(FakeLlm::ok()).await;

    let request = admin_multipart(&state, "/gallery/upload", &[("title", None, "no file".as_bytes())]);
    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM photos")
        .fetch_one(&state.db)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn photo_delete_removes_row_or_reports_missing() {
    let state = test_state(FakeLlm::ok()).await;
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO photos (filename, created_at) VALUES ('gone.jpg', ?) RETURNING id",
    )
    .bind(Utc::now())
    .fetch_one(&state.db)
    .await
    .unwrap();

    // 文件本身不存在也照常删除记录
    let response = send(&state, admin_form(&state, &format!("/gallery/delete/{id}"), "")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/gallery");

    let missing = send(&state, admin_form(&state, &format!("/gallery/delete/{id}"), "")).await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn settings_update_keeps_key_clears_about_translation_and_saves_logo() {
    let llm = FakeLlm::ok();
    let state = test_state(llm.clone()).await;
    sqlx::query(
        "UPDATE site_settings SET deepseek_api_key = 'site-key', about_content = '旧的关于', about_content_en = 'Old about'",
    )
    .execute(&state.db)
    .await
    .unwrap();
    state.settings.reload().await.unwrap();

    let request = admin_multipart(
        &state,
        "/settings",
        &[
            ("blog_name", None, "New Name".as_bytes()),
            ("about_content", None, "新的关于".as_bytes()),
            ("deepseek_api_key", None, "".as_bytes()),
            ("social_icon[]", None, "github".as_bytes()),
            ("social_url[]", None, "https://github.com/x".as_bytes()),
            ("logo", Some("../My Logo.png"), "png-bytes".as_bytes()),
        ],
    );
    let response = send(&state, request).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/settings");

    // 响应返回前缓存已刷新
    let current = state.settings.current().await;
    assert_eq!(current.blog_name, "New Name");
    assert_eq!(current.api_key_override(), Some("site-key"));
    assert_eq!(current.logo_filename.as_deref(), Some("My_Logo.png"));
    assert_eq!(current.social_links().len(), 1);
    let logo = tokio::fs::read(state.config.upload_dir.join("logo").join("My_Logo.png"))
        .await
        .unwrap();
    assert_eq!(logo, b"png-bytes");

    let settings = state.settings.clone();
    wait_until(|| {
        let settings = settings.clone();
        async move { settings.current().await.about_content_en.as_deref() == Some("EN(新的关于)") }
    })
    .await;
    assert_eq!(llm.calls()[0].api_key, "site-key");

    let view = body_json(send(&state, {
        let token = issue_token(&state.config.secret_key, 1).unwrap();
        Request::builder()
            .uri("/settings")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    })
    .await)
    .await;
    assert_eq!(view["has_api_key"], true);
    assert!(view.get("deepseek_api_key").is_none());
}

#[tokio::test]
async fn about_page_falls_back_to_original_in_english() {
    let state = test_state(FakeLlm::ok()).await;
    sqlx::query("UPDATE site_settings SET about_content = '关于我'")
        .execute(&state.db)
        .await
        .unwrap();
    state.settings.reload().await.unwrap();

    let en = || {
        Request::builder()
            .uri("/about")
            .header(header::COOKIE, "lang=en")
            .body(Body::empty())
            .unwrap()
    };
    let page = body_json(send(&state, en()).await).await;
    assert_eq!(page["content"], "<p>关于我</p>\n");

    sqlx::query("UPDATE site_settings SET about_content_en = 'About me'")
        .execute(&state.db)
        .await
        .unwrap();
    state.settings.reload().await.unwrap();

    let page = body_json(send(&state, en()).await).await;
    assert_eq!(page["content"], "<p>About me</p>\n");
    let page = body_json(send(&state, get("/about")).await).await;
    assert_eq!(page["content"], "<p>关于我</p>\n");
}
