use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

// 声明子模块
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod models;
pub mod services;

use config::Config;
use services::ai_service::AiService;
use services::enrichment::{Enricher, EnrichmentQueue};
use services::llm_client::ChatCompletion;
use services::settings_store::SettingsStore;
use services::sms_client::SmsClient;

// 上传大小上限 16MB
const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

// 全局状态，Handler 通过 State<Arc<AppState>> 获取
pub struct AppState {
    pub db: SqlitePool,
    pub config: Config,
    pub settings: SettingsStore,
    pub ai: Arc<AiService>,
    pub enrichment: EnrichmentQueue,
    pub sms: SmsClient,
}

impl AppState {
    /// 加载站点设置并启动后台 AI 加工 worker，需在 tokio 运行时内调用
    pub async fn new(
        db: SqlitePool,
        config: Config,
        llm: Arc<dyn ChatCompletion>,
    ) -> anyhow::Result<Self> {
        let settings = SettingsStore::load(db.clone()).await?;
        let ai = Arc::new(AiService::new(
            llm,
            settings.clone(),
            config.deepseek_api_key.clone(),
        ));
        let enricher = Arc::new(Enricher::new(db.clone(), ai.clone(), settings.clone()));
        let enrichment = EnrichmentQueue::start(enricher, config.enrich_workers);
        let sms = SmsClient::new(config.sms_template_code.clone())?;

        Ok(Self { db, config, settings, ai, enrichment, sms })
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    // 跨域 (CORS) - 聊天组件可能嵌入其他页面
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let uploads = ServeDir::new(&state.config.upload_dir);

    Router::new()
        // 前台页面
        .route("/", get(handlers::post_handler::index))
        .route("/post/:id", get(handlers::post_handler::get_post))
        .route("/about", get(handlers::settings_handler::about))
        .route("/gallery", get(handlers::photo_handler::gallery))
        .route("/api/site", get(handlers::session_handler::site))

        // 文章管理
        .route("/create", post(handlers::post_handler::create_post))
        .route("/edit/:id", post(handlers::post_handler::edit_post))
        .route("/delete/:id", post(handlers::post_handler::delete_post))

        // 相册管理
        .route("/gallery/upload", post(handlers::photo_handler::upload_photo))
        .route("/gallery/delete/:id", post(handlers::photo_handler::delete_photo))

        // 站点设置
        .route("/settings", get(handlers::settings_handler::get_settings)
            .post(handlers::settings_handler::update_settings))

        // 登录
        .route("/send-code", post(handlers::auth_handler::send_code))
        .route("/login", post(handlers::auth_handler::login))
        .route("/logout", get(handlers::auth_handler::logout))

        // 访客偏好
        .route("/toggle-theme", get(handlers::session_handler::toggle_theme))
        .route("/set_lang/:lang", get(handlers::session_handler::set_lang))

        // AI 助手
        .route("/api/chat", post(handlers::chat_handler::chat))

        .nest_service("/uploads", uploads)

        // 中间件：日志记录、跨域、上传大小
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
