use anyhow::Context;
use dotenvy::dotenv;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blog_backend::config::Config;
use blog_backend::services::llm_client::DeepSeekClient;
use blog_backend::{build_router, db, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. 初始化日志系统
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. 加载 .env 环境变量
    dotenv().ok();
    let config = Config::from_env();

    // 3. 初始化数据库连接池并建表
    let pool = db::connect(&config.database_url)
        .await
        .context("Failed to create database connection pool")?;
    db::init_db(&pool)
        .await
        .context("Failed to initialize database schema")?;

    // 4. AI 客户端与全局状态 (含后台加工 worker)
    let llm = Arc::new(DeepSeekClient::new(
        config.deepseek_base_url.clone(),
        config.deepseek_model.clone(),
    )?);
    let addr = config.bind_addr.clone();
    let shared_state = Arc::new(AppState::new(pool, config, llm).await?);

    // 5. 构建路由
    let app = build_router(shared_state);

    // 6. 启动服务
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("🚀 Server started at http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
