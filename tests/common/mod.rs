#![allow(dead_code)]

use async_trait::async_trait;
use blog_backend::config::Config;
use blog_backend::services::llm_client::{ChatCompletion, ChatMessage, LlmError, TokenStream};
use blog_backend::{db, AppState};
use chrono::Utc;
use futures::stream;
use sqlx::SqlitePool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ADMIN_PHONE: &str = "13800000000";

/// 一次模型调用的记录
#[derive(Debug, Clone)]
pub struct Call {
    pub api_key: String,
    pub messages: Vec<ChatMessage>,
}

/// 按提示词返回固定结果的假模型
#[derive(Default)]
pub struct FakeLlm {
    pub calls: Mutex<Vec<Call>>,
    pub fail: bool,
    pub tokens: Vec<String>,
    pub fail_mid_stream: bool,
}

impl FakeLlm {
    pub fn ok() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self { fail: true, ..Default::default() })
    }

    pub fn streaming(tokens: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            tokens: tokens.iter().map(|t| t.to_string()).collect(),
            ..Default::default()
        })
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, api_key: &str, messages: &[ChatMessage]) {
        self.calls.lock().unwrap().push(Call {
            api_key: api_key.to_string(),
            messages: messages.to_vec(),
        });
    }
}

/// 根据系统提示词生成可辨认的输出
pub fn scripted_reply(messages: &[ChatMessage]) -> String {
    let system = &messages[0].content;
    let input = &messages[messages.len() - 1].content;
    if system.starts_with("You are a professional translator") {
        format!("EN({input})")
    } else if system.contains("中文摘要") {
        format!("摘要({input})")
    } else {
        format!("SUMMARY({input})")
    }
}

#[async_trait]
impl ChatCompletion for FakeLlm {
    async fn complete(&self, api_key: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        self.record(api_key, messages);
        if self.fail {
            return Err(LlmError::Api { status: 401, body: "invalid key".to_string() });
        }
        Ok(scripted_reply(messages))
    }

    async fn stream(&self, api_key: &str, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        self.record(api_key, messages);
        if self.fail {
            return Err(LlmError::Network("connection refused".to_string()));
        }

        let mut items: Vec<Result<String, LlmError>> = self.tokens.iter().cloned().map(Ok).collect();
        if self.fail_mid_stream {
            items.push(Err(LlmError::Network("stream reset".to_string())));
        }
        Ok(Box::pin(stream::iter(items)))
    }
}

pub async fn test_db() -> SqlitePool {
    let pool = db::connect_in_memory().await.unwrap();
    db::init_db(&pool).await.unwrap();
    pool
}

pub fn test_config() -> Config {
    Config {
        allowed_phone: ADMIN_PHONE.to_string(),
        deepseek_api_key: "default-key".to_string(),
        upload_dir: std::env::temp_dir().join(format!("blog-test-{}", uuid::Uuid::new_v4().simple())),
        enrich_workers: 1,
        ..Default::default()
    }
}

pub async fn test_state(llm: Arc<dyn ChatCompletion>) -> Arc<AppState> {
    let pool = test_db().await;
    Arc::new(AppState::new(pool, test_config(), llm).await.unwrap())
}

pub async fn insert_post(pool: &SqlitePool, title: &str, content: &str) -> i64 {
    sqlx::query_scalar(
        "INSERT INTO posts (title, content, created_at, author_id) VALUES (?, ?, ?, 1) RETURNING id",
    )
    .bind(title)
    .bind(content)
    .bind(Utc::now())
    .fetch_one(pool)
    .await
    .unwrap()
}

#[derive(Debug, sqlx::FromRow, PartialEq)]
pub struct Derived {
    pub title_en: Option<String>,
    pub content_en: Option<String>,
    pub summary_zh: Option<String>,
    pub summary_en: Option<String>,
}

pub async fn derived(pool: &SqlitePool, id: i64) -> Derived {
    sqlx::query_as("SELECT title_en, content_en, summary_zh, summary_en FROM posts WHERE id = ?")
        .bind(id)
        .fetch_one(pool)
        .await
        .unwrap()
}

/// 轮询直到条件满足，用于等待后台 worker
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not met within 2s");
}
