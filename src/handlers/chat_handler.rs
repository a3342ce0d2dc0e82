use axum::{
    body::Body,
    extract::State,
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;

use crate::error::{AppError, AppResult};
use crate::services::chat_service::{build_blog_context, build_messages, system_prompt};
use crate::services::llm_client::ChatMessage;
use crate::AppState;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<ChatMessage>,
}

/// AI 助手：以博客内容为背景，流式返回纯文本回复
pub async fn chat(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ChatRequest>,
) -> AppResult<Response> {
    let Some(message) = payload.message.filter(|m| !m.trim().is_empty()) else {
        return Err(AppError::BadRequest("Message is required".to_string()));
    };
    tracing::info!(">>> AI 助手收到提问, 历史消息 {} 条", payload.history.len());

    let settings = state.settings.current().await;
    let context = build_blog_context(&state.db, &settings, &state.config.public_url).await?;
    let messages = build_messages(system_prompt(&context), &payload.history, &message);

    let body = async_stream::stream! {
        match state.ai.chat_stream(&messages).await {
            Ok(mut tokens) => {
                while let Some(token) = tokens.next().await {
                    match token {
                        Ok(text) => yield Ok::<String, Infallible>(text),
                        Err(e) => {
                            tracing::error!("!!! AI 助手流式输出中断: {}", e);
                            yield Ok::<String, Infallible>(format!("Error: {e}"));
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                tracing::error!("!!! AI 助手调用失败: {}", e);
                yield Ok::<String, Infallible>(format!("Error: {e}"));
            }
        }
    };

    Ok((
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        Body::from_stream(body),
    )
        .into_response())
}
