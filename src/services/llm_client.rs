//! DeepSeek 对话补全客户端 (OpenAI 兼容协议)
//!
//! 业务代码只依赖 [`ChatCompletion`] trait，测试中用假实现替换网络调用。

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

const USER_AGENT: &str = "blog-backend/0.1";
const REQUEST_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("未配置 API Key")]
    MissingApiKey,

    #[error("网络错误: {0}")]
    Network(String),

    #[error("接口返回 {status}: {body}")]
    Api { status: u16, body: String },

    #[error("响应解析失败: {0}")]
    Parse(String),

    #[error("响应中没有内容")]
    EmptyResponse,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user".to_string(), content: content.into() }
    }
}

/// 逐段返回的模型输出
pub type TokenStream = BoxStream<'static, Result<String, LlmError>>;

#[async_trait]
pub trait ChatCompletion: Send + Sync {
    /// 一次性返回完整回复
    async fn complete(&self, api_key: &str, messages: &[ChatMessage]) -> Result<String, LlmError>;

    /// 流式返回回复片段
    async fn stream(&self, api_key: &str, messages: &[ChatMessage]) -> Result<TokenStream, LlmError>;
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[derive(Debug, PartialEq, Eq)]
enum SseEvent {
    Token(String),
    Done,
}

/// 解析一行 SSE 数据；非 data 行、空片段返回 None
fn parse_sse_line(line: &str) -> Result<Option<SseEvent>, LlmError> {
    let Some(payload) = line.trim().strip_prefix("data:") else {
        return Ok(None);
    };
    let payload = payload.trim();
    if payload == "[DONE]" {
        return Ok(Some(SseEvent::Done));
    }

    let chunk: StreamChunk =
        serde_json::from_str(payload).map_err(|e| LlmError::Parse(e.to_string()))?;
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|t| !t.is_empty())
        .map(SseEvent::Token))
}

pub struct DeepSeekClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl DeepSeekClient {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| LlmError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            model: model.into(),
        })
    }

    async fn send(
        &self,
        api_key: &str,
        messages: &[ChatMessage],
        stream: bool,
    ) -> Result<reqwest::Response, LlmError> {
        if api_key.trim().is_empty() {
            return Err(LlmError::MissingApiKey);
        }

        let body = CompletionRequest { model: &self.model, messages, stream };
        let mut request = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body);
        if !stream {
            request = request.timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS));
        }

        let response = request
            .send()
            .await
            .map_err(|e| LlmError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api { status: status.as_u16(), body });
        }
        Ok(response)
    }
}

#[async_trait]
impl ChatCompletion for DeepSeekClient {
    async fn complete(&self, api_key: &str, messages: &[ChatMessage]) -> Result<String, LlmError> {
        tracing::debug!(model = %self.model, messages = messages.len(), "调用对话补全接口");

        let response: CompletionResponse = self
            .send(api_key, messages, false)
            .await?
            .json()
            .await
            .map_err(|e| LlmError::Parse(e.to_string()))?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse)
    }

    async fn stream(&self, api_key: &str, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        tracing::debug!(model = %self.model, messages = messages.len(), "调用流式对话接口");

        let mut bytes = self.send(api_key, messages, true).await?.bytes_stream();

        let stream = async_stream::try_stream! {
            // 按字节缓存，避免多字节字符被网络分片截断
            let mut buffer: Vec<u8> = Vec::new();
            'read: while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::Network(e.to_string()))?;
                buffer.extend_from_slice(&chunk);

                while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                    let line: Vec<u8> = buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&line);
                    match parse_sse_line(&line)? {
                        Some(SseEvent::Token(token)) => yield token,
                        Some(SseEvent::Done) => break 'read,
                        None => {}
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}
