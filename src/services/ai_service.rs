//! 翻译与摘要：在对话补全接口之上套固定提示词
//!
//! 失败不会向上抛出，而是降级为原文 (翻译) 或空串 (摘要)，
//! 并通过 [`AiOutcome`] 告诉调用方这次结果是否真的由模型生成。

use std::sync::Arc;

use crate::services::llm_client::{ChatCompletion, ChatMessage, LlmError, TokenStream};
use crate::services::renderer::Lang;
use crate::services::settings_store::SettingsStore;

const TRANSLATE_PROMPT: &str = "You are a professional translator. Translate the following blog content from Chinese to English. Maintain all Markdown formatting, code blocks, and links exactly as they are. Do not add any conversational filler or explanations. Just output the translation.";

const SUMMARY_PROMPT_ZH: &str = "你是一个专业的文章摘要生成助手。请阅读以下文章内容，生成一个简短的中文摘要（100字以内）。摘要应精炼、吸引人。直接输出摘要内容，不要加任何前缀或解释。";

const SUMMARY_PROMPT_EN: &str = "You are a professional article summary assistant. Please read the following article content and generate a short English summary (within 100 words). The summary should be concise and engaging. Output the summary directly without any prefix or explanation.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AiOutcome {
    /// 模型生成的结果
    Generated(String),
    /// 输入为空，未发起调用
    Skipped,
    /// 调用失败，fallback 为降级后展示的文本
    Degraded { fallback: String, reason: String },
}

impl AiOutcome {
    /// 展示用文本 (降级时为原文或空串)
    pub fn text(&self) -> &str {
        match self {
            AiOutcome::Generated(text) => text,
            AiOutcome::Skipped => "",
            AiOutcome::Degraded { fallback, .. } => fallback,
        }
    }

    /// 仅当模型真正生成了非空内容时返回，用于决定是否落库
    pub fn generated(self) -> Option<String> {
        match self {
            AiOutcome::Generated(text) if !text.trim().is_empty() => Some(text),
            _ => None,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, AiOutcome::Degraded { .. })
    }
}

pub struct AiService {
    llm: Arc<dyn ChatCompletion>,
    settings: SettingsStore,
    default_api_key: String,
}

impl AiService {
    pub fn new(llm: Arc<dyn ChatCompletion>, settings: SettingsStore, default_api_key: String) -> Self {
        Self { llm, settings, default_api_key }
    }

    /// 每次调用时解析 API Key：站点设置覆盖值优先，否则使用进程默认值
    pub async fn api_key(&self) -> String {
        self.settings
            .current()
            .await
            .api_key_override()
            .map(str::to_string)
            .unwrap_or_else(|| self.default_api_key.clone())
    }

    pub async fn translate(&self, text: &str) -> AiOutcome {
        if text.is_empty() {
            return AiOutcome::Skipped;
        }

        match self.run(TRANSLATE_PROMPT, text).await {
            Ok(translated) => AiOutcome::Generated(translated),
            Err(e) => {
                tracing::warn!("--- 翻译失败，保留原文: {}", e);
                AiOutcome::Degraded {
                    fallback: text.to_string(),
                    reason: e.to_string(),
                }
            }
        }
    }

    pub async fn summarize(&self, text: &str, lang: Lang) -> AiOutcome {
        if text.is_empty() {
            return AiOutcome::Skipped;
        }

        let prompt = match lang {
            Lang::Zh => SUMMARY_PROMPT_ZH,
            Lang::En => SUMMARY_PROMPT_EN,
        };
        match self.run(prompt, text).await {
            Ok(summary) => AiOutcome::Generated(summary.trim().to_string()),
            Err(e) => {
                tracing::warn!("--- 摘要生成失败 ({}): {}", lang.as_str(), e);
                AiOutcome::Degraded {
                    fallback: String::new(),
                    reason: e.to_string(),
                }
            }
        }
    }

    /// AI 助手的流式对话
    pub async fn chat_stream(&self, messages: &[ChatMessage]) -> Result<TokenStream, LlmError> {
        let api_key = self.api_key().await;
        self.llm.stream(&api_key, messages).await
    }

    async fn run(&self, system_prompt: &str, text: &str) -> Result<String, LlmError> {
        let api_key = self.api_key().await;
        let messages = [ChatMessage::system(system_prompt), ChatMessage::user(text)];
        self.llm.complete(&api_key, &messages).await
    }
}
