use sqlx::SqlitePool;

use crate::models::post::Post;
use crate::models::site_setting::SiteSetting;
use crate::services::llm_client::ChatMessage;

/// 上下文中最多带入的文章数
pub const CONTEXT_POSTS: i64 = 10;
/// 保留的历史消息条数
pub const HISTORY_LIMIT: usize = 6;
const EXCERPT_CHARS: usize = 200;

/// 汇总博客名称、关于页面与最近文章，作为助手的背景知识
pub async fn build_blog_context(
    db: &SqlitePool,
    settings: &SiteSetting,
    public_url: &str,
) -> Result<String, sqlx::Error> {
    let posts = sqlx::query_as::<_, Post>("SELECT * FROM posts ORDER BY created_at DESC LIMIT ?")
        .bind(CONTEXT_POSTS)
        .fetch_all(db)
        .await?;

    Ok(format_context(settings, &posts, public_url))
}

fn format_context(settings: &SiteSetting, posts: &[Post], public_url: &str) -> String {
    let mut parts = vec![
        format!("Blog Name: {}", settings.blog_name),
        format!("About Content: {}", settings.about_content.as_deref().unwrap_or("")),
    ];

    if !posts.is_empty() {
        parts.push("\nRecent Articles:".to_string());
        for post in posts {
            parts.push(format!(
                "- Title: {}\n  URL: {}/post/{}\n  Summary: {}",
                post.title,
                public_url,
                post.id,
                post_summary(post)
            ));
        }
    }

    parts.join("\n\n")
}

/// 优先使用 AI 摘要，否则截取正文开头
fn post_summary(post: &Post) -> String {
    match post.summary_zh.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(summary) => summary.to_string(),
        None => {
            let excerpt: String = post.content.chars().take(EXCERPT_CHARS).collect();
            format!("{excerpt}...")
        }
    }
}

pub fn system_prompt(blog_context: &str) -> String {
    format!(
        "You are a helpful AI assistant for this blog.
Your goal is to assist visitors by answering questions based on the blog's content.

Here is the context of the blog:
{blog_context}

IMPORTANT INSTRUCTIONS:
1. If the user asks about specific articles, refer to them by title AND provide the URL.
2. Format links in Markdown like this: [Article Title](URL).
3. If the answer is not in the context, answer to the best of your general knowledge but mention that it's not explicitly in the blog.
4. Be polite, concise, and helpful.
"
    )
}

/// 系统提示 + 最近 6 条历史 + 本次提问
pub fn build_messages(system: String, history: &[ChatMessage], message: &str) -> Vec<ChatMessage> {
    let start = history.len().saturating_sub(HISTORY_LIMIT);
    let mut messages = Vec::with_capacity(HISTORY_LIMIT + 2);
    messages.push(ChatMessage::system(system));
    messages.extend(history[start..].iter().cloned());
    messages.push(ChatMessage::user(message));
    messages
}
