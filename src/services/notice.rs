use once_cell::sync::Lazy;
use regex::Regex;

use crate::services::renderer::render_markdown;

// 非贪婪匹配，允许跨行
static NOTICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<notice>(.*?)</notice>").expect("notice 正则无效"));

/// 解析全站通知：每个 <notice> 片段单独渲染；没有标签时整段作为一条通知
pub fn parse_notifications(raw: &str) -> Vec<String> {
    let fragments: Vec<&str> = NOTICE_RE
        .captures_iter(raw)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str().trim())
        .collect();

    if !fragments.is_empty() {
        return fragments.into_iter().map(render_markdown).collect();
    }

    let whole = raw.trim();
    if whole.is_empty() {
        Vec::new()
    } else {
        vec![render_markdown(whole)]
    }
}
