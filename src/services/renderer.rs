use pulldown_cmark::{html, CodeBlockKind, Event, Options, Parser, Tag};
use serde::{Deserialize, Serialize};

/// 访客的语言偏好
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lang {
    #[default]
    Zh,
    En,
}

impl Lang {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "zh" => Some(Lang::Zh),
            "en" => Some(Lang::En),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lang::Zh => "zh",
            Lang::En => "en",
        }
    }
}

/// 按语言挑选字段：英文模式下优先使用非空的英文版本，否则回退原文
pub fn localized<'a>(lang: Lang, original: &'a str, english: Option<&'a str>) -> &'a str {
    match (lang, english) {
        (Lang::En, Some(en)) if !en.trim().is_empty() => en,
        _ => original,
    }
}

/// 同 [`localized`]，原文本身也可能为空
pub fn localized_opt<'a>(
    lang: Lang,
    original: Option<&'a str>,
    english: Option<&'a str>,
) -> Option<&'a str> {
    match (lang, english) {
        (Lang::En, Some(en)) if !en.trim().is_empty() => Some(en),
        _ => original,
    }
}

/// Markdown 转 HTML；围栏代码块输出带 codehilite 包装与 language-xxx 类名，供前端高亮
pub fn render_markdown(markdown: &str) -> String {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);

    let events = Parser::new_ext(markdown, options).map(|event| match event {
        Event::Start(Tag::CodeBlock(kind)) => {
            let lang = match kind {
                CodeBlockKind::Fenced(info) => code_language(&info),
                CodeBlockKind::Indented => String::new(),
            };
            let open = if lang.is_empty() {
                "<div class=\"codehilite\"><pre><code>".to_string()
            } else {
                format!("<div class=\"codehilite\"><pre><code class=\"language-{lang}\">")
            };
            Event::Html(open.into())
        }
        Event::End(Tag::CodeBlock(_)) => Event::Html("</code></pre></div>\n".into()),
        other => other,
    });

    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, events);
    out
}

/// 取 info string 的第一个词，只保留安全字符
fn code_language(info: &str) -> String {
    info.split_whitespace()
        .next()
        .unwrap_or("")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+' | '#'))
        .collect()
}
