//! 文章内容清洗
//!
//! 发布前把 Markdown/HTML 混排的正文整理成平台编辑器可用的形式：
//! 去掉与标题重复的首行、抽取配图、剥离标记符号、生成段落 HTML。

use std::sync::OnceLock;

use regex::Regex;

/// 清洗结果
#[derive(Debug, Clone)]
pub struct CleanedArticle {
    /// 纯文本正文（知乎等逐段输入的平台使用）
    pub text: String,
    /// 段落化 HTML（富文本编辑器直接注入）
    pub html: String,
    /// 从正文抽出的图片地址（按出现顺序）
    pub images: Vec<String>,
}

fn image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"!\[[^\]]*\]\(([^)]+)\)").unwrap())
}

fn link_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[([^\]]*)\]\([^)]+\)").unwrap())
}

fn heading_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap())
}

fn emphasis_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\*{1,2}([^*]*)\*{1,2}").unwrap())
}

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"```[a-zA-Z]*\n?").unwrap())
}

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

/// 抽取正文中的 Markdown 图片地址
pub fn extract_images(content: &str) -> Vec<String> {
    image_re()
        .captures_iter(content)
        .map(|cap| cap[1].trim().to_string())
        .filter(|url| !url.is_empty())
        .collect()
}

/// 剥离 Markdown 与 HTML 标记，得到纯文本
fn strip_markup(content: &str) -> String {
    let text = image_re().replace_all(content, "");
    let text = link_re().replace_all(&text, "$1");
    let text = code_fence_re().replace_all(&text, "");
    let text = heading_re().replace_all(&text, "");
    let text = emphasis_re().replace_all(&text, "$1");
    let text = html_tag_re().replace_all(&text, "");
    text.replace('`', "")
}

/// 去掉正文开头与标题重复的行（含 `# 标题` 形式）
fn strip_leading_title(title: &str, content: &str) -> String {
    let title = title.trim();
    let mut lines = content.lines().peekable();
    while let Some(line) = lines.peek() {
        let stripped = heading_re().replace(line, "");
        let stripped = stripped.trim();
        if stripped.is_empty() || stripped == title {
            lines.next();
        } else {
            break;
        }
    }
    lines.collect::<Vec<_>>().join("\n")
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// 将纯文本按空行切段，生成 `<p>` 包裹的 HTML
fn to_paragraph_html(text: &str) -> String {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| format!("<p>{}</p>", escape_html(p).replace('\n', "<br>")))
        .collect::<Vec<_>>()
        .join("")
}

/// 清洗文章正文
pub fn clean_article(title: &str, content: &str) -> CleanedArticle {
    let images = extract_images(content);
    let body = strip_leading_title(title, content);
    let text = strip_markup(&body).trim().to_string();
    let html = to_paragraph_html(&text);
    CleanedArticle { text, html, images }
}
