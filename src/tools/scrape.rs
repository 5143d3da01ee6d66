//! simple_scrape_url：抓取单个页面并转为可读文本
//!
//! GET 请求带超时与浏览器 User-Agent；HTML 响应用 html2text 提取正文，超过 max_chars 时截断。
//! 抓取失败不返回 Err，而是返回带 tip 的 JSON 文本，提示模型改用浏览器工具。

use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use html2text::from_read;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::Client;
use serde_json::Value;

use crate::config::ScrapeSection;
use crate::tools::Tool;

pub const SIMPLE_SCRAPE_TOOL: &str = "simple_scrape_url";

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 静态页面抓取工具
pub struct SimpleScrapeTool {
    client: Client,
    max_chars: usize,
}

/// 简易去除 HTML 标签（html2text 失败时的回退）
fn strip_html_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => {
                in_tag = false;
                out.push(' ');
            }
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 判断内容是否像 HTML（需提取可读文本）
fn looks_like_html(s: &str) -> bool {
    let s = s.trim_start();
    s.starts_with("<!")
        || s.to_lowercase().starts_with("<html")
        || (s.len() > 20 && s.contains('<') && (s.contains("</") || s.contains("<head")))
}

static TITLE_RE: OnceLock<Regex> = OnceLock::new();

/// 提取 <title>，没有时返回 None
fn extract_title(html: &str) -> Option<String> {
    let re = TITLE_RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap());
    re.captures(html)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|t| !t.is_empty())
}

/// 按字符截断，超出时追加 "..."
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

fn html_to_text(html: &str) -> String {
    match from_read(html.as_bytes(), 120) {
        Ok(text) if !text.trim().is_empty() => text,
        _ => strip_html_tags(html),
    }
}

/// 抓取失败时返回给模型的 JSON 提示
fn failure_hint(url: &str, error: &str) -> String {
    serde_json::json!({
        "error": error,
        "url": url,
        "tip": "Try browser_navigate for this URL",
    })
    .to_string()
}

impl SimpleScrapeTool {
    pub fn new(timeout_secs: u64, max_chars: usize) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("es-ES,es;q=0.9,en;q=0.8"));
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .build()
            .unwrap_or_default();
        Self { client, max_chars }
    }

    pub fn from_config(cfg: &ScrapeSection) -> Self {
        Self::new(cfg.timeout_secs, cfg.max_chars)
    }

    async fn fetch(&self, url: &str) -> Result<(String, String), String> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| format!("Request failed: {}", e))?;
        if !resp.status().is_success() {
            return Err(format!("HTTP {}", resp.status()));
        }
        let body = resp.text().await.map_err(|e| format!("Read body: {}", e))?;
        let body = body.trim_start_matches('\u{FEFF}');

        if looks_like_html(body) {
            let title = extract_title(body).unwrap_or_else(|| "Untitled".to_string());
            Ok((title, html_to_text(body)))
        } else {
            Ok(("Untitled".to_string(), body.to_string()))
        }
    }

    /// 渲染成功结果：标题 + 截断后的正文 + 来源
    fn render(&self, url: &str, title: &str, text: &str) -> String {
        let truncated = truncate_chars(text, self.max_chars);
        tracing::info!(
            url = %url,
            chars = text.chars().count(),
            kept = truncated.chars().count(),
            "scrape ok"
        );
        format!("# {}\n\n{}\n\n---\nSource: {}", title, truncated, url)
    }
}

#[async_trait]
impl Tool for SimpleScrapeTool {
    fn name(&self) -> &str {
        SIMPLE_SCRAPE_TOOL
    }

    fn description(&self) -> &str {
        "Fetch a web page and return its readable text. Works for static sites. If it fails or the page needs JavaScript, use browser_navigate. Args: {\"url\": \"https://...\"}."
    }

    fn parameters_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "url": {"type": "string", "description": "Full URL to fetch"}
            },
            "required": ["url"]
        })
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let url = args
            .get("url")
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .trim();
        if url.is_empty() {
            return Err("Missing url".to_string());
        }
        let short: String = url.chars().take(60).collect();
        tracing::info!(url = %short, "scrape_url");

        match self.fetch(url).await {
            Ok((title, text)) => Ok(self.render(url, &title, &text)),
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "scrape failed");
                Ok(failure_hint(url, &e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("hello", 10), "hello");
        assert_eq!(truncate_chars("hello world", 5), "hello...");
        assert_eq!(truncate_chars("ñandú", 2), "ña...");
    }

    #[test]
    fn test_extract_title() {
        let html = "<html><head><title>\n Precios  luz </title></head><body>x</body></html>";
        assert_eq!(extract_title(html).as_deref(), Some("Precios luz"));
        assert_eq!(extract_title("<html><body></body></html>"), None);
    }

    #[test]
    fn test_html_detection_and_strip() {
        assert!(looks_like_html("<!DOCTYPE html><html></html>"));
        assert!(!looks_like_html("plain text body"));
        assert_eq!(strip_html_tags("<p>a</p><p>b</p>"), "a b");
    }

    #[test]
    fn test_render_truncates_and_cites_source() {
        let tool = SimpleScrapeTool::new(5, 4);
        let out = tool.render("https://example.com/p", "T", "abcdefgh");
        assert!(out.starts_with("# T\n\nabcd..."));
        assert!(out.ends_with("Source: https://example.com/p"));
    }

    #[tokio::test]
    async fn test_missing_url_is_error() {
        let tool = SimpleScrapeTool::new(5, 100);
        assert!(tool.execute(serde_json::json!({})).await.is_err());
    }

    #[tokio::test]
    async fn test_unreachable_url_returns_hint() {
        let tool = SimpleScrapeTool::new(2, 100);
        let out = tool
            .execute(serde_json::json!({"url": "http://127.0.0.1:1/page"}))
            .await
            .unwrap();
        let hint: Value = serde_json::from_str(&out).unwrap();
        assert_eq!(hint["url"], "http://127.0.0.1:1/page");
        assert!(hint["tip"].as_str().unwrap().contains("browser_navigate"));
    }
}
