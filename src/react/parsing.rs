//! 模型自由文本输出的确定性解析（不调用模型，从不失败）
//!
//! 字段缺失即表示「未知」，序列化时整个键被省略，不会写成空值或 false。

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::core::recovery::url_regex;

/// 最多保留的 URL 数
pub const MAX_URLS: usize = 10;
/// 短于等于此长度的 URL 视为噪声
const MIN_URL_LEN: usize = 10;
const BROWSER_MARKERS: &[&str] = &["browser_navigate", "browser_snapshot", "playwright"];

/// 从输出中解析出的字段
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParsedOutput {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_es: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query_final: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_playwright: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub urls_playwright_success: Option<Vec<String>>,
}

impl ParsedOutput {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().map(|p| Regex::new(p).unwrap()).collect()
}

static SOURCE_QUERY_RES: OnceLock<Vec<Regex>> = OnceLock::new();
static FINAL_QUERY_RES: OnceLock<Vec<Regex>> = OnceLock::new();

/// 按顺序尝试：显式标签、双引号、单引号、行尾
fn source_query_patterns() -> &'static [Regex] {
    SOURCE_QUERY_RES.get_or_init(|| {
        compile(&[
            r"(?i)QUERY_ES(?:PAÑOL)?:\s*(.+?)(?:\n|$)",
            r#"(?i)query.*(?:español|source language).*[:\s]+"([^"]+)""#,
            r"(?i)query.*(?:español|source language).*[:\s]+'([^']+)'",
            r"(?i)query.*(?:español|source language).*[:\s]+(.+?)(?:\n|$)",
        ])
    })
}

fn final_query_patterns() -> &'static [Regex] {
    FINAL_QUERY_RES.get_or_init(|| {
        compile(&[
            r"(?i)QUERY_FINAL:\s*(.+?)(?:\n|$)",
            r#"(?i)query.*final.*[:\s]+"([^"]+)""#,
            r"(?i)query.*final.*[:\s]+'([^']+)'",
            r"(?i)query.*final.*[:\s]+(.+?)(?:\n|$)",
        ])
    })
}

fn first_capture(patterns: &[Regex], text: &str) -> Option<String> {
    patterns.iter().find_map(|re| {
        re.captures(text).and_then(|c| c.get(1)).map(|m| {
            m.as_str()
                .trim()
                .trim_matches(|ch| ch == '"' || ch == '\'')
                .to_string()
        })
    })
}

/// 提取 URL：去掉结尾 `.,;:`，去重，长度需大于 10，最多 10 个
pub fn extract_urls(text: &str) -> Vec<String> {
    let mut urls: Vec<String> = Vec::new();
    for m in url_regex().find_iter(text) {
        let url = m.as_str().trim_end_matches(['.', ',', ';', ':']);
        if url.len() > MIN_URL_LEN && !urls.iter().any(|u| u == url) {
            urls.push(url.to_string());
        }
    }
    urls.truncate(MAX_URLS);
    urls
}

pub fn parse_agent_output(output: &str) -> ParsedOutput {
    let mut parsed = ParsedOutput {
        query_es: first_capture(source_query_patterns(), output),
        query_final: first_capture(final_query_patterns(), output),
        ..Default::default()
    };
    if parsed.query_final.is_none() {
        parsed.query_final = parsed.query_es.clone();
    }

    let urls = extract_urls(output);
    let lower = output.to_lowercase();
    if BROWSER_MARKERS.iter().any(|m| lower.contains(m)) {
        parsed.used_playwright = Some(true);
        parsed.urls_playwright_success = Some(urls.clone());
    }
    if !urls.is_empty() {
        parsed.urls = Some(urls);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_and_irrelevant_input() {
        assert!(parse_agent_output("").is_empty());
        assert!(parse_agent_output("nothing to see here").is_empty());
        assert_eq!(serde_json::to_value(parse_agent_output("")).unwrap(), serde_json::json!({}));
    }

    #[test]
    fn test_labelled_queries() {
        let out = "QUERY_ES: precio luz Iberdrola\nQUERY_FINAL: electricity price Iberdrola\nbody";
        let p = parse_agent_output(out);
        assert_eq!(p.query_es.as_deref(), Some("precio luz Iberdrola"));
        assert_eq!(p.query_final.as_deref(), Some("electricity price Iberdrola"));
    }

    #[test]
    fn test_final_query_falls_back_to_source_query() {
        let p = parse_agent_output("Query in source language: \"tarifa luz 2026\"");
        assert_eq!(p.query_es.as_deref(), Some("tarifa luz 2026"));
        assert_eq!(p.query_final, p.query_es);
    }

    #[test]
    fn test_urls_deduplicated_and_stripped() {
        let out = "See https://www.iberdrola.es/tarifas. Also https://www.iberdrola.es/tarifas, \
                   and http://a.b plus (https://cnmc.es/precios);";
        let p = parse_agent_output(out);
        assert_eq!(
            p.urls.unwrap(),
            vec!["https://www.iberdrola.es/tarifas", "https://cnmc.es/precios"]
        );
        assert!(p.used_playwright.is_none());
    }

    #[test]
    fn test_urls_capped_at_ten() {
        let out: String = (0..15).map(|i| format!("https://example.com/page{i} ")).collect();
        assert_eq!(extract_urls(&out).len(), MAX_URLS);
    }

    #[test]
    fn test_browser_markers() {
        let p = parse_agent_output("Used browser_navigate on https://example.com/blocked");
        assert_eq!(p.used_playwright, Some(true));
        assert_eq!(p.urls_playwright_success.unwrap(), vec!["https://example.com/blocked"]);

        let p = parse_agent_output("Fell back to Playwright without urls");
        assert_eq!(p.used_playwright, Some(true));
        assert_eq!(p.urls_playwright_success, Some(vec![]));
        assert!(p.urls.is_none());
    }
}
