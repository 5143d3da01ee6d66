//! 每次尝试重新渲染的 system / user 消息
//!
//! 领域可以提供 system_prompt_template（`{placeholder}` 替换）；模板引用了未知占位符时
//! 记录警告并回退到通用的分步调研 prompt。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

use crate::domain::{country_name, language_name, search_params, RunConfig};

/// 未给查询时的 user 消息
pub const DEFAULT_INSTRUCTION: &str = "Carry out the task according to the instructions.";
/// 排除提示中最多列出的失败 URL 数
pub const MAX_FAILED_URLS_IN_HINT: usize = 5;

static PLACEHOLDER_RE: OnceLock<Regex> = OnceLock::new();

fn placeholder_regex() -> &'static Regex {
    PLACEHOLDER_RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").unwrap())
}

/// prompt 变量（同时作为自定义模板的占位符集合）
struct PromptVars {
    product: String,
    provider: String,
    provider_text: String,
    country_name: String,
    country_code: String,
    language: String,
    language_name: String,
    date: String,
    freshness: String,
    query_es: String,
    brave_search_lang: String,
    brave_ui_lang: String,
    brave_country: String,
    extraction_prompt: String,
    validation_prompt: String,
    extraction_section: String,
    validation_section: String,
}

fn today() -> String {
    chrono::Local::now().format("%-d %B %Y").to_string()
}

impl PromptVars {
    fn from_config(config: &RunConfig) -> Self {
        let product = if config.product.is_empty() {
            "product".to_string()
        } else {
            config.product.clone()
        };
        let country_code = if config.country_code.is_empty() {
            "ES".to_string()
        } else {
            config.country_code.clone()
        };
        let language = if config.language.is_empty() {
            "es".to_string()
        } else {
            config.language.to_lowercase()
        };
        let date = config.date.clone().unwrap_or_else(today);
        let country = country_name(&country_code);
        let provider_text = if config.provider.is_empty() {
            String::new()
        } else {
            format!("from {} ", config.provider)
        };
        let query_es = match config.query_text() {
            Some(q) => q.to_string(),
            None => format!("price of {} {}in {} on {}", product, provider_text, country, date),
        };
        let (brave_country, brave_search_lang, brave_ui_lang) = search_params(&country_code);

        let extraction_prompt = config.extraction_prompt.clone().unwrap_or_default();
        let validation_prompt = config.validation_prompt.clone().unwrap_or_default();
        let extraction_section = if extraction_prompt.is_empty() {
            String::new()
        } else {
            format!(
                "\nSPECIFIC EXTRACTION INSTRUCTIONS FOR {}:\n{}",
                product.to_uppercase(),
                extraction_prompt
            )
        };
        let validation_section = if validation_prompt.is_empty() {
            String::new()
        } else {
            format!(
                "\nSPECIFIC VALIDATION RULES FOR {}:\n{}",
                product.to_uppercase(),
                validation_prompt
            )
        };

        Self {
            language_name: language_name(&language).to_string(),
            product,
            provider: config.provider.clone(),
            provider_text,
            country_name: country,
            country_code,
            language,
            date,
            freshness: config.freshness.clone().unwrap_or_else(|| "py".to_string()),
            query_es,
            brave_search_lang,
            brave_ui_lang,
            brave_country,
            extraction_prompt,
            validation_prompt,
            extraction_section,
            validation_section,
        }
    }

    fn as_map(&self) -> HashMap<&'static str, &str> {
        HashMap::from([
            ("product", self.product.as_str()),
            ("provider", self.provider.as_str()),
            ("provider_text", self.provider_text.as_str()),
            ("country_name", self.country_name.as_str()),
            ("country_code", self.country_code.as_str()),
            ("language", self.language.as_str()),
            ("language_name", self.language_name.as_str()),
            ("date", self.date.as_str()),
            ("freshness", self.freshness.as_str()),
            ("query_es", self.query_es.as_str()),
            ("brave_search_lang", self.brave_search_lang.as_str()),
            ("brave_ui_lang", self.brave_ui_lang.as_str()),
            ("brave_country", self.brave_country.as_str()),
            ("extraction_prompt", self.extraction_prompt.as_str()),
            ("validation_prompt", self.validation_prompt.as_str()),
            ("extraction_section", self.extraction_section.as_str()),
            ("validation_section", self.validation_section.as_str()),
        ])
    }
}

/// 替换模板中的占位符；存在未知占位符时返回 Err(名字)
pub fn fill_template(template: &str, vars: &HashMap<&'static str, &str>) -> Result<String, String> {
    let re = placeholder_regex();
    if let Some(unknown) = re
        .captures_iter(template)
        .map(|c| c[1].to_string())
        .find(|name| !vars.contains_key(name.as_str()))
    {
        return Err(unknown);
    }
    Ok(re
        .replace_all(template, |caps: &regex::Captures| {
            vars.get(&caps[1]).copied().unwrap_or_default().to_string()
        })
        .into_owned())
}

pub fn render_system_prompt(config: &RunConfig) -> String {
    let vars = PromptVars::from_config(config);
    if let Some(template) = config.system_prompt_template.as_deref().filter(|t| !t.is_empty()) {
        match fill_template(template, &vars.as_map()) {
            Ok(rendered) => return rendered,
            Err(name) => tracing::warn!(
                placeholder = %name,
                "unknown placeholder in system prompt template, using generic prompt"
            ),
        }
    }
    generic_prompt(&vars)
}

fn generic_prompt(v: &PromptVars) -> String {
    let search_hint = if v.language == "es" {
        "Search with the query exactly as given.".to_string()
    } else {
        format!("Translate the query into {} before searching.", v.language_name)
    };
    let provider_label = if v.provider.is_empty() {
        "(generic)"
    } else {
        v.provider.as_str()
    };

    format!(
        r#"You are a web research agent. You search, scrape and extract structured data.

CONFIGURATION:
- Product: {product} | Provider: {provider_label} | Country: {country_name} ({country_code})
- Language: {language_name} | Date: {date}
- Query: "{query_es}"

=== STEP 1: SEARCH ===

brave_web_search(query="...", count=20, freshness="{freshness}", search_lang="{search_lang}", ui_lang="{ui_lang}", country="{brave_country}")

Required codes: freshness="{freshness}", search_lang="{search_lang}", ui_lang="{ui_lang}", country="{brave_country}".
{search_hint}

=== STEP 2: SELECT AND SCRAPE ===

From the results pick the 5-8 most relevant URLs by title and description.
Prefer official sources (government, regulators, companies), then specialised portals, then established media.
Avoid forums, personal blogs and aggregators without an original source.

Scrape each selected URL with simple_scrape_url(url="..."). If a URL fails, move on to the next one.

=== STEP 3: BROWSER (fallback) ===

Only for relevant URLs that failed in step 2 (SSL, blocking, timeout), use the browser_* tools.
Accept cookie banners. If the page answers 403 or blocks you, skip it. Wait for dynamic pages to load.

STOP RULE: if after 8 URLs you have found no relevant data about {product} {provider_text}in {country_name}, stop and report that not enough data was found.

=== STEP 4: EXTRACTION ===

From the scraped content extract: URL, method (simple_scrape/browser), data relevant to {product} {provider_text}
{extraction_section}

=== STEP 5: VALIDATION AND RESULT ===

Before answering check: at least one source with data, data matches {product}, country is {country_name}, dates close to {date}.

Start your final answer with these two lines:
QUERY_ES: <the query in the source language>
QUERY_FINAL: <the query you actually searched with>

End it with:
VALIDATION:
- Sources processed: [X] | With data: [Y]
- Status: VALID | PARTIAL | INVALID
- Comments: [reason]
{validation_section}
"#,
        product = v.product,
        provider_label = provider_label,
        country_name = v.country_name,
        country_code = v.country_code,
        language_name = v.language_name,
        date = v.date,
        query_es = v.query_es,
        freshness = v.freshness,
        search_lang = v.brave_search_lang,
        ui_lang = v.brave_ui_lang,
        brave_country = v.brave_country,
        search_hint = search_hint,
        provider_text = v.provider_text,
        extraction_section = v.extraction_section,
        validation_section = v.validation_section,
    )
}

/// user 消息：查询（或默认指令）+ 之前失败的 URL（最多 5 个）
pub fn render_user_message(config: &RunConfig, failed_urls: &[String]) -> String {
    let mut msg = config.query_text().unwrap_or(DEFAULT_INSTRUCTION).to_string();
    if !failed_urls.is_empty() {
        let listed: Vec<&str> = failed_urls
            .iter()
            .take(MAX_FAILED_URLS_IN_HINT)
            .map(String::as_str)
            .collect();
        msg.push_str(&format!(
            "\n\nIMPORTANT: avoid these URLs that failed previously: {}",
            listed.join(", ")
        ));
    }
    msg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RunConfig {
        RunConfig::new("electricity")
            .with_provider("Iberdrola")
            .with_country("PT")
            .with_language("pt")
            .with_date("14 January 2026")
    }

    #[test]
    fn test_generic_prompt_injects_search_codes() {
        let p = render_system_prompt(&config());
        assert!(p.contains(r#"search_lang="pt-pt""#));
        assert!(p.contains(r#"ui_lang="pt-BR""#));
        assert!(p.contains(r#"freshness="py""#));
        assert!(p.contains("Translate the query into Portuguese"));
        assert!(p.contains("price of electricity from Iberdrola in Portugal on 14 January 2026"));
        assert!(p.contains("QUERY_FINAL:"));
    }

    #[test]
    fn test_custom_template_substitution() {
        let cfg = config()
            .with_query("preço luz")
            .with_extraction_prompt("kWh price")
            .with_system_prompt_template("{product}|{provider_text}|{brave_country}|{query_es}|{extraction_section}");
        let p = render_system_prompt(&cfg);
        assert_eq!(
            p,
            "electricity|from Iberdrola |PT|preço luz|\nSPECIFIC EXTRACTION INSTRUCTIONS FOR ELECTRICITY:\nkWh price"
        );
    }

    #[test]
    fn test_unknown_placeholder_falls_back_to_generic() {
        let cfg = config().with_system_prompt_template("Hello {nonexistent}");
        let p = render_system_prompt(&cfg);
        assert!(p.starts_with("You are a web research agent"));
    }

    #[test]
    fn test_user_message_lists_first_five_failed_urls() {
        let cfg = RunConfig::new("x").with_query("q");
        let failed: Vec<String> = (0..7).map(|i| format!("https://site{i}.example")).collect();
        let msg = render_user_message(&cfg, &failed);
        assert!(msg.starts_with("q\n\nIMPORTANT"));
        assert!(msg.contains("https://site4.example"));
        assert!(!msg.contains("https://site5.example"));
    }

    #[test]
    fn test_user_message_default_instruction() {
        assert_eq!(render_user_message(&RunConfig::new("x"), &[]), DEFAULT_INSTRUCTION);
    }
}
