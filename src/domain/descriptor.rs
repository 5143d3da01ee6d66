//! 领域描述文件（`<dir>/<name>/config.json`）
//!
//! 每个领域一个 JSON 描述：产品名、查询模板、国家 → 语言 / 公司列表、时效、可选的抽取 / 校验提示。
//! 未知字段直接拒绝，便于发现拼写错误；以 `_` 开头的目录被忽略。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{Local, NaiveDate};
use serde::Deserialize;
use thiserror::Error;
use walkdir::WalkDir;

use crate::domain::countries::country_name;
use crate::domain::RunConfig;

const VALID_FRESHNESS: &[&str] = &["pd", "pw", "pm", "py", ""];

#[derive(Debug, Error)]
pub enum DescriptorError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid descriptor: {0}")]
    Invalid(String),
}

/// 国家条目
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CountryConfig {
    pub language: String,
    #[serde(default)]
    pub providers: Vec<String>,
}

fn default_freshness() -> String {
    "pw".to_string()
}

/// 已校验的领域描述
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DomainDescriptor {
    pub product: String,
    /// 占位符：{product} {provider} {country_name} {date}
    pub query_template: String,
    pub countries: BTreeMap<String, CountryConfig>,
    #[serde(default = "default_freshness")]
    pub freshness: String,
    #[serde(default)]
    pub extraction_prompt: String,
    #[serde(default)]
    pub validation_prompt: String,
    #[serde(default)]
    pub system_prompt_template: Option<String>,
    #[serde(default)]
    pub social_networks: Option<Vec<String>>,
}

impl DomainDescriptor {
    pub fn from_json(text: &str) -> Result<Self, DescriptorError> {
        let parsed: Self = serde_json::from_str(text).map_err(|e| DescriptorError::Json {
            path: PathBuf::from("<inline>"),
            source: e,
        })?;
        parsed.validate()
    }

    pub fn load(path: &Path) -> Result<Self, DescriptorError> {
        let text = std::fs::read_to_string(path).map_err(|e| DescriptorError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let parsed: Self = serde_json::from_str(&text).map_err(|e| DescriptorError::Json {
            path: path.to_path_buf(),
            source: e,
        })?;
        parsed.validate()
    }

    /// 去空白、语言小写化，并检查必填项与时效取值
    pub fn validate(mut self) -> Result<Self, DescriptorError> {
        self.product = self.product.trim().to_string();
        if self.product.is_empty() {
            return Err(DescriptorError::Invalid("product must not be empty".into()));
        }
        self.query_template = self.query_template.trim().to_string();
        if self.query_template.is_empty() {
            return Err(DescriptorError::Invalid("query_template must not be empty".into()));
        }
        if self.countries.is_empty() {
            return Err(DescriptorError::Invalid(
                "countries must contain at least one country".into(),
            ));
        }
        for (code, country) in self.countries.iter_mut() {
            country.language = country.language.trim().to_lowercase();
            if country.language.is_empty() {
                return Err(DescriptorError::Invalid(format!(
                    "language for country {} must not be empty",
                    code
                )));
            }
        }
        if !VALID_FRESHNESS.contains(&self.freshness.as_str()) {
            return Err(DescriptorError::Invalid(format!(
                "freshness '{}' is not valid, expected one of pd, pw, pm, py or empty",
                self.freshness
            )));
        }
        Ok(self)
    }

    pub fn country_codes(&self) -> Vec<String> {
        self.countries.keys().cloned().collect()
    }

    pub fn providers(&self, country_code: &str) -> &[String] {
        self.countries
            .get(country_code)
            .map(|c| c.providers.as_slice())
            .unwrap_or(&[])
    }

    /// 国家未配置时为 es
    pub fn language(&self, country_code: &str) -> String {
        self.countries
            .get(country_code)
            .map(|c| c.language.clone())
            .unwrap_or_else(|| "es".to_string())
    }

    pub fn render_query(&self, provider: &str, country_code: &str, date: NaiveDate) -> String {
        let rendered = self
            .query_template
            .replace("{product}", &self.product)
            .replace("{provider}", provider)
            .replace("{country_name}", &country_name(country_code))
            .replace("{date}", &date.format("%-d %B %Y").to_string());
        rendered.split_whitespace().collect::<Vec<_>>().join(" ")
    }

    /// 合并描述与请求参数；未给查询时由 query_template 生成（日期取今天）
    pub fn build_run_config(
        &self,
        provider: &str,
        country_code: &str,
        query: Option<&str>,
        thread_id: Option<&str>,
    ) -> RunConfig {
        self.build_run_config_on(provider, country_code, query, thread_id, Local::now().date_naive())
    }

    pub fn build_run_config_on(
        &self,
        provider: &str,
        country_code: &str,
        query: Option<&str>,
        thread_id: Option<&str>,
        date: NaiveDate,
    ) -> RunConfig {
        let query = match query.filter(|q| !q.trim().is_empty()) {
            Some(q) => q.to_string(),
            None => self.render_query(provider, country_code, date),
        };
        let mut cfg = RunConfig::new(self.product.clone())
            .with_provider(provider)
            .with_country(country_code)
            .with_language(self.language(country_code))
            .with_query(query)
            .with_freshness(self.freshness.clone());
        if !self.extraction_prompt.is_empty() {
            cfg = cfg.with_extraction_prompt(self.extraction_prompt.clone());
        }
        if !self.validation_prompt.is_empty() {
            cfg = cfg.with_validation_prompt(self.validation_prompt.clone());
        }
        if let Some(t) = &self.system_prompt_template {
            cfg = cfg.with_system_prompt_template(t.clone());
        }
        if let Some(id) = thread_id {
            cfg = cfg.with_thread_id(id);
        }
        cfg
    }
}

/// 扫描 dir 下所有 config.json；目录名即领域名，非法描述记录日志后跳过
pub fn discover_descriptors(dir: &Path) -> BTreeMap<String, DomainDescriptor> {
    let mut found = BTreeMap::new();
    if !dir.is_dir() {
        tracing::warn!(dir = %dir.display(), "domain directory not found");
        return found;
    }

    for entry in WalkDir::new(dir)
        .max_depth(5)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('_'))
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() || entry.file_name() != "config.json" {
            continue;
        }
        let Some(name) = entry
            .path()
            .parent()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string())
        else {
            continue;
        };

        match DomainDescriptor::load(entry.path()) {
            Ok(descriptor) => {
                tracing::debug!(
                    domain = %name,
                    product = %descriptor.product,
                    countries = ?descriptor.country_codes(),
                    "domain discovered"
                );
                found.insert(name, descriptor);
            }
            Err(e) => tracing::error!(domain = %name, error = %e, "skipping invalid domain descriptor"),
        }
    }
    found
}
