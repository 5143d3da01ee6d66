//! 单次运行的输入：不可变值类型
//!
//! 控制器只读取 RunConfig，每次尝试都用它重新渲染 prompt；
//! thread_id 非空时在重试循环开始前覆盖控制器当前的会话 id。

use serde::{Deserialize, Serialize};

/// 调研运行配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// 产品 / 领域，如 electricity、salary
    pub product: String,
    /// 目标公司，可为空
    pub provider: String,
    /// 国家代码（ES、UK …）
    pub country_code: String,
    /// 语言代码（es、en …）
    pub language: String,
    /// 显式查询；为空时 prompt 使用默认查询
    pub query: Option<String>,
    /// 搜索时效：pd / pw / pm / py / ""
    pub freshness: Option<String>,
    pub extraction_prompt: Option<String>,
    pub validation_prompt: Option<String>,
    /// 自定义 system prompt 模板（{placeholder} 替换）
    pub system_prompt_template: Option<String>,
    /// prompt 中的日期；为空时取今天
    pub date: Option<String>,
    /// 恢复已有会话
    pub thread_id: Option<String>,
}

impl RunConfig {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            country_code: "ES".to_string(),
            language: "es".to_string(),
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn with_country(mut self, code: impl Into<String>) -> Self {
        self.country_code = code.into();
        self
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_freshness(mut self, freshness: impl Into<String>) -> Self {
        self.freshness = Some(freshness.into());
        self
    }

    pub fn with_extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn with_validation_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.validation_prompt = Some(prompt.into());
        self
    }

    pub fn with_system_prompt_template(mut self, template: impl Into<String>) -> Self {
        self.system_prompt_template = Some(template.into());
        self
    }

    pub fn with_date(mut self, date: impl Into<String>) -> Self {
        self.date = Some(date.into());
        self
    }

    pub fn with_thread_id(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// 非空查询
    pub fn query_text(&self) -> Option<&str> {
        self.query.as_deref().filter(|q| !q.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_fills_fields() {
        let cfg = RunConfig::new("electricity")
            .with_provider("Iberdrola")
            .with_country("ES")
            .with_query("precio luz iberdrola")
            .with_thread_id("t-1");
        assert_eq!(cfg.product, "electricity");
        assert_eq!(cfg.query_text(), Some("precio luz iberdrola"));
        assert_eq!(cfg.thread_id.as_deref(), Some("t-1"));
        assert_eq!(cfg.language, "es");
    }

    #[test]
    fn test_blank_query_is_none() {
        assert_eq!(RunConfig::new("x").with_query("  ").query_text(), None);
    }

    #[test]
    fn test_deserialize_partial() {
        let cfg: RunConfig = serde_json::from_str(r#"{"product": "x", "query": "q"}"#).unwrap();
        assert_eq!(cfg.query_text(), Some("q"));
        assert!(cfg.thread_id.is_none());
    }
}
