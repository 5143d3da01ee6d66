//! 输出抽取管线：原生结构化对象 → 后处理结构化（第二次模型调用）→ 文本解析
//!
//! 结构化路径与文本解析路径互斥：extract_structured 返回 Some 时调用方不再 parse_text。

use serde_json::Value;

use crate::domain::RunConfig;
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::react::executor::AgentOutput;
use crate::react::parsing::{parse_agent_output, ParsedOutput};
use crate::schemas::{response_schema_for, ResponseSchema};

/// 结构化输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredMode {
    /// 执行器直接按 schema 输出
    Native,
    /// 按产品推断 schema，事后再调用一次模型
    Legacy,
    None,
}

impl StructuredMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native => "native",
            Self::Legacy => "legacy",
            Self::None => "none",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct OutputParser {
    response_schema: Option<ResponseSchema>,
    legacy: bool,
}

impl OutputParser {
    pub fn new(response_schema: Option<ResponseSchema>, legacy: bool) -> Self {
        if legacy && response_schema.is_none() {
            tracing::warn!(
                "legacy structured output costs a second model call per run; configure a response schema instead"
            );
        }
        Self {
            response_schema,
            legacy,
        }
    }

    pub fn mode(&self) -> StructuredMode {
        if self.response_schema.is_some() {
            StructuredMode::Native
        } else if self.legacy {
            StructuredMode::Legacy
        } else {
            StructuredMode::None
        }
    }

    /// 交给执行器的原生 schema
    pub fn response_schema(&self) -> Option<&ResponseSchema> {
        self.response_schema.as_ref()
    }

    pub async fn extract_structured(
        &self,
        result: &AgentOutput,
        output_text: &str,
        llm: &dyn LlmClient,
        config: &RunConfig,
    ) -> Option<Value> {
        if let Some(native) = &result.structured {
            tracing::info!(mode = "native", "structured output");
            return Some(native.clone());
        }

        if let Some(schema) = &self.response_schema {
            tracing::warn!(
                schema = %schema.name,
                "response schema configured but no native structured object returned, post-processing"
            );
            return post_process(output_text, llm, config, schema).await;
        }

        if self.legacy && !config.product.is_empty() {
            let schema = response_schema_for(&config.product);
            return post_process(output_text, llm, config, &schema).await;
        }

        None
    }

    pub fn parse_text(&self, output_text: &str) -> ParsedOutput {
        parse_agent_output(output_text)
    }
}

/// 额外一次模型调用，把自由文本整理成 schema 对象；失败返回 None
async fn post_process(
    output_text: &str,
    llm: &dyn LlmClient,
    config: &RunConfig,
    schema: &ResponseSchema,
) -> Option<Value> {
    let or_na = |s: &str| if s.is_empty() { "N/A".to_string() } else { s.to_string() };
    let prompt = format!(
        "Extract and structure the following information in the requested format.\n\n\
         CONTEXT:\n\
         - Provider: {}\n\
         - Country: {}\n\
         - Query used: {}\n\n\
         INFORMATION TO STRUCTURE:\n{}\n\n\
         Extract every relevant data point and structure it according to the schema.",
        or_na(&config.provider),
        or_na(&config.country_code),
        config.query_text().unwrap_or("N/A"),
        output_text
    );
    match llm.complete_structured(&[Message::user(prompt)], schema).await {
        Ok(value) => {
            tracing::info!(mode = "post_process", schema = %schema.name, "structured output");
            Some(value)
        }
        Err(e) => {
            tracing::warn!(error = %e, "failed to build structured output");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;

    fn config() -> RunConfig {
        RunConfig::new("salary").with_provider("H&M").with_query("salario dependiente")
    }

    #[tokio::test]
    async fn test_native_object_returned_without_model_call() {
        let llm = MockLlmClient::new();
        let parser = OutputParser::new(Some(response_schema_for("salary")), false);
        let result = AgentOutput {
            messages: vec![Message::assistant("{}")],
            structured: Some(serde_json::json!({"provider": "H&M"})),
        };
        let v = parser.extract_structured(&result, "{}", &llm, &config()).await;
        assert_eq!(v, Some(serde_json::json!({"provider": "H&M"})));
        assert_eq!(llm.call_count(), 0);
        assert_eq!(parser.mode(), StructuredMode::Native);
    }

    #[tokio::test]
    async fn test_schema_without_native_object_post_processes() {
        let llm = MockLlmClient::with_replies([
            r#"{"provider": "H&M", "country": "ES", "query_used": "salario dependiente", "summary": "s"}"#,
        ]);
        let parser = OutputParser::new(Some(response_schema_for("salary")), false);
        let v = parser
            .extract_structured(&AgentOutput::default(), "free text", &llm, &config())
            .await;
        assert_eq!(v.unwrap()["provider"], "H&M");
        assert_eq!(llm.call_count(), 1);
        let prompt = &llm.calls()[0][0].content;
        assert!(prompt.contains("Provider: H&M"));
        assert!(prompt.contains("Query used: salario dependiente"));
        assert!(prompt.contains("free text"));
    }

    #[tokio::test]
    async fn test_post_process_failure_is_none() {
        let llm = MockLlmClient::new();
        llm.push_error("timeout");
        let parser = OutputParser::new(None, true);
        assert_eq!(parser.mode(), StructuredMode::Legacy);
        let v = parser
            .extract_structured(&AgentOutput::default(), "text", &llm, &config())
            .await;
        assert!(v.is_none());
    }

    #[tokio::test]
    async fn test_post_processed_object_not_matching_schema_is_none() {
        let llm = MockLlmClient::with_replies([r#"{"unrelated": 1}"#]);
        let parser = OutputParser::new(Some(response_schema_for("salary")), false);
        let v = parser
            .extract_structured(&AgentOutput::default(), "free text", &llm, &config())
            .await;
        assert!(v.is_none());
        assert_eq!(llm.call_count(), 1);
    }

    #[tokio::test]
    async fn test_legacy_infers_schema_from_product() {
        let llm = MockLlmClient::with_replies([
            r#"{"provider": "H&M", "country": "ES", "query_used": "q", "summary": "s"}"#,
        ]);
        let parser = OutputParser::new(None, true);
        parser
            .extract_structured(&AgentOutput::default(), "text", &llm, &config())
            .await
            .unwrap();
        let schema_msg = &llm.calls()[0][1].content;
        assert!(schema_msg.contains("SalaryResponse"));
    }

    #[tokio::test]
    async fn test_legacy_skipped_without_product_and_none_mode() {
        let llm = MockLlmClient::new();
        let legacy = OutputParser::new(None, true);
        let cfg = RunConfig::default();
        assert!(legacy
            .extract_structured(&AgentOutput::default(), "t", &llm, &cfg)
            .await
            .is_none());

        let plain = OutputParser::default();
        assert_eq!(plain.mode(), StructuredMode::None);
        assert!(plain
            .extract_structured(&AgentOutput::default(), "t", &llm, &config())
            .await
            .is_none());
        assert_eq!(llm.call_count(), 0);
    }
}
