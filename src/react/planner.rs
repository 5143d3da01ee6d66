//! Tool Call 解析
//!
//! 模型回复中的 JSON 对象若带非空 "tool" 字段则为工具调用，其余一律视为最终回答
//! （包括按 schema 输出的 JSON 结果）。

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::extract_json_object;

/// 工具调用：{"tool": "brave_web_search", "args": {"query": "..."}}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub tool: String,
    #[serde(default)]
    pub args: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlannerOutput {
    /// 最终回答
    Response(String),
    ToolCall(ToolCall),
}

pub fn parse_llm_output(output: &str) -> PlannerOutput {
    let trimmed = output.trim();
    let call = extract_json_object(trimmed).and_then(|obj| {
        let tool = obj.get("tool")?.as_str()?.trim().to_string();
        if tool.is_empty() {
            return None;
        }
        let args = obj
            .get("args")
            .cloned()
            .filter(|a| !a.is_null())
            .unwrap_or_else(|| Value::Object(Default::default()));
        Some(ToolCall { tool, args })
    });
    match call {
        Some(tc) => PlannerOutput::ToolCall(tc),
        None => PlannerOutput::Response(trimmed.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_call_in_fence() {
        let out = "I will search.\n```json\n{\"tool\": \"brave_web_search\", \"args\": {\"query\": \"luz\"}}\n```";
        assert_eq!(
            parse_llm_output(out),
            PlannerOutput::ToolCall(ToolCall {
                tool: "brave_web_search".into(),
                args: serde_json::json!({"query": "luz"}),
            })
        );
    }

    #[test]
    fn test_missing_args_become_empty_object() {
        match parse_llm_output(r#"{"tool": "browser_snapshot"}"#) {
            PlannerOutput::ToolCall(tc) => assert_eq!(tc.args, serde_json::json!({})),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_plain_text_and_result_json_are_responses() {
        assert_eq!(
            parse_llm_output("  Final answer.  "),
            PlannerOutput::Response("Final answer.".into())
        );
        let json_answer = r#"{"summary": "ok", "urls": []}"#;
        assert_eq!(
            parse_llm_output(json_answer),
            PlannerOutput::Response(json_answer.into())
        );
        assert!(matches!(
            parse_llm_output(r#"{"tool": "  "}"#),
            PlannerOutput::Response(_)
        ));
    }
}
