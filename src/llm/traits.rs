//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient：complete（非流式）与 complete_structured（按 schema 输出 JSON）。
//! 错误以文本返回，由运行控制器按分类表归类。

use async_trait::async_trait;
use serde_json::Value;

use crate::memory::Message;
use crate::schemas::ResponseSchema;

/// LLM 客户端 trait
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成
    async fn complete(&self, messages: &[Message]) -> Result<String, String>;

    /// 要求模型按 schema 输出 JSON 对象。
    /// 默认实现：追加一条 schema 说明的 system 消息，从回复中提取第一个 JSON 对象并按 schema 校验。
    async fn complete_structured(
        &self,
        messages: &[Message],
        schema: &ResponseSchema,
    ) -> Result<Value, String> {
        let mut full = messages.to_vec();
        full.push(Message::system(schema.instruction()));
        let reply = self.complete(&full).await?;
        let value = extract_json_object(&reply)
            .ok_or_else(|| format!("model reply is not a JSON object for schema {}", schema.name))?;
        schema.validate(&value)
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

/// 从模型回复中提取 JSON 对象：优先 ```json 代码块，其次首个 `{` 到最后一个 `}`
pub fn extract_json_object(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    let candidate = if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim())
    } else {
        let start = trimmed.find('{')?;
        let end = trimmed.rfind('}')?;
        if end < start {
            return None;
        }
        &trimmed[start..=end]
    };
    match serde_json::from_str::<Value>(candidate) {
        Ok(v) if v.is_object() => Some(v),
        _ => None,
    }
}
