//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

use std::sync::Arc;

use crate::config::LlmSection;

pub use mock::MockLlmClient;
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{extract_json_object, LlmClient};

/// 按 [llm] 配置创建客户端：provider = "mock" 时用脚本客户端，否则走 OpenAI 兼容端点
pub fn create_llm_from_config(cfg: &LlmSection) -> Arc<dyn LlmClient> {
    match cfg.provider.as_str() {
        "mock" => {
            tracing::warn!("using mock LLM client");
            Arc::new(MockLlmClient::new())
        }
        _ => Arc::new(OpenAiClient::from_config(cfg)),
    }
}
