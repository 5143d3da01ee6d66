//! 工具装饰器：错误翻译与限流
//!
//! ErrorTranslatingTool 把远程工具的失败改写成给模型看的文本，工具错误永远不会中止运行：
//! 无数据 → 提示换查询或继续；其他 → 截断到 500 字符的通用错误。
//! RateLimitedTool 让调用经过共享的 RateLimiter（互斥 + 最小间隔 + 429 退避）。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::recovery::is_no_data;
use crate::core::RateLimiter;
use crate::tools::Tool;

const MAX_TOOL_ERROR_CHARS: usize = 500;

pub const NO_RESULTS_MESSAGE: &str = "No web results were found for this query. \
Try a different query or continue with the data you already have.";

/// 工具错误 → 模型可读文本
pub fn translate_tool_error(error: &str) -> String {
    if is_no_data(error) {
        return NO_RESULTS_MESSAGE.to_string();
    }
    let bounded: String = error.chars().take(MAX_TOOL_ERROR_CHARS).collect();
    format!("Tool error: {}", bounded)
}

/// 错误翻译装饰器
pub struct ErrorTranslatingTool {
    inner: Arc<dyn Tool>,
}

impl ErrorTranslatingTool {
    pub fn new(inner: Arc<dyn Tool>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Tool for ErrorTranslatingTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        match self.inner.execute(args).await {
            Ok(out) => Ok(out),
            Err(e) => {
                tracing::warn!(tool = %self.inner.name(), error = %e, "tool error translated");
                Ok(translate_tool_error(&e))
            }
        }
    }
}

/// 限流装饰器
pub struct RateLimitedTool {
    inner: Arc<dyn Tool>,
    limiter: Arc<RateLimiter>,
}

impl RateLimitedTool {
    pub fn new(inner: Arc<dyn Tool>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl Tool for RateLimitedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn parameters_schema(&self) -> Value {
        self.inner.parameters_schema()
    }

    async fn execute(&self, args: Value) -> Result<String, String> {
        let inner = self.inner.clone();
        self.limiter
            .execute_with_retry(move || {
                let inner = inner.clone();
                let args = args.clone();
                async move { inner.execute(args).await }
            })
            .await
    }
}
