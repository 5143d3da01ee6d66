//! Mock LLM 客户端（用于测试与离线运行，无需 API）
//!
//! 按顺序返回预设回复；队列耗尽后回复固定文本。记录调用次数与收到的消息，便于断言。

use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::llm::LlmClient;
use crate::memory::Message;

const FALLBACK_REPLY: &str = "No further actions. Research finished.";

/// Mock 客户端：脚本化回复队列
#[derive(Debug, Default)]
pub struct MockLlmClient {
    replies: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 依次返回给定文本
    pub fn with_replies<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let client = Self::default();
        for r in replies {
            client.push_reply(r);
        }
        client
    }

    pub fn push_reply(&self, reply: impl Into<String>) {
        self.lock_replies().push_back(Ok(reply.into()));
    }

    pub fn push_error(&self, error: impl Into<String>) {
        self.lock_replies().push_back(Err(error.into()));
    }

    /// 已发生的 complete 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 每次调用收到的消息
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn lock_replies(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<String, String>>> {
        self.replies.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String, String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        self.lock_replies()
            .pop_front()
            .unwrap_or_else(|| Ok(FALLBACK_REPLY.to_string()))
    }
}
