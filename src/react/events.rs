//! 运行过程事件：步骤切换、模型思考、工具调用与结果、重试、记忆重置
//!
//! 事件经无界通道发出，发送失败（接收端已关闭）直接忽略；
//! spawn_log_sink 把事件流转成 tracing 日志，测试可直接从接收端断言事件序列。

use serde::Serialize;
use tokio::sync::mpsc;

/// 工具输出预览最大字符数
pub const RESULT_PREVIEW_CHARS: usize = 500;
/// 工具输入预览最大字符数
pub const INPUT_PREVIEW_CHARS: usize = 200;

/// 研究流程中的一步（编号 + 标签）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub number: &'static str,
    pub label: &'static str,
}

pub const STEP_QUERY: Step = Step {
    number: "0-2",
    label: "analysis and query construction",
};
pub const STEP_SEARCH: Step = Step {
    number: "3",
    label: "web search",
};
pub const STEP_SCRAPE: Step = Step {
    number: "4",
    label: "page scrape",
};
pub const STEP_BROWSER: Step = Step {
    number: "5",
    label: "browser automation",
};
pub const STEP_EXTRACT: Step = Step {
    number: "6-7",
    label: "extraction and validation",
};

/// 工具名 → 所属步骤
pub fn step_for_tool(tool: &str) -> Option<Step> {
    match tool {
        "brave_web_search" => Some(STEP_SEARCH),
        "simple_scrape_url" => Some(STEP_SCRAPE),
        t if t.starts_with("browser_") => Some(STEP_BROWSER),
        _ => None,
    }
}

/// 可序列化为 JSON 的过程事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgentEvent {
    StepChange { step: Step },
    /// 正在调用模型
    LlmThinking { agent: String },
    ToolInvoked { tool: String, input: String },
    ToolResult { tool: String, preview: String },
    ToolError { tool: String, error: String },
    Finished { agent: String },
    /// 控制器即将重试
    Retry { attempt: usize, reason: String },
    MemoryReset { thread_id: String },
}

pub type EventSender = mpsc::UnboundedSender<AgentEvent>;

pub fn send_event(tx: &Option<EventSender>, event: AgentEvent) {
    if let Some(t) = tx {
        let _ = t.send(event);
    }
}

/// 按字符截断并追加 "..."
pub fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    } else {
        text.to_string()
    }
}

/// 把事件流写入日志，直到发送端全部关闭
pub fn spawn_log_sink(mut rx: mpsc::UnboundedReceiver<AgentEvent>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            match event {
                AgentEvent::StepChange { step } => {
                    tracing::info!(step = step.number, "step: {}", step.label)
                }
                AgentEvent::LlmThinking { agent } => tracing::info!(agent = %agent, "LLM thinking"),
                AgentEvent::ToolInvoked { tool, input } => {
                    tracing::info!(tool = %tool, input = %input, "tool invoked")
                }
                AgentEvent::ToolResult { tool, preview } => {
                    tracing::info!(tool = %tool, output = %preview, "tool result")
                }
                AgentEvent::ToolError { tool, error } => {
                    tracing::error!(tool = %tool, error = %error, "tool error")
                }
                AgentEvent::Finished { agent } => tracing::info!(agent = %agent, "agent finished"),
                AgentEvent::Retry { attempt, reason } => {
                    tracing::warn!(attempt, reason = %reason, "retrying")
                }
                AgentEvent::MemoryReset { thread_id } => {
                    tracing::info!(thread = %thread_id, "memory reset")
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_for_tool() {
        assert_eq!(step_for_tool("brave_web_search"), Some(STEP_SEARCH));
        assert_eq!(step_for_tool("simple_scrape_url"), Some(STEP_SCRAPE));
        assert_eq!(step_for_tool("browser_snapshot"), Some(STEP_BROWSER));
        assert_eq!(step_for_tool("calculator"), None);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let v = serde_json::to_value(AgentEvent::ToolInvoked {
            tool: "brave_web_search".into(),
            input: "{}".into(),
        })
        .unwrap();
        assert_eq!(v["type"], "tool_invoked");
        assert_eq!(v["tool"], "brave_web_search");
    }

    #[test]
    fn test_preview_truncates() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
    }

    #[tokio::test]
    async fn test_send_event_ignores_missing_or_closed_channel() {
        send_event(&None, AgentEvent::Finished { agent: "BASE".into() });
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        send_event(&Some(tx), AgentEvent::Finished { agent: "BASE".into() });
    }

    #[tokio::test]
    async fn test_log_sink_drains_until_closed() {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = spawn_log_sink(rx);
        tx.send(AgentEvent::Retry {
            attempt: 1,
            reason: "timeout".into(),
        })
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
