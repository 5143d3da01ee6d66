//! 底层 Agent 执行器：绑定工具集、会话存储、可选响应 schema 与事件通道
//!
//! ReactExecutor 是默认实现：从 checkpoint 读出该 thread 的历史，追加本次消息，
//! 循环「模型规划 → JSON 工具调用 → 观察」，遇到不含工具调用的回复即结束，并把完整历史写回存储。
//! 本地工具失败与未知工具都转成观察交给模型；模型调用失败则原样返回给控制器分类。

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::core::AgentError;
use crate::llm::{extract_json_object, LlmClient};
use crate::memory::{last_assistant_content, CheckpointStore, Message};
use crate::react::events::{
    preview, send_event, step_for_tool, AgentEvent, EventSender, INPUT_PREVIEW_CHARS,
    RESULT_PREVIEW_CHARS, STEP_EXTRACT, STEP_QUERY,
};
use crate::react::planner::{parse_llm_output, PlannerOutput};
use crate::schemas::{tool_call_schema_json, ResponseSchema};
use crate::tools::{Tool, ToolExecutor};

/// 单次调用的结果：完整消息历史 + 原生结构化对象
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    pub messages: Vec<Message>,
    pub structured: Option<Value>,
}

impl AgentOutput {
    /// 最后一条 assistant 消息
    pub fn final_text(&self) -> &str {
        last_assistant_content(&self.messages).unwrap_or_default()
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }
}

#[async_trait]
pub trait AgentExecutor: Send + Sync {
    async fn invoke(&self, messages: Vec<Message>, thread_id: &str) -> Result<AgentOutput, String>;
}

/// 构建执行器所需的全部依赖
#[derive(Clone)]
pub struct ExecutorSpec {
    pub llm: Arc<dyn LlmClient>,
    pub tools: Vec<Arc<dyn Tool>>,
    pub checkpointer: Option<CheckpointStore>,
    pub response_schema: Option<ResponseSchema>,
    pub events: Option<EventSender>,
    pub name: String,
    pub max_steps: usize,
    pub tool_timeout_secs: u64,
}

/// 控制器在初始化（及每次会话重置）时通过工厂重建执行器
pub trait ExecutorFactory: Send + Sync {
    fn build(&self, spec: ExecutorSpec) -> Result<Arc<dyn AgentExecutor>, String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ReactExecutorFactory;

impl ExecutorFactory for ReactExecutorFactory {
    fn build(&self, spec: ExecutorSpec) -> Result<Arc<dyn AgentExecutor>, String> {
        if spec.max_steps == 0 {
            return Err("max_steps must be at least 1".to_string());
        }
        Ok(Arc::new(ReactExecutor::new(spec)))
    }
}

pub struct ReactExecutor {
    llm: Arc<dyn LlmClient>,
    tools: ToolExecutor,
    store: Option<CheckpointStore>,
    response_schema: Option<ResponseSchema>,
    events: Option<EventSender>,
    name: String,
    max_steps: usize,
}

impl ReactExecutor {
    pub fn new(spec: ExecutorSpec) -> Self {
        let tools = ToolExecutor::from_tools(spec.tools, spec.tool_timeout_secs);
        tracing::debug!(
            agent = %spec.name,
            tools = ?tools.tool_names(),
            max_steps = spec.max_steps,
            "react executor built"
        );
        Self {
            llm: spec.llm,
            tools,
            store: spec.checkpointer,
            response_schema: spec.response_schema,
            events: spec.events,
            name: spec.name,
            max_steps: spec.max_steps,
        }
    }

    /// 工具清单与调用格式；只放进模型请求，不写入会话历史
    fn tool_protocol(&self) -> String {
        let mut text = format!(
            "You can call these tools:\n{}\n\n\
             To call a tool, reply ONLY with a JSON object matching this schema:\n{}\n\
             Example: {{\"tool\": \"brave_web_search\", \"args\": {{\"query\": \"...\"}}}}\n\
             Call one tool per reply. When you are done, reply with the final answer and no tool call.",
            self.tools.describe(),
            tool_call_schema_json()
        );
        if let Some(schema) = &self.response_schema {
            text.push_str("\n\nFinal answer format:\n");
            text.push_str(&schema.instruction());
        }
        text
    }

    /// 最终回答中符合 schema 的对象；不符合时交给输出管线做后处理
    fn structured_answer(&self, answer: &str) -> Option<Value> {
        let schema = self.response_schema.as_ref()?;
        let candidate = extract_json_object(answer)?;
        match schema.validate(&candidate) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(agent = %self.name, error = %e, "final answer rejected by response schema");
                None
            }
        }
    }

    fn persist(&self, thread_id: &str, conversation: &[Message]) {
        if let Some(store) = &self.store {
            store.save(thread_id, conversation.to_vec());
        }
    }

    async fn observe(&self, tool: &str, args: Value) -> String {
        if let Some(step) = step_for_tool(tool) {
            send_event(&self.events, AgentEvent::StepChange { step });
        }
        send_event(
            &self.events,
            AgentEvent::ToolInvoked {
                tool: tool.to_string(),
                input: preview(&args.to_string(), INPUT_PREVIEW_CHARS),
            },
        );
        match self.tools.execute(tool, args).await {
            Ok(out) => {
                send_event(
                    &self.events,
                    AgentEvent::ToolResult {
                        tool: tool.to_string(),
                        preview: preview(&out, RESULT_PREVIEW_CHARS),
                    },
                );
                out
            }
            Err(e) => {
                send_event(
                    &self.events,
                    AgentEvent::ToolError {
                        tool: tool.to_string(),
                        error: e.to_string(),
                    },
                );
                format!("Error: {}", e)
            }
        }
    }
}

#[async_trait]
impl AgentExecutor for ReactExecutor {
    async fn invoke(&self, messages: Vec<Message>, thread_id: &str) -> Result<AgentOutput, String> {
        let mut conversation = self
            .store
            .as_ref()
            .map(|s| s.load(thread_id))
            .unwrap_or_default();
        conversation.extend(messages);
        let protocol = Message::system(self.tool_protocol());

        send_event(&self.events, AgentEvent::StepChange { step: STEP_QUERY });

        for _ in 0..self.max_steps {
            send_event(
                &self.events,
                AgentEvent::LlmThinking {
                    agent: self.name.clone(),
                },
            );
            let mut request = Vec::with_capacity(conversation.len() + 1);
            request.push(protocol.clone());
            request.extend(conversation.iter().cloned());

            let output = match self.llm.complete(&request).await {
                Ok(o) => o,
                Err(e) => {
                    self.persist(thread_id, &conversation);
                    return Err(e);
                }
            };

            match parse_llm_output(&output) {
                PlannerOutput::ToolCall(tc) => {
                    conversation.push(Message::assistant(output.clone()));
                    let observation = self.observe(&tc.tool, tc.args).await;
                    conversation.push(Message::user(format!(
                        "Observation from {}: {}",
                        tc.tool, observation
                    )));
                }
                PlannerOutput::Response(answer) => {
                    send_event(&self.events, AgentEvent::StepChange { step: STEP_EXTRACT });
                    send_event(
                        &self.events,
                        AgentEvent::Finished {
                            agent: self.name.clone(),
                        },
                    );
                    let structured = self.structured_answer(&answer);
                    conversation.push(Message::assistant(answer));
                    self.persist(thread_id, &conversation);
                    return Ok(AgentOutput {
                        messages: conversation,
                        structured,
                    });
                }
            }
        }

        self.persist(thread_id, &conversation);
        Err(AgentError::StepLimitExceeded(self.max_steps).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::MockLlmClient;
    use crate::memory::Role;
    use crate::schemas::response_schema_for;
    use crate::tools::registry::test_support::StaticTool;
    use tokio::sync::mpsc;

    fn spec(llm: Arc<MockLlmClient>, store: Option<CheckpointStore>) -> ExecutorSpec {
        ExecutorSpec {
            llm,
            tools: vec![
                Arc::new(StaticTool::ok("brave_web_search", r#"[{"url": "https://a.example/x"}]"#)),
                Arc::new(StaticTool::err("simple_scrape_url", "403 Forbidden")),
            ],
            checkpointer: store,
            response_schema: None,
            events: None,
            name: "BASE".into(),
            max_steps: 5,
            tool_timeout_secs: 5,
        }
    }

    fn turn() -> Vec<Message> {
        vec![Message::system("research"), Message::user("price of electricity")]
    }

    #[tokio::test]
    async fn test_tool_loop_then_answer() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"tool": "brave_web_search", "args": {"query": "luz"}}"#,
            r#"{"tool": "simple_scrape_url", "args": {"url": "https://a.example/x"}}"#,
            "The price is 0.15 EUR/kWh",
        ]));
        let store = CheckpointStore::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut s = spec(llm.clone(), Some(store.clone()));
        s.events = Some(tx);
        let exec = ReactExecutorFactory.build(s).unwrap();

        let out = exec.invoke(turn(), "t1").await.unwrap();
        assert_eq!(out.final_text(), "The price is 0.15 EUR/kWh");
        assert!(out.structured.is_none());
        // system, user, 2 × (call, observation), answer
        assert_eq!(out.message_count(), 7);
        assert!(out.messages[3].content.starts_with("Observation from brave_web_search"));
        assert!(out.messages[5].content.contains("Error: Tool execution failed: 403 Forbidden"));
        assert_eq!(store.load("t1"), out.messages);
        assert_eq!(llm.call_count(), 3);

        let mut events = Vec::new();
        while let Ok(e) = rx.try_recv() {
            events.push(e);
        }
        assert_eq!(events[0], AgentEvent::StepChange { step: STEP_QUERY });
        assert!(events.contains(&AgentEvent::ToolError {
            tool: "simple_scrape_url".into(),
            error: "Tool execution failed: 403 Forbidden".into(),
        }));
        assert_eq!(events.last(), Some(&AgentEvent::Finished { agent: "BASE".into() }));
    }

    #[tokio::test]
    async fn test_history_is_loaded_for_thread() {
        let store = CheckpointStore::new();
        store.save("t1", vec![Message::user("earlier"), Message::assistant("earlier answer")]);
        let llm = Arc::new(MockLlmClient::with_replies(["done"]));
        let exec = ReactExecutor::new(spec(llm.clone(), Some(store.clone())));

        let out = exec.invoke(turn(), "t1").await.unwrap();
        assert_eq!(out.messages[0].content, "earlier");
        assert_eq!(out.message_count(), 5);

        // 请求首条为工具协议，其后是历史
        let request = &llm.calls()[0];
        assert_eq!(request[0].role, Role::System);
        assert!(request[0].content.contains("brave_web_search"));
        assert_eq!(request[1].content, "earlier");
    }

    #[tokio::test]
    async fn test_unknown_tool_becomes_observation() {
        let llm = Arc::new(MockLlmClient::with_replies([
            r#"{"tool": "calculator", "args": {}}"#,
            "gave up",
        ]));
        let exec = ReactExecutor::new(spec(llm, None));
        let out = exec.invoke(turn(), "t1").await.unwrap();
        assert!(out.messages[3].content.contains("Unknown tool: calculator"));
    }

    #[tokio::test]
    async fn test_llm_error_is_returned_raw() {
        let llm = Arc::new(MockLlmClient::new());
        llm.push_error("connection refused");
        let store = CheckpointStore::new();
        let exec = ReactExecutor::new(spec(llm, Some(store.clone())));
        assert_eq!(exec.invoke(turn(), "t1").await.unwrap_err(), "connection refused");
        assert_eq!(store.load("t1").len(), 2);
    }

    #[tokio::test]
    async fn test_step_limit() {
        let call = r#"{"tool": "brave_web_search", "args": {}}"#;
        let llm = Arc::new(MockLlmClient::with_replies(vec![call; 5]));
        let exec = ReactExecutor::new(spec(llm, None));
        let err = exec.invoke(turn(), "t1").await.unwrap_err();
        assert_eq!(err, "Step limit exceeded: 5");
    }

    #[tokio::test]
    async fn test_native_structured_answer() {
        let llm = Arc::new(MockLlmClient::with_replies([
            "```json\n{\"summary\": \"cheap\", \"urls\": [\"https://a.example/x\"]}\n```",
        ]));
        let mut s = spec(llm.clone(), None);
        s.response_schema = Some(response_schema_for("electricity"));
        let exec = ReactExecutor::new(s);
        let out = exec.invoke(turn(), "t1").await.unwrap();
        assert_eq!(out.structured.unwrap()["summary"], "cheap");
        assert!(llm.calls()[0][0].content.contains("ScraperResponse"));
    }

    #[tokio::test]
    async fn test_answer_not_matching_schema_is_not_structured() {
        let llm = Arc::new(MockLlmClient::with_replies([r#"{"unrelated": 1}"#]));
        let mut s = spec(llm, None);
        s.response_schema = Some(response_schema_for("salary"));
        let exec = ReactExecutor::new(s);
        let out = exec.invoke(turn(), "t1").await.unwrap();
        assert!(out.structured.is_none());
        assert_eq!(out.final_text(), r#"{"unrelated": 1}"#);
    }

    #[test]
    fn test_factory_rejects_zero_steps() {
        let mut s = spec(Arc::new(MockLlmClient::new()), None);
        s.max_steps = 0;
        assert!(ReactExecutorFactory.build(s).is_err());
    }
}
