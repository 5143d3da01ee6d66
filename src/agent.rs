//! 调研 Agent 运行控制器
//!
//! 生命周期：uninitialized → initializing → ready → running → (retrying | success | partial | error)。
//! initialize 幂等，run 首次调用时自动触发；每次尝试都重新渲染 system + user 消息。
//!
//! 错误按分类表处理：
//! - 可恢复的网络错误（抛出的错误文本，或成功输出文本中出现）：还有次数时丢弃整个会话
//!   （新 id、新存储、同步重新初始化）并记录失败 URL 后重试；次数耗尽时，嵌在输出中的按 success 返回输出，
//!   抛出的按 error 返回。
//! - 无数据：立即返回 partial，不重试。
//! - 其余错误：立即返回 error。
//!
//! 初始化之后的任何失败都以 RunResult 返回；只有初始化失败会以 AgentError 传播。

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::core::recovery::{classify, extract_failed_url, is_recoverable, ErrorCategory, ErrorSource};
use crate::core::{AgentError, AgentPhase, RecoveryAction, RecoveryEngine};
use crate::domain::RunConfig;
use crate::llm::LlmClient;
use crate::memory::{CheckpointStore, MemoryManager, Message};
use crate::react::events::{send_event, AgentEvent, EventSender};
use crate::react::{
    render_system_prompt, render_user_message, AgentExecutor, AgentOutput, ExecutorFactory,
    ExecutorSpec, OutputParser, ParsedOutput,
};
use crate::tools::{Tool, ToolResolver};

/// 无数据时返回给调用方的说明
pub const NO_DATA_OUTPUT: &str =
    "Not enough data was found for this query. The web search returned no relevant results.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Partial,
    Error,
}

/// 一次 run 的结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResult {
    pub status: RunStatus,
    pub output: String,
    pub attempts: usize,
    pub thread_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages_count: Option<usize>,
    pub has_structured_output: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub structured_response: Option<Value>,
    /// 仅在没有结构化输出时填充
    #[serde(flatten)]
    pub parsed: ParsedOutput,
}

impl RunResult {
    fn terminal(status: RunStatus, output: String, attempts: usize, thread_id: &str) -> Self {
        Self {
            status,
            output,
            attempts,
            thread_id: thread_id.to_string(),
            messages_count: None,
            has_structured_output: false,
            structured_response: None,
            parsed: ParsedOutput::default(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}

/// 运行控制器；一个实例对应一个会话，不跨实例共享 thread id
pub struct ResearchAgent {
    llm: Arc<dyn LlmClient>,
    memory: Box<dyn MemoryManager>,
    checkpointer: Option<CheckpointStore>,
    resolver: ToolResolver,
    factory: Arc<dyn ExecutorFactory>,
    output_parser: OutputParser,
    recovery: RecoveryEngine,
    events: Option<EventSender>,
    name: String,
    max_steps: usize,
    tool_timeout_secs: u64,
    thread_id: String,
    phase: AgentPhase,
    tools: Vec<Arc<dyn Tool>>,
    executor: Option<Arc<dyn AgentExecutor>>,
}

fn short_id(id: &str) -> String {
    id.chars().take(8).collect()
}

impl ResearchAgent {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        llm: Arc<dyn LlmClient>,
        memory: Box<dyn MemoryManager>,
        resolver: ToolResolver,
        factory: Arc<dyn ExecutorFactory>,
        output_parser: OutputParser,
        events: Option<EventSender>,
        name: String,
        max_steps: usize,
        tool_timeout_secs: u64,
    ) -> Self {
        let checkpointer = memory.checkpointer();
        let thread_id = memory.generate_thread_id();
        Self {
            llm,
            memory,
            checkpointer,
            resolver,
            factory,
            output_parser,
            recovery: RecoveryEngine::new(),
            events,
            name,
            max_steps,
            tool_timeout_secs,
            thread_id,
            phase: AgentPhase::Uninitialized,
            tools: Vec::new(),
            executor: None,
        }
    }

    pub fn phase(&self) -> AgentPhase {
        self.phase
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    /// 指定会话 id（恢复之前的对话）；存储保留所有 thread 的状态
    pub fn set_thread_id(&mut self, thread_id: impl Into<String>) {
        self.thread_id = thread_id.into();
        tracing::info!(thread = %short_id(&self.thread_id), "thread id set");
    }

    pub fn is_initialized(&self) -> bool {
        self.executor.is_some()
    }

    /// 当前工具集名称
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.name().to_string()).collect()
    }

    /// 当前会话的消息历史；空记忆实现返回 None
    pub fn history(&self) -> Option<Vec<Message>> {
        self.memory.history(&self.thread_id)
    }

    /// 解析工具并构建执行器；已就绪时直接返回
    pub async fn initialize(&mut self) -> Result<(), AgentError> {
        if self.executor.is_some() {
            return Ok(());
        }
        self.phase = AgentPhase::Initializing;

        self.tools = self.resolver.resolve_tools().await;
        let spec = ExecutorSpec {
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            checkpointer: self.checkpointer.clone(),
            response_schema: self.output_parser.response_schema().cloned(),
            events: self.events.clone(),
            name: self.name.clone(),
            max_steps: self.max_steps,
            tool_timeout_secs: self.tool_timeout_secs,
        };
        let executor = self.factory.build(spec).map_err(|e| {
            self.phase = AgentPhase::Error;
            AgentError::ExecutorBuild(e)
        })?;
        self.executor = Some(executor);
        self.phase = AgentPhase::Ready;

        tracing::info!(
            agent = %self.name,
            tools = ?self.tool_names(),
            memory = if self.memory.enabled() { "on" } else { "off" },
            structured = self.output_parser.mode().as_str(),
            thread = %short_id(&self.thread_id),
            "agent initialized"
        );
        Ok(())
    }

    /// 释放远程工具连接与执行器；可重复调用
    pub async fn cleanup(&mut self) {
        self.resolver.cleanup().await;
        self.executor = None;
        self.tools.clear();
        self.phase = AgentPhase::Uninitialized;
    }

    /// 丢弃当前会话：清空存储、换新 thread id，执行器在下次使用前重建
    pub fn reset_memory(&mut self) {
        if self.memory.enabled() {
            self.memory.clear_session(&self.thread_id);
            self.checkpointer = self.memory.checkpointer();
        } else {
            tracing::debug!("memory disabled, only rotating thread id");
        }
        self.thread_id = self.memory.generate_thread_id();
        self.executor = None;
        if self.phase != AgentPhase::Uninitialized {
            self.phase = AgentPhase::Initializing;
        }
        send_event(
            &self.events,
            AgentEvent::MemoryReset {
                thread_id: self.thread_id.clone(),
            },
        );
        tracing::info!(thread = %short_id(&self.thread_id), "memory reset");
    }

    pub async fn run(&mut self, config: &RunConfig, max_retries: usize) -> Result<RunResult, AgentError> {
        self.run_with_cancel(config, max_retries, CancellationToken::new())
            .await
    }

    /// 取消时会话可能不一致，按可恢复错误的路径丢弃后返回 error
    pub async fn run_with_cancel(
        &mut self,
        config: &RunConfig,
        max_retries: usize,
        cancel: CancellationToken,
    ) -> Result<RunResult, AgentError> {
        self.initialize().await?;

        if let Some(id) = &config.thread_id {
            self.thread_id = id.clone();
        }

        let max_retries = max_retries.max(1);
        let mut failed_urls: Vec<String> = Vec::new();
        let mut last_error = String::new();

        for attempt in 0..max_retries {
            if let Err(e) = self.initialize().await {
                return Ok(self.finish(RunStatus::Error, e.to_string(), attempt + 1));
            }
            let Some(executor) = self.executor.clone() else {
                return Ok(self.finish(RunStatus::Error, "agent not initialized".into(), attempt + 1));
            };
            self.phase = AgentPhase::Running;

            let messages = vec![
                Message::system(render_system_prompt(config)),
                Message::user(render_user_message(config, &failed_urls)),
            ];
            let thread_id = self.thread_id.clone();
            tracing::info!(attempt = attempt + 1, max_retries, thread = %short_id(&thread_id), "run attempt");

            let invoked = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                r = executor.invoke(messages, &thread_id) => Some(r),
            };
            let Some(invoked) = invoked else {
                tracing::warn!(attempt = attempt + 1, "run cancelled, discarding session");
                self.reset_memory();
                return Ok(self.finish(RunStatus::Error, AgentError::Cancelled.to_string(), attempt + 1));
            };

            match invoked {
                Ok(result) => {
                    let output = result.final_text().to_string();
                    if is_recoverable(&output) {
                        last_error = output.clone();
                        if let Some(url) = extract_failed_url(&output) {
                            failed_urls.push(url);
                        }
                        let action = self.recovery.handle(
                            ErrorCategory::Recoverable,
                            ErrorSource::Output,
                            attempt,
                            max_retries,
                        );
                        if action == RecoveryAction::ResetAndRetry {
                            if let Err(e) = self.recover(attempt, max_retries, &output).await {
                                return Ok(self.finish(RunStatus::Error, e.to_string(), attempt + 1));
                            }
                            continue;
                        }
                        tracing::warn!(
                            attempts = attempt + 1,
                            "network error in output after final attempt, returning output as-is"
                        );
                    }
                    return Ok(self.complete(result, output, attempt + 1, config).await);
                }
                Err(error) => {
                    if let Some(url) = extract_failed_url(&error) {
                        failed_urls.push(url);
                    }
                    let category = classify(&error);
                    match self
                        .recovery
                        .handle(category, ErrorSource::Raised, attempt, max_retries)
                    {
                        RecoveryAction::ReturnPartial => {
                            tracing::warn!(error = %error, "search returned no results");
                            return Ok(self.finish(RunStatus::Partial, NO_DATA_OUTPUT.to_string(), attempt + 1));
                        }
                        RecoveryAction::ResetAndRetry => {
                            if let Err(e) = self.recover(attempt, max_retries, &error).await {
                                return Ok(self.finish(RunStatus::Error, e.to_string(), attempt + 1));
                            }
                            last_error = error;
                            continue;
                        }
                        RecoveryAction::ReturnOutput | RecoveryAction::Abort => {
                            tracing::error!(error = %error, category = ?category, "agent error, not retrying");
                            return Ok(self.finish(RunStatus::Error, error, attempt + 1));
                        }
                    }
                }
            }
        }

        tracing::error!(max_retries, "agent error: retries exhausted");
        Ok(self.finish(
            RunStatus::Error,
            format!("Error after {} attempts: {}", max_retries, last_error),
            max_retries,
        ))
    }

    async fn recover(&mut self, attempt: usize, max_retries: usize, reason: &str) -> Result<(), AgentError> {
        self.phase = AgentPhase::Retrying;
        tracing::warn!(
            attempt = attempt + 1,
            max_retries,
            reason = %reason.chars().take(200).collect::<String>(),
            "recoverable network error, resetting session and retrying"
        );
        send_event(
            &self.events,
            AgentEvent::Retry {
                attempt: attempt + 1,
                reason: reason.chars().take(200).collect(),
            },
        );
        self.reset_memory();
        self.initialize().await
    }

    fn finish(&mut self, status: RunStatus, output: String, attempts: usize) -> RunResult {
        self.phase = match status {
            RunStatus::Success => AgentPhase::Success,
            RunStatus::Partial => AgentPhase::Partial,
            RunStatus::Error => AgentPhase::Error,
        };
        RunResult::terminal(status, output, attempts, &self.thread_id)
    }

    /// 成功路径：结构化抽取与文本解析二选一
    async fn complete(
        &mut self,
        result: AgentOutput,
        output: String,
        attempts: usize,
        config: &RunConfig,
    ) -> RunResult {
        let structured = self
            .output_parser
            .extract_structured(&result, &output, self.llm.as_ref(), config)
            .await;
        let parsed = match structured {
            Some(_) => ParsedOutput::default(),
            None => self.output_parser.parse_text(&output),
        };
        let mut run = self.finish(RunStatus::Success, output, attempts);
        run.messages_count = Some(result.message_count());
        run.has_structured_output = structured.is_some();
        run.structured_response = structured;
        run.parsed = parsed;
        run
    }
}
