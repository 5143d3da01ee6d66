//! Agent 构建器：按 AppConfig 组装运行控制器
//!
//! 未显式注入的依赖按配置创建：LLM 客户端、会话记忆、工具解析器、进程级限流器、执行器工厂。
//! 同一进程内的多个控制器应共享同一个 RateLimiter（with_rate_limiter 传入同一个 Arc）。

use std::sync::Arc;

use crate::agent::ResearchAgent;
use crate::config::AppConfig;
use crate::core::RateLimiter;
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{InMemoryManager, MemoryManager, NullMemoryManager};
use crate::react::{EventSender, ExecutorFactory, OutputParser, ReactExecutorFactory};
use crate::schemas::ResponseSchema;
use crate::tools::ToolResolver;

pub struct AgentBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    resolver: Option<ToolResolver>,
    factory: Option<Arc<dyn ExecutorFactory>>,
    limiter: Option<Arc<RateLimiter>>,
    response_schema: Option<ResponseSchema>,
    events: Option<EventSender>,
}

impl AgentBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            resolver: None,
            factory: None,
            limiter: None,
            response_schema: None,
            events: None,
        }
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    /// 替换默认的工具解析器（本地抓取 + 配置中的远程服务器）
    pub fn with_tool_resolver(mut self, resolver: ToolResolver) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_executor_factory(mut self, factory: Arc<dyn ExecutorFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    /// 进程级共享的限流器
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// 原生结构化输出：执行器直接按 schema 给出最终结果
    pub fn with_response_schema(mut self, schema: ResponseSchema) -> Self {
        self.response_schema = Some(schema);
        self
    }

    pub fn with_events(mut self, events: EventSender) -> Self {
        self.events = Some(events);
        self
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn build(self) -> ResearchAgent {
        let cfg = self.config;
        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&cfg.llm));
        let memory: Box<dyn MemoryManager> = if cfg.agent.use_memory {
            Box::new(InMemoryManager::new())
        } else {
            Box::new(NullMemoryManager)
        };
        let limiter = self
            .limiter
            .unwrap_or_else(|| Arc::new(RateLimiter::from_config(&cfg.rate_limit)));
        let mut resolver = self.resolver.unwrap_or_else(|| ToolResolver::from_config(&cfg));
        resolver.set_rate_limiter(limiter);
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(ReactExecutorFactory));
        let output_parser = OutputParser::new(self.response_schema, cfg.agent.structured_output);

        ResearchAgent::from_parts(
            llm,
            memory,
            resolver,
            factory,
            output_parser,
            self.events,
            cfg.agent.name.clone(),
            cfg.agent.max_steps,
            cfg.tools.tool_timeout_secs,
        )
    }
}
