//! 工具解析：本地工具 + 远程发现的工具
//!
//! 远程发现是尽力而为的：失败时记录警告，只用本地工具继续。
//! 每个远程工具挂上统一的错误翻译；名字在限流列表中的还会经过共享 RateLimiter。

use std::sync::Arc;

use crate::config::{AppConfig, ToolServerConfig};
use crate::core::RateLimiter;
use crate::tools::mcp::{McpClient, ToolDiscovery};
use crate::tools::{ErrorTranslatingTool, RateLimitedTool, SimpleScrapeTool, Tool, SIMPLE_SCRAPE_TOOL};

/// 工具解析器：每个运行控制器独占一个
pub struct ToolResolver {
    custom_tools: Option<Vec<Arc<dyn Tool>>>,
    excluded: Option<String>,
    use_remote: bool,
    servers: Vec<ToolServerConfig>,
    rate_limited: Vec<String>,
    limiter: Option<Arc<RateLimiter>>,
    discovery: Box<dyn ToolDiscovery>,
    connected: bool,
    scrape_timeout_secs: u64,
    scrape_max_chars: usize,
}

impl ToolResolver {
    pub fn new(servers: Vec<ToolServerConfig>, discovery: Box<dyn ToolDiscovery>) -> Self {
        Self {
            custom_tools: None,
            excluded: None,
            use_remote: true,
            servers,
            rate_limited: Vec::new(),
            limiter: None,
            discovery,
            connected: false,
            scrape_timeout_secs: 30,
            scrape_max_chars: 10000,
        }
    }

    /// 按应用配置构建：[agent] 的开关、[tools] 的服务器列表与限流工具名
    pub fn from_config(cfg: &AppConfig) -> Self {
        let mut resolver = Self::new(
            cfg.tools.servers.clone(),
            Box::new(McpClient::new(cfg.tools.tool_timeout_secs)),
        )
        .with_remote(cfg.agent.use_mcp);
        resolver.rate_limited = cfg.tools.rate_limited.clone();
        resolver.scrape_timeout_secs = cfg.tools.scrape.timeout_secs;
        resolver.scrape_max_chars = cfg.tools.scrape.max_chars;
        if cfg.agent.disable_simple_scrape {
            resolver = resolver.excluding(SIMPLE_SCRAPE_TOOL);
        }
        resolver
    }

    /// 替换默认本地工具（simple_scrape_url）
    pub fn with_local_tools(mut self, tools: Vec<Arc<dyn Tool>>) -> Self {
        self.custom_tools = Some(tools);
        self
    }

    /// 排除一个本地工具
    pub fn excluding(mut self, name: &str) -> Self {
        self.excluded = Some(name.to_string());
        self
    }

    pub fn with_remote(mut self, enabled: bool) -> Self {
        self.use_remote = enabled;
        self
    }

    /// 名字在 tools 中的远程工具走 limiter
    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>, tools: Vec<String>) -> Self {
        self.limiter = Some(limiter);
        self.rate_limited = tools;
        self
    }

    pub fn set_rate_limiter(&mut self, limiter: Arc<RateLimiter>) {
        self.limiter = Some(limiter);
    }

    fn local_tools(&self) -> Vec<Arc<dyn Tool>> {
        let tools: Vec<Arc<dyn Tool>> = match &self.custom_tools {
            Some(custom) => custom.clone(),
            None => vec![Arc::new(SimpleScrapeTool::new(
                self.scrape_timeout_secs,
                self.scrape_max_chars,
            ))],
        };
        match &self.excluded {
            Some(name) => tools.into_iter().filter(|t| t.name() != name).collect(),
            None => tools,
        }
    }

    fn wrap_remote(&self, tool: Arc<dyn Tool>) -> Arc<dyn Tool> {
        let tool = match &self.limiter {
            Some(limiter) if self.rate_limited.iter().any(|n| n == tool.name()) => {
                Arc::new(RateLimitedTool::new(tool, limiter.clone())) as Arc<dyn Tool>
            }
            _ => tool,
        };
        Arc::new(ErrorTranslatingTool::new(tool))
    }

    /// 本地工具 + 远程工具；重复调用会先释放上一次的远程连接
    pub async fn resolve_tools(&mut self) -> Vec<Arc<dyn Tool>> {
        let mut all = self.local_tools();
        if !self.use_remote || self.servers.is_empty() {
            return all;
        }

        if self.connected {
            self.cleanup().await;
        }
        match self.discovery.discover(&self.servers).await {
            Ok(remote) => {
                self.connected = true;
                let names: Vec<String> = remote.iter().map(|t| t.name().to_string()).collect();
                tracing::info!(tools = ?names, "remote tools loaded");
                all.extend(remote.into_iter().map(|t| self.wrap_remote(t)));
            }
            Err(e) => {
                // 部分连接可能已建立
                self.connected = true;
                tracing::warn!(error = %e, "remote tool discovery failed, continuing with local tools only");
            }
        }
        all
    }

    /// 释放远程连接；幂等，未解析过也可调用
    pub async fn cleanup(&mut self) {
        if !self.connected {
            return;
        }
        self.connected = false;
        if let Err(e) = self.discovery.close().await {
            tracing::debug!(error = %e, "error closing remote tool sessions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::test_support::StaticTool;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Clone, Default)]
    struct Counters {
        discovered: Arc<AtomicUsize>,
        closed: Arc<AtomicUsize>,
    }

    struct FakeDiscovery {
        fail: bool,
        counters: Counters,
    }

    #[async_trait]
    impl ToolDiscovery for FakeDiscovery {
        async fn discover(&mut self, _servers: &[ToolServerConfig]) -> Result<Vec<Arc<dyn Tool>>, String> {
            self.counters.discovered.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("connection refused".to_string());
            }
            Ok(vec![Arc::new(StaticTool::err("brave_web_search", "No web results found"))])
        }

        async fn close(&mut self) -> Result<(), String> {
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            Err("already closed".to_string())
        }
    }

    fn server() -> Vec<ToolServerConfig> {
        vec![ToolServerConfig {
            name: "brave".into(),
            url: "http://localhost:8082/mcp".into(),
            headers: Default::default(),
        }]
    }

    fn resolver(fail: bool, counters: &Counters) -> ToolResolver {
        ToolResolver::new(
            server(),
            Box::new(FakeDiscovery {
                fail,
                counters: counters.clone(),
            }),
        )
        .with_local_tools(vec![
            Arc::new(StaticTool::ok("simple_scrape_url", "page")),
            Arc::new(StaticTool::ok("local_extra", "x")),
        ])
    }

    #[tokio::test]
    async fn test_resolve_local_and_remote() {
        let counters = Counters::default();
        let mut r = resolver(false, &counters);
        let tools = r.resolve_tools().await;
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["simple_scrape_url", "local_extra", "brave_web_search"]);

        // 远程工具的错误被翻译成文本
        let out = tools[2].execute(serde_json::Value::Null).await.unwrap();
        assert!(out.contains("Try a different query"));
    }

    #[tokio::test]
    async fn test_discovery_failure_keeps_local_tools() {
        let counters = Counters::default();
        let mut r = resolver(true, &counters);
        let tools = r.resolve_tools().await;
        assert_eq!(tools.len(), 2);
    }

    #[tokio::test]
    async fn test_exclusion_and_remote_disabled() {
        let counters = Counters::default();
        let mut r = resolver(false, &counters)
            .excluding("simple_scrape_url")
            .with_remote(false);
        let tools = r.resolve_tools().await;
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["local_extra"]);
        assert_eq!(counters.discovered.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cleanup_idempotent_and_swallows_errors() {
        let counters = Counters::default();
        let mut r = resolver(false, &counters);
        r.cleanup().await;
        assert_eq!(counters.closed.load(Ordering::SeqCst), 0);

        r.resolve_tools().await;
        r.cleanup().await;
        r.cleanup().await;
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_re_resolve_closes_previous_sessions() {
        let counters = Counters::default();
        let mut r = resolver(false, &counters);
        r.resolve_tools().await;
        r.resolve_tools().await;
        assert_eq!(counters.discovered.load(Ordering::SeqCst), 2);
        assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    }
}
