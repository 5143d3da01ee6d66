//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SCOUT__*` 覆盖（双下划线表示嵌套，如 `SCOUT__LLM__MODEL=gpt-4o`）。

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub llm: LlmSection,
    pub agent: AgentSection,
    pub tools: ToolsSection,
    pub rate_limit: RateLimitSection,
    pub domains: DomainsSection,
}

/// [llm] 段：OpenAI 兼容后端
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai / mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    /// 兼容 LiteLLM 等代理；为空时用官方地址
    pub base_url: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_request_timeout")]
    pub timeout_secs: u64,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_temperature() -> f32 {
    0.1
}

fn default_max_tokens() -> u32 {
    15000
}

fn default_request_timeout() -> u64 {
    120
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            timeout_secs: default_request_timeout(),
        }
    }
}

/// [agent] 段：运行控制器行为
#[derive(Debug, Clone, Deserialize)]
pub struct AgentSection {
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_true")]
    pub use_memory: bool,
    #[serde(default = "default_true")]
    pub use_mcp: bool,
    /// 去掉本地 simple_scrape_url，只用远程工具
    #[serde(default)]
    pub disable_simple_scrape: bool,
    /// 旧式后处理结构化（按产品推断 schema，需要第二次模型调用）
    #[serde(default)]
    pub structured_output: bool,
    #[serde(default = "default_agent_name")]
    pub name: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
}

fn default_max_retries() -> usize {
    3
}

fn default_true() -> bool {
    true
}

fn default_agent_name() -> String {
    "BASE".to_string()
}

fn default_max_steps() -> usize {
    25
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            use_memory: true,
            use_mcp: true,
            disable_simple_scrape: false,
            structured_output: false,
            name: default_agent_name(),
            max_steps: default_max_steps(),
        }
    }
}

/// [tools] 段：工具超时、抓取限制、远程工具服务器、受限流保护的工具
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
    #[serde(default)]
    pub scrape: ScrapeSection,
    #[serde(default = "default_servers")]
    pub servers: Vec<ToolServerConfig>,
    /// 走全局限流器的工具名
    #[serde(default = "default_rate_limited")]
    pub rate_limited: Vec<String>,
}

fn default_tool_timeout_secs() -> u64 {
    60
}

fn default_rate_limited() -> Vec<String> {
    vec!["brave_web_search".into()]
}

fn default_servers() -> Vec<ToolServerConfig> {
    vec![
        ToolServerConfig {
            name: "brave-search".into(),
            url: "http://localhost:8082/mcp".into(),
            headers: HashMap::new(),
        },
        ToolServerConfig {
            name: "playwright".into(),
            url: "http://localhost:8931/mcp".into(),
            headers: HashMap::new(),
        },
    ]
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
            scrape: ScrapeSection::default(),
            servers: default_servers(),
            rate_limited: default_rate_limited(),
        }
    }
}

/// [tools.scrape] 段：simple_scrape_url 的超时与截断长度
#[derive(Debug, Clone, Deserialize)]
pub struct ScrapeSection {
    #[serde(default = "default_scrape_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
}

fn default_scrape_timeout_secs() -> u64 {
    30
}

fn default_max_chars() -> usize {
    10000
}

impl Default for ScrapeSection {
    fn default() -> Self {
        Self {
            timeout_secs: default_scrape_timeout_secs(),
            max_chars: default_max_chars(),
        }
    }
}

/// [[tools.servers]]：一个 streamable HTTP 工具服务器
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ToolServerConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// [rate_limit] 段
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitSection {
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
}

fn default_requests_per_second() -> f64 {
    1.0
}

fn default_backoff_base_ms() -> u64 {
    2000
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            requests_per_second: default_requests_per_second(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
        }
    }
}

/// [domains] 段：领域描述文件根目录（每个子目录一个 config.json）
#[derive(Debug, Clone, Deserialize)]
pub struct DomainsSection {
    #[serde(default = "default_domains_dir")]
    pub dir: PathBuf,
}

fn default_domains_dir() -> PathBuf {
    PathBuf::from("domains")
}

impl Default for DomainsSection {
    fn default() -> Self {
        Self {
            dir: default_domains_dir(),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SCOUT__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 SCOUT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("SCOUT")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}
