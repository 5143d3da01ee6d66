//! 工具层：Tool trait 与注册表、本地抓取工具、远程工具服务器（MCP）、错误翻译与限流装饰器、工具解析器

pub mod executor;
pub mod guard;
pub mod mcp;
pub mod registry;
pub mod resolver;
pub mod scrape;

pub use executor::ToolExecutor;
pub use guard::{translate_tool_error, ErrorTranslatingTool, RateLimitedTool, NO_RESULTS_MESSAGE};
pub use mcp::{McpClient, McpError, RemoteTool, ToolDiscovery};
pub use registry::{Tool, ToolRegistry};
pub use resolver::ToolResolver;
pub use scrape::{SimpleScrapeTool, SIMPLE_SCRAPE_TOOL};
