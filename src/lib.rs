//! Scout - 联网调研智能体运行时
//!
//! 模块划分：
//! - **agent**: 运行控制器（重试 / 错误分类状态机、会话生命周期、结果组装）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误类型、分类表与恢复动作、阶段、限流器、构建器
//! - **domain**: 运行配置值类型、领域描述文件、国家查找表
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **memory**: 会话消息、检查点存储、记忆管理
//! - **react**: ReAct 执行器、prompt 渲染、输出抽取与解析、过程事件
//! - **schemas**: 结构化输出 schema
//! - **tools**: 本地与远程工具、错误翻译与限流装饰器、工具解析器

pub mod agent;
pub mod config;
pub mod core;
pub mod domain;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
pub mod schemas;
pub mod tools;

pub use agent::{ResearchAgent, RunResult, RunStatus};
pub use crate::core::{AgentBuilder, AgentError, RateLimiter};
pub use domain::RunConfig;
