//! 执行层：Tool Call 解析、ReAct 执行器、prompt 渲染、输出抽取与解析、过程事件

pub mod events;
pub mod executor;
pub mod output;
pub mod parsing;
pub mod planner;
pub mod prompt;

pub use events::{spawn_log_sink, step_for_tool, AgentEvent, EventSender};
pub use executor::{AgentExecutor, AgentOutput, ExecutorFactory, ExecutorSpec, ReactExecutor, ReactExecutorFactory};
pub use output::{OutputParser, StructuredMode};
pub use parsing::{parse_agent_output, ParsedOutput};
pub use planner::{parse_llm_output, PlannerOutput, ToolCall};
pub use prompt::{render_system_prompt, render_user_message};
