//! Agent 错误类型与恢复动作
//!
//! 与 RecoveryEngine 配合：根据错误文本分类决定 ResetAndRetry / ReturnPartial / Abort 等。

use thiserror::Error;

/// Agent 运行过程中可能出现的错误（执行器构建、工具、步数上限、取消）
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("Tool execution failed: {0}")]
    ToolExecutionFailed(String),

    #[error("Tool timeout: {0}")]
    ToolTimeout(String),

    /// 底层 Agent 执行器构建失败（初始化阶段，允许向调用方传播）
    #[error("Executor build failed: {0}")]
    ExecutorBuild(String),

    #[error("Step limit exceeded: {0}")]
    StepLimitExceeded(usize),

    #[error("Cancelled")]
    Cancelled,
}

/// 恢复引擎根据错误分类给出的建议动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 丢弃整个会话（新 thread id、新存储、重新初始化）后重试
    ResetAndRetry,
    /// 无数据：直接返回 partial，不消耗重试
    ReturnPartial,
    /// 重试已耗尽但错误嵌在模型输出中：按原样返回输出
    ReturnOutput,
    /// 终止当前任务，返回 error
    Abort,
}
