//! 运行控制器的阶段定义
//!
//! uninitialized → initializing → ready → running → (retrying | success | partial | error)。
//! 阶段只用于日志与事件观察，不参与控制流判断。

use serde::Serialize;

/// 控制器阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentPhase {
    Uninitialized,
    Initializing,
    Ready,
    Running,
    Retrying,
    Success,
    Partial,
    Error,
}

impl Default for AgentPhase {
    fn default() -> Self {
        Self::Uninitialized
    }
}
