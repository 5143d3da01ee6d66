//! 核心层：错误与恢复分类、控制器阶段、限流器、Agent 构建器

pub mod builder;
pub mod error;
pub mod rate_limiter;
pub mod recovery;
pub mod state;

pub use builder::AgentBuilder;
pub use error::{AgentError, RecoveryAction};
pub use rate_limiter::{is_rate_limit_error, RateLimiter};
pub use recovery::{
    classify, extract_failed_url, is_no_data, is_recoverable, ErrorCategory, ErrorSource,
    RecoveryEngine, CLASSIFICATION_TABLE,
};
pub use state::AgentPhase;
