//! 记忆层：对话消息、会话检查点存储、记忆管理器

pub mod checkpoint;
pub mod conversation;
pub mod manager;

pub use checkpoint::CheckpointStore;
pub use conversation::{last_assistant_content, Message, Role};
pub use manager::{InMemoryManager, MemoryManager, NullMemoryManager};
