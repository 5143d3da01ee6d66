//! 会话记忆管理：持久（进程内检查点）与空实现
//!
//! clear_session 在持久实现中丢弃并重建整个存储；会话与控制器一一对应，不需要按 thread 选择性删除。

use crate::memory::{CheckpointStore, Message};

/// 会话记忆管理 trait
pub trait MemoryManager: Send + Sync {
    /// 执行器使用的检查点存储；空实现返回 None
    fn checkpointer(&self) -> Option<CheckpointStore>;

    /// 丢弃全部会话状态
    fn clear_session(&mut self, thread_id: &str);

    /// 累积的消息；不支持历史时返回 None
    fn history(&self, thread_id: &str) -> Option<Vec<Message>>;

    /// 生成新的会话 id（空实现同样可用）
    fn generate_thread_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// 是否启用（空实现返回 false）
    fn enabled(&self) -> bool {
        true
    }
}

/// 进程内实现，进程退出即丢失
#[derive(Debug, Default)]
pub struct InMemoryManager {
    store: CheckpointStore,
}

impl InMemoryManager {
    pub fn new() -> Self {
        tracing::info!("in-memory session store initialized");
        Self::default()
    }
}

impl MemoryManager for InMemoryManager {
    fn checkpointer(&self) -> Option<CheckpointStore> {
        Some(self.store.clone())
    }

    fn clear_session(&mut self, thread_id: &str) {
        self.store = CheckpointStore::new();
        let short: String = thread_id.chars().take(8).collect();
        tracing::info!(thread = %short, "session cleared (new checkpoint store)");
    }

    fn history(&self, thread_id: &str) -> Option<Vec<Message>> {
        Some(self.store.load(thread_id))
    }
}

/// 空实现：不需要持久对话的 Agent
#[derive(Debug, Clone, Default)]
pub struct NullMemoryManager;

impl MemoryManager for NullMemoryManager {
    fn checkpointer(&self) -> Option<CheckpointStore> {
        None
    }

    fn clear_session(&mut self, _thread_id: &str) {}

    fn history(&self, _thread_id: &str) -> Option<Vec<Message>> {
        None
    }

    fn enabled(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_session_recreates_store() {
        let mut manager = InMemoryManager::new();
        let old = manager.checkpointer().unwrap();
        old.save("t", vec![Message::user("q")]);

        manager.clear_session("t");
        let new = manager.checkpointer().unwrap();

        assert!(!new.same_store(&old));
        assert_eq!(manager.history("t"), Some(vec![]));
    }

    #[test]
    fn test_history_reads_store() {
        let manager = InMemoryManager::new();
        manager
            .checkpointer()
            .unwrap()
            .save("t", vec![Message::user("q"), Message::assistant("a")]);
        assert_eq!(manager.history("t").map(|h| h.len()), Some(2));
        assert_eq!(manager.history("missing"), Some(vec![]));
    }

    #[test]
    fn test_generate_thread_id_unique() {
        let manager = InMemoryManager::new();
        let a = manager.generate_thread_id();
        let b = manager.generate_thread_id();
        assert_ne!(a, b);
        assert!(a.len() > 10);
    }

    #[test]
    fn test_null_manager() {
        let mut manager = NullMemoryManager;
        assert!(manager.checkpointer().is_none());
        assert!(manager.history("any").is_none());
        manager.clear_session("any");
        assert!(!manager.enabled());
        assert!(manager.generate_thread_id().len() > 10);
    }
}
