//! 会话检查点存储：thread_id → 累积消息
//!
//! 进程内实现，句柄可 Clone（共享同一份数据）。只支持整体丢弃，不支持按 thread 删除。

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::memory::Message;

/// 检查点存储句柄
#[derive(Clone, Default)]
pub struct CheckpointStore {
    threads: Arc<RwLock<HashMap<String, Vec<Message>>>>,
}

impl CheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 读取 thread 的全部消息；不存在时为空
    pub fn load(&self, thread_id: &str) -> Vec<Message> {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(thread_id)
            .cloned()
            .unwrap_or_default()
    }

    /// 覆盖写入 thread 的全部消息
    pub fn save(&self, thread_id: &str, messages: Vec<Message>) {
        self.threads
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(thread_id.to_string(), messages);
    }

    pub fn contains(&self, thread_id: &str) -> bool {
        self.threads
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(thread_id)
    }

    pub fn thread_count(&self) -> usize {
        self.threads.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 两个句柄是否指向同一份存储
    pub fn same_store(&self, other: &CheckpointStore) -> bool {
        Arc::ptr_eq(&self.threads, &other.threads)
    }
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("threads", &self.thread_count())
            .finish()
    }
}
