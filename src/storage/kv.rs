use crate::error::StorageError;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// 字符串键到 JSON 值的持久化存储。
///
/// 实现必须可跨线程共享；写入需保证同一实例内按调用顺序生效。
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError>;

    fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// 删除所有以 `prefix` 开头的键，返回删除数量
    fn clear_prefix(&self, prefix: &str) -> Result<usize, StorageError>;
}

/// 进程内存储，用于 `--no-audio` 演示和测试
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn poisoned() -> StorageError {
    StorageError::Unavailable("存储锁已损坏".to_owned())
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self.entries.lock().map_err(|_| poisoned())?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.insert(key.to_owned(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        entries.remove(key);
        Ok(())
    }

    fn clear_prefix(&self, prefix: &str) -> Result<usize, StorageError> {
        let mut entries = self.entries.lock().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|k, _| !k.starts_with(prefix));
        Ok(before - entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_memory_store_set_get_delete() {
        let store = MemoryStore::new();
        assert!(store.is_empty());

        store.set("progress-a", json!(12.5)).expect("set");
        assert_eq!(store.get("progress-a").expect("get"), Some(json!(12.5)));

        store.delete("progress-a").expect("delete");
        assert_eq!(store.get("progress-a").expect("get"), None);
    }

    #[test]
    fn test_clear_prefix_only_touches_namespace() {
        let store = MemoryStore::new();
        store.set("story-museum-state", json!({})).expect("set");
        store.set("story-museum-seen", json!([])).expect("set");
        store.set("story-garden-state", json!({})).expect("set");

        let removed = store.clear_prefix("story-museum-").expect("clear");
        assert_eq!(removed, 2);
        assert_eq!(store.len(), 1);
        assert!(store.get("story-garden-state").expect("get").is_some());
    }
}
