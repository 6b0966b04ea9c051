use super::kv::KeyValueStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// 以 `story-{id}-` 为命名空间的故事状态存储
#[derive(Clone)]
pub struct StoryStore {
    store: Arc<dyn KeyValueStore>,
    namespace: String,
}

impl StoryStore {
    pub fn new(store: Arc<dyn KeyValueStore>, story_id: &str) -> Self {
        Self {
            store,
            namespace: format!("story-{story_id}-"),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{key}", self.namespace)
    }

    /// 读取并校验；读取失败、反序列化失败或校验不通过都视为不存在
    pub fn get<T, F>(&self, key: &str, validator: F) -> Option<T>
    where
        T: DeserializeOwned,
        F: Fn(&T) -> bool,
    {
        let full_key = self.full_key(key);
        let value = match self.store.get(&full_key) {
            Ok(v) => v?,
            Err(e) => {
                tracing::warn!(key = %full_key, err = %e, "读取故事状态失败");
                return None;
            }
        };
        match serde_json::from_value::<T>(value) {
            Ok(parsed) if validator(&parsed) => Some(parsed),
            Ok(_) => {
                tracing::warn!(key = %full_key, "故事状态未通过校验，忽略");
                None
            }
            Err(e) => {
                tracing::warn!(key = %full_key, err = %e, "故事状态格式错误，忽略");
                None
            }
        }
    }

    /// 写入完整值；失败只记日志，返回是否成功
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> bool {
        let full_key = self.full_key(key);
        let result = serde_json::to_value(value)
            .map_err(crate::error::StorageError::from)
            .and_then(|v| self.store.set(&full_key, v));
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key = %full_key, err = %e, "保存故事状态失败");
                false
            }
        }
    }

    /// 清空整个命名空间，返回删除数量
    pub fn clear_all(&self) -> usize {
        match self.store.clear_prefix(&self.namespace) {
            Ok(n) => n,
            Err(e) => {
                tracing::warn!(namespace = %self.namespace, err = %e, "清空故事状态失败");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use serde_json::{Value, json};

    #[test]
    fn test_get_applies_validator() {
        let store = Arc::new(MemoryStore::new());
        let stories = StoryStore::new(store, "museum");
        assert!(stories.set("state", &json!({"currentChapter": "intro"})));

        let ok: Option<Value> = stories.get("state", |v: &Value| v.get("currentChapter").is_some());
        assert!(ok.is_some());

        let rejected: Option<Value> = stories.get("state", |_: &Value| false);
        assert!(rejected.is_none());
    }

    #[test]
    fn test_clear_all_uses_namespace() {
        let store = Arc::new(MemoryStore::new());
        let museum = StoryStore::new(store.clone(), "museum");
        let garden = StoryStore::new(store.clone(), "garden");
        museum.set("state", &json!(1));
        garden.set("state", &json!(2));

        assert_eq!(museum.namespace(), "story-museum-");
        assert_eq!(museum.clear_all(), 1);
        assert_eq!(garden.get::<Value, _>("state", |_| true), Some(json!(2)));
    }
}
