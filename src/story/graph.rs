use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use crate::error::StoryError;

/// 故事状态：始终包含当前章节，其余字段由故事内容自由使用
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryState {
    pub current_chapter: String,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl StoryState {
    pub fn new(chapter: impl Into<String>) -> Self {
        Self {
            current_chapter: chapter.into(),
            data: Map::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.get(key)
    }

    /// 浅合并；`currentChapter` 键切换章节，其余键覆盖数据字段
    pub fn merge(&mut self, partial: Map<String, Value>) {
        for (key, value) in partial {
            if key == "currentChapter" {
                match value {
                    Value::String(id) => self.current_chapter = id,
                    other => {
                        tracing::warn!(value = %other, "currentChapter 不是字符串，忽略");
                    }
                }
            } else {
                self.data.insert(key, value);
            }
        }
    }
}

pub type SyncResolver = Arc<dyn Fn(&StoryState) -> String + Send + Sync>;
pub type AsyncResolver = Arc<dyn Fn(StoryState) -> BoxFuture<'static, String> + Send + Sync>;

/// 章节的后继规则
#[derive(Clone)]
pub enum NextChapter {
    /// 终章
    End,
    Fixed(String),
    Resolve(SyncResolver),
    ResolveAsync(AsyncResolver),
    /// 定义中出现了无法识别的形状，调用 next_chapter 时报错
    Unrecognized(Value),
}

impl NextChapter {
    pub fn fixed(id: impl Into<String>) -> Self {
        NextChapter::Fixed(id.into())
    }

    pub fn resolve_with<F>(f: F) -> Self
    where
        F: Fn(&StoryState) -> String + Send + Sync + 'static,
    {
        NextChapter::Resolve(Arc::new(f))
    }

    pub fn resolve_async<F, Fut>(f: F) -> Self
    where
        F: Fn(StoryState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        NextChapter::ResolveAsync(Arc::new(move |state| -> BoxFuture<'static, String> {
            Box::pin(f(state))
        }))
    }
}

impl fmt::Debug for NextChapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NextChapter::End => write!(f, "End"),
            NextChapter::Fixed(id) => f.debug_tuple("Fixed").field(id).finish(),
            NextChapter::Resolve(_) => write!(f, "Resolve(..)"),
            NextChapter::ResolveAsync(_) => write!(f, "ResolveAsync(..)"),
            NextChapter::Unrecognized(v) => f.debug_tuple("Unrecognized").field(v).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chapter {
    pub title: Option<String>,
    /// 章节对应的音频
    pub track: Option<String>,
    pub next: NextChapter,
}

impl Chapter {
    pub fn new(next: NextChapter) -> Self {
        Self {
            title: None,
            track: None,
            next,
        }
    }

    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_track(mut self, track: impl Into<String>) -> Self {
        self.track = Some(track.into());
        self
    }
}

/// 章节图与初始状态
#[derive(Debug, Clone)]
pub struct Story {
    id: String,
    initial_state: StoryState,
    chapters: HashMap<String, Chapter>,
}

impl Story {
    pub fn new(id: impl Into<String>, initial_state: StoryState) -> Self {
        Self {
            id: id.into(),
            initial_state,
            chapters: HashMap::new(),
        }
    }

    pub fn with_chapter(mut self, id: impl Into<String>, chapter: Chapter) -> Self {
        self.chapters.insert(id.into(), chapter);
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn initial_state(&self) -> &StoryState {
        &self.initial_state
    }

    pub fn chapter(&self, id: &str) -> Option<&Chapter> {
        self.chapters.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.chapters.contains_key(id)
    }

    pub fn chapter_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.chapters.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// 初始章节和所有固定后继都必须在章节图中
    pub fn validate(&self) -> Result<(), StoryError> {
        if !self.contains(&self.initial_state.current_chapter) {
            return Err(StoryError::UnknownChapter(
                self.initial_state.current_chapter.clone(),
            ));
        }
        for chapter in self.chapters.values() {
            if let NextChapter::Fixed(target) = &chapter.next
                && !self.contains(target)
            {
                return Err(StoryError::UnknownChapter(target.clone()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_state_serializes_current_chapter_alongside_data() {
        let state = StoryState::new("intro").with("visited", json!(["lobby"]));
        let v = serde_json::to_value(&state).expect("to_value");
        assert_eq!(v, json!({"currentChapter": "intro", "visited": ["lobby"]}));

        let back: StoryState = serde_json::from_value(v).expect("from_value");
        assert_eq!(back, state);
    }

    #[test]
    fn test_merge_switches_chapter_and_overwrites_data() {
        let mut state = StoryState::new("intro").with("score", json!(1));
        let partial = json!({"currentChapter": "hall", "score": 2, "key": true});
        let Value::Object(partial) = partial else {
            unreachable!()
        };
        state.merge(partial);
        assert_eq!(state.current_chapter, "hall");
        assert_eq!(state.get("score"), Some(&json!(2)));
        assert_eq!(state.get("key"), Some(&json!(true)));
    }

    #[test]
    fn test_validate_rejects_missing_initial_and_dangling_fixed() {
        let story = Story::new("s", StoryState::new("nowhere"))
            .with_chapter("intro", Chapter::new(NextChapter::End));
        assert!(matches!(story.validate(), Err(StoryError::UnknownChapter(id)) if id == "nowhere"));

        let story = Story::new("s", StoryState::new("intro"))
            .with_chapter("intro", Chapter::new(NextChapter::fixed("gone")));
        assert!(matches!(story.validate(), Err(StoryError::UnknownChapter(id)) if id == "gone"));
    }

    #[test]
    fn test_chapter_ids_sorted() {
        let story = Story::new("s", StoryState::new("b"))
            .with_chapter("b", Chapter::new(NextChapter::fixed("a")))
            .with_chapter("a", Chapter::new(NextChapter::End));
        assert_eq!(story.chapter_ids(), vec!["a", "b"]);
        assert!(story.validate().is_ok());
    }
}
