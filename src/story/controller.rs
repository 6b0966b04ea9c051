use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::{broadcast, watch};

use super::graph::{NextChapter, Story, StoryState};
use crate::error::StoryError;
use crate::storage::{KeyValueStore, StoryStore};

const STATE_KEY: &str = "state";
const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Clone, PartialEq)]
pub enum StoryEvent {
    ChapterChanged { from: String, to: String },
    /// 到达终章；故事状态不变
    Ended { chapter: String },
    Reset,
}

/// `update_state` 的输入：浅合并一个对象，或对状态应用一个函数
pub enum StateUpdate {
    Merge(Map<String, Value>),
    Apply(Box<dyn FnOnce(StoryState) -> StoryState + Send>),
}

impl StateUpdate {
    pub fn apply<F>(f: F) -> Self
    where
        F: FnOnce(StoryState) -> StoryState + Send + 'static,
    {
        StateUpdate::Apply(Box::new(f))
    }
}

/// 章节导航状态机
pub struct StoryController {
    story: Arc<Story>,
    store: StoryStore,
    state_tx: watch::Sender<StoryState>,
    events_tx: broadcast::Sender<StoryEvent>,
}

impl StoryController {
    /// 优先恢复持久化的状态；不存在或未通过校验时静默回退到初始状态
    pub fn new(story: Story, store: Arc<dyn KeyValueStore>) -> Result<Self, StoryError> {
        story.validate()?;
        let store = StoryStore::new(store, story.id());
        let persisted = load_persisted(&story, &store);
        let state = match persisted {
            Some(state) => {
                tracing::info!(story = story.id(), chapter = %state.current_chapter, "恢复故事进度");
                state
            }
            None => story.initial_state().clone(),
        };
        let (state_tx, _) = watch::channel(state);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            story: Arc::new(story),
            store,
            state_tx,
            events_tx,
        })
    }

    pub fn story(&self) -> &Story {
        &self.story
    }

    pub fn state(&self) -> StoryState {
        self.state_tx.borrow().clone()
    }

    pub fn current_chapter(&self) -> String {
        self.state_tx.borrow().current_chapter.clone()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<StoryState> {
        self.state_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<StoryEvent> {
        self.events_tx.subscribe()
    }

    /// 先持久化再发布。写入失败只记日志。
    pub async fn set_state(&self, state: StoryState) -> Result<(), StoryError> {
        if !self.story.contains(&state.current_chapter) {
            return Err(StoryError::UnknownChapter(state.current_chapter));
        }
        self.store.set(STATE_KEY, &state);
        self.state_tx.send_replace(state);
        Ok(())
    }

    /// 以持久化的最新状态为基础（而不是内存缓存），并发调用时后写者胜出
    pub async fn update_state(&self, update: StateUpdate) -> Result<(), StoryError> {
        let base = load_persisted(&self.story, &self.store).unwrap_or_else(|| self.state());
        let next = match update {
            StateUpdate::Merge(partial) => {
                let mut state = base;
                state.merge(partial);
                state
            }
            StateUpdate::Apply(f) => f(base),
        };
        self.set_state(next).await
    }

    pub async fn set_chapter(&self, id: &str) -> Result<(), StoryError> {
        let id = id.to_owned();
        self.update_state(StateUpdate::apply(move |mut state| {
            state.current_chapter = id;
            state
        }))
        .await
    }

    pub async fn next_chapter(&self) -> Result<(), StoryError> {
        let state = self.state();
        let from = state.current_chapter.clone();
        let chapter = self
            .story
            .chapter(&from)
            .ok_or_else(|| StoryError::UnknownChapter(from.clone()))?;

        let to = match &chapter.next {
            NextChapter::End => {
                self.end_story(&from);
                return Ok(());
            }
            NextChapter::Fixed(id) => id.clone(),
            NextChapter::Resolve(resolve) => resolve(&state),
            NextChapter::ResolveAsync(resolve) => {
                let resolve = Arc::clone(resolve);
                resolve(state).await
            }
            NextChapter::Unrecognized(raw) => {
                return Err(StoryError::InvalidTransition {
                    chapter: from,
                    detail: raw.to_string(),
                });
            }
        };

        self.set_chapter(&to).await?;
        tracing::info!(story = self.story.id(), from = %from, to = %to, "章节切换");
        let _ = self.events_tx.send(StoryEvent::ChapterChanged { from, to });
        Ok(())
    }

    fn end_story(&self, chapter: &str) {
        tracing::info!(story = self.story.id(), chapter, "故事结束");
        let _ = self.events_tx.send(StoryEvent::Ended {
            chapter: chapter.to_owned(),
        });
    }

    /// 清空命名空间下的全部持久化数据并回到初始状态
    pub async fn reset_story(&self) -> Result<(), StoryError> {
        let removed = self.store.clear_all();
        tracing::info!(story = self.story.id(), removed, "重置故事");
        self.set_state(self.story.initial_state().clone()).await?;
        let _ = self.events_tx.send(StoryEvent::Reset);
        Ok(())
    }
}

fn load_persisted(story: &Story, store: &StoryStore) -> Option<StoryState> {
    store.get(STATE_KEY, |state: &StoryState| {
        story.contains(&state.current_chapter)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::story::Chapter;
    use serde_json::json;

    fn tour() -> Story {
        Story::new("tour", StoryState::new("intro"))
            .with_chapter("intro", Chapter::new(NextChapter::fixed("hall")))
            .with_chapter("hall", Chapter::new(NextChapter::End))
    }

    #[tokio::test]
    async fn test_corrupt_persisted_state_falls_back_to_initial() {
        let store = Arc::new(MemoryStore::new());
        store
            .set("story-tour-state", json!({"currentChapter": "deleted-chapter"}))
            .expect("set");

        let ctl = StoryController::new(tour(), store).expect("controller");
        assert_eq!(ctl.current_chapter(), "intro");
    }

    #[tokio::test]
    async fn test_update_state_reads_persisted_base() {
        let store = Arc::new(MemoryStore::new());
        let ctl = StoryController::new(tour(), store.clone()).expect("controller");

        // 绕过控制器直接写入存储，模拟外部变更
        store
            .set("story-tour-state", json!({"currentChapter": "hall", "lamp": "on"}))
            .expect("set");

        let Value::Object(partial) = json!({"door": "open"}) else {
            unreachable!()
        };
        ctl.update_state(StateUpdate::Merge(partial)).await.expect("update");

        let state = ctl.state();
        assert_eq!(state.current_chapter, "hall");
        assert_eq!(state.get("lamp"), Some(&json!("on")));
        assert_eq!(state.get("door"), Some(&json!("open")));
    }

    #[tokio::test]
    async fn test_set_chapter_rejects_unknown_id() {
        let ctl = StoryController::new(tour(), Arc::new(MemoryStore::new())).expect("controller");
        let err = ctl.set_chapter("attic").await.unwrap_err();
        assert!(matches!(err, StoryError::UnknownChapter(id) if id == "attic"));
        assert_eq!(ctl.current_chapter(), "intro");
    }
}
