//! 章节导航状态机：按章节图推进互动故事，每次变更后持久化完整状态。

mod controller;
mod definition;
mod graph;

pub use controller::{StateUpdate, StoryController, StoryEvent};
pub use definition::{ChapterDefinition, ResolverRegistry, StoryDefinition};
pub use graph::{AsyncResolver, Chapter, NextChapter, Story, StoryState, SyncResolver};
