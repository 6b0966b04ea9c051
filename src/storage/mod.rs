//! 持久化层：键值存储抽象及其上的播放进度 / 故事状态封装。

mod file;
mod kv;
mod position;
mod story;

pub use file::JsonFileStore;
pub use kv::{KeyValueStore, MemoryStore};
pub use position::PositionStore;
pub use story::StoryStore;
