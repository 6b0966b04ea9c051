//! 统一错误处理模块
//!
//! 每个关注点一个错误类型，全部由 thiserror 派生 Display/Error。

mod app;
mod device;
mod playback;
mod storage;
mod story;

pub use app::AppError;
pub use device::DeviceError;
pub use playback::PlaybackError;
pub use storage::StorageError;
pub use story::{DefinitionError, StoryError};
