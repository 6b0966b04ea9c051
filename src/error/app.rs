//! 应用通用错误

use super::{DefinitionError, PlaybackError, StorageError, StoryError};

/// 应用通用错误类型
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 播放错误
    #[error("播放错误: {0}")]
    Playback(#[from] PlaybackError),

    /// 章节导航错误
    #[error("章节导航错误: {0}")]
    Story(#[from] StoryError),

    /// 故事定义错误
    #[error("{0}")]
    Definition(#[from] DefinitionError),

    /// 存储错误
    #[error("存储错误: {0}")]
    Storage(#[from] StorageError),

    /// 其他错误
    #[error("{0}")]
    Other(String),
}
