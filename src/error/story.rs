//! 章节导航相关错误

/// 章节状态机错误类型
#[derive(Debug, thiserror::Error)]
pub enum StoryError {
    /// 章节的 nextChapter 形状无法识别
    #[error("章节 {chapter} 的 nextChapter 无法识别: {detail}")]
    InvalidTransition { chapter: String, detail: String },

    /// 章节不存在于章节图中
    #[error("未知章节: {0}")]
    UnknownChapter(String),
}

/// 故事定义文件错误
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    /// IO 错误
    #[error("读取故事定义失败: {0}")]
    Io(#[from] std::io::Error),

    /// JSON 格式错误
    #[error("故事定义格式错误: {0}")]
    Serde(#[from] serde_json::Error),

    /// 定义内容不一致
    #[error(transparent)]
    Story(#[from] StoryError),
}
