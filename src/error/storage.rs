//! 持久化存储相关错误

/// 存储不可用（读写失败）
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(#[from] std::io::Error),

    /// 序列化错误
    #[error("JSON 序列化失败: {0}")]
    Serde(#[from] serde_json::Error),

    /// 存储后端不可用
    #[error("存储不可用: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_storage_error_display() {
        let err = StorageError::Unavailable("lock poisoned".to_owned());
        assert_eq!(err.to_string(), "存储不可用: lock poisoned");
    }

    #[test]
    fn test_from_io_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = StorageError::from(io_err);
        assert!(err.to_string().contains("access denied"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_serde_error() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{invalid}").unwrap_err();
        assert!(matches!(StorageError::from(serde_err), StorageError::Serde(_)));
    }
}
