//! 音频输出设备相关错误

use std::path::PathBuf;

/// 设备层错误类型
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    /// 打开音频文件失败
    #[error("打开音频文件失败({}): {source}", .path.display())]
    OpenFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 解码音频失败
    #[error("解码音频失败({uri}): {message}")]
    Decode { uri: String, message: String },

    /// Seek 失败
    #[error("Seek 失败: {0}")]
    Seek(String),

    /// 设备尚未绑定音源
    #[error("设备尚未加载音源")]
    NotLoaded,

    /// 设备拒绝开始播放（例如自动播放限制）
    #[error("设备拒绝播放: {0}")]
    Blocked(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_file_error() {
        let err = DeviceError::OpenFile {
            path: PathBuf::from("/tmp/stop-01.mp3"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "文件未找到"),
        };
        let msg = err.to_string();
        assert!(msg.contains("stop-01.mp3"));
        assert!(msg.contains("文件未找到"));
    }

    #[test]
    fn test_blocked_display() {
        let err = DeviceError::Blocked("autoplay".to_owned());
        assert_eq!(err.to_string(), "设备拒绝播放: autoplay");
    }
}
