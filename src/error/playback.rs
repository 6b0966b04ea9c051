//! 播放引擎相关错误

use super::DeviceError;

/// 播放会话错误类型
#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    /// 未成功 open 就调用了传输操作
    #[error("尚未打开音源")]
    NoSourceOpen,

    /// 会话已销毁
    #[error("播放会话已销毁")]
    SessionDestroyed,

    /// 同一会话重复 open
    #[error("会话已绑定音源: {track_id}")]
    AlreadyOpen { track_id: String },

    /// 设备错误
    #[error("音频设备错误: {0}")]
    Device(#[from] DeviceError),
}

impl PlaybackError {
    /// 调用方的使用错误（而非运行时故障）
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            PlaybackError::NoSourceOpen
                | PlaybackError::SessionDestroyed
                | PlaybackError::AlreadyOpen { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playback_error_display() {
        assert_eq!(PlaybackError::NoSourceOpen.to_string(), "尚未打开音源");
        let err = PlaybackError::AlreadyOpen {
            track_id: "stop-7".to_owned(),
        };
        assert!(err.to_string().contains("stop-7"));
    }

    #[test]
    fn test_is_usage_error() {
        assert!(PlaybackError::NoSourceOpen.is_usage_error());
        assert!(PlaybackError::SessionDestroyed.is_usage_error());
        let device = PlaybackError::from(DeviceError::NotLoaded);
        assert!(!device.is_usage_error());
        assert!(matches!(device, PlaybackError::Device(DeviceError::NotLoaded)));
    }
}
