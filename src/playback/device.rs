use crate::error::DeviceError;
use std::time::Duration;

/// 会话独占的音频输出句柄。
///
/// open 时绑定音源，destroy 时释放；不会在会话之间共享。
pub trait AudioDevice: Send + Sync {
    /// 绑定音源并停在开头（暂停态）
    fn load(&mut self, source_uri: &str) -> Result<(), DeviceError>;

    fn play(&mut self) -> Result<(), DeviceError>;

    fn pause(&mut self);

    /// 已播放到结尾的音源需要能 seek 回去重新播放
    fn seek(&mut self, position: Duration) -> Result<(), DeviceError>;

    fn set_volume(&mut self, volume: f32);

    fn volume(&self) -> f32;

    fn position(&self) -> Duration;

    fn duration(&self) -> Option<Duration>;

    fn is_paused(&self) -> bool;

    /// 音源已自然播放完毕
    fn is_finished(&self) -> bool;

    /// 停止输出并释放底层资源
    fn release(&mut self);
}
