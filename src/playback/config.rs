use serde::{Deserialize, Serialize};

/// 会话创建时固定的播放配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackConfig {
    /// 按曲目持久化播放进度
    #[serde(default)]
    pub auto_save: bool,
    /// 播放结束后自动从头重播
    #[serde(default, rename = "loop")]
    pub loop_playback: bool,
    #[serde(default)]
    pub fade_in: bool,
    /// 暂停/停止时淡出，并在曲目剩余时间进入淡出窗口时自动停止
    #[serde(default)]
    pub fade_out: bool,
    #[serde(default = "default_fade_duration_ms")]
    pub fade_duration_ms: u64,
    /// 自然播放结束后保留设备（否则会话自行销毁）
    #[serde(default)]
    pub keep_device_after_end: bool,
    #[serde(default = "default_initial_volume")]
    pub initial_volume: f32,

    // 调参项
    #[serde(default = "default_fade_step_ms")]
    pub fade_step_ms: u64,
    #[serde(default = "default_sample_interval_ms")]
    pub sample_interval_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            auto_save: false,
            loop_playback: false,
            fade_in: false,
            fade_out: false,
            fade_duration_ms: default_fade_duration_ms(),
            keep_device_after_end: false,
            initial_volume: default_initial_volume(),
            fade_step_ms: default_fade_step_ms(),
            sample_interval_ms: default_sample_interval_ms(),
        }
    }
}

impl PlaybackConfig {
    /// 淡出窗口（秒）
    pub fn fade_window_secs(&self) -> f64 {
        self.fade_duration_ms as f64 / 1000.0
    }
}

// 默认值函数（用于 serde default）
fn default_fade_duration_ms() -> u64 { 2000 }
fn default_initial_volume() -> f32 { 1.0 }
fn default_fade_step_ms() -> u64 { 100 }
fn default_sample_interval_ms() -> u64 { 100 }
