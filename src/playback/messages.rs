/// 播放状态；`Uninitialized` 只出现在第一次传输事件之前
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackStatus {
    #[default]
    Uninitialized,
    Playing,
    Paused,
    Ended,
}

/// 时间轴采样（秒）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Timeline {
    pub current_time: f64,
    /// 时长元数据可用前为 None
    pub total_time: Option<f64>,
}

impl Timeline {
    pub fn progress(&self) -> Option<f64> {
        match self.total_time {
            Some(total) if total > 0.0 => Some(self.current_time / total),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// stop 通知（显式 stop 或淡出窗口触发），每个会话最多一次
    Stopped,
    /// 曲目自然播放结束
    Ended { looped: bool },
    Destroyed,
    Error(String),
}

/// 外部传输控制（系统媒体控件等）可下发的命令
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransportCommand {
    Play,
    Pause,
    Stop,
    Back(f64),
    Forward(f64),
    SeekTo(f64),
}

/// 未指定时使用会话配置
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayOptions {
    pub fade_in: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PauseOptions {
    pub fade_out: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StopOptions {
    pub fade_out: Option<bool>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct VolumeOptions {
    pub fade: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DestroyOptions {
    /// 不等待进行中的淡出
    pub now: bool,
    pub fade_out: Option<bool>,
}
