use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

use super::device::AudioDevice;
use crate::error::DeviceError;

#[derive(Debug)]
struct NullState {
    source: Option<String>,
    duration: Option<Duration>,
    offset: Duration,
    started_at: Option<Instant>,
    volume: f32,
    peak_volume: f32,
    reject_play: Option<String>,
    released: bool,
    play_calls: usize,
}

/// 不出声的设备：用 tokio 时钟模拟播放进度。
///
/// Clone 共享同一状态，测试可以保留一份作为探针检查音量和位置。
#[derive(Debug, Clone)]
pub struct NullDevice {
    state: Arc<Mutex<NullState>>,
}

impl NullDevice {
    /// `duration` 为 None 时模拟时长元数据缺失
    pub fn new(duration: Option<Duration>) -> Self {
        Self {
            state: Arc::new(Mutex::new(NullState {
                source: None,
                duration,
                offset: Duration::ZERO,
                started_at: None,
                volume: 1.0,
                peak_volume: 0.0,
                reject_play: None,
                released: false,
                play_calls: 0,
            })),
        }
    }

    pub fn with_duration_secs(secs: f64) -> Self {
        Self::new(Some(Duration::from_secs_f64(secs)))
    }

    fn lock(&self) -> MutexGuard<'_, NullState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 之后的 play 返回 Blocked（模拟自动播放限制）
    pub fn reject_play(&self, reason: &str) {
        self.lock().reject_play = Some(reason.to_owned());
    }

    /// play/load 以来设置过的最大音量
    pub fn peak_volume(&self) -> f32 {
        self.lock().peak_volume
    }

    pub fn reset_peak_volume(&self) {
        let mut s = self.lock();
        s.peak_volume = s.volume;
    }

    pub fn is_released(&self) -> bool {
        self.lock().released
    }

    pub fn play_calls(&self) -> usize {
        self.lock().play_calls
    }

    pub fn source(&self) -> Option<String> {
        self.lock().source.clone()
    }
}

impl NullState {
    fn position(&self) -> Duration {
        let elapsed = self
            .started_at
            .map(|at| Instant::now().saturating_duration_since(at))
            .unwrap_or_default();
        let pos = self.offset + elapsed;
        match self.duration {
            Some(total) => pos.min(total),
            None => pos,
        }
    }

    fn freeze(&mut self) {
        self.offset = self.position();
        self.started_at = None;
    }
}

impl AudioDevice for NullDevice {
    fn load(&mut self, source_uri: &str) -> Result<(), DeviceError> {
        let mut s = self.lock();
        s.source = Some(source_uri.to_owned());
        s.offset = Duration::ZERO;
        s.started_at = None;
        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        let mut s = self.lock();
        if s.source.is_none() {
            return Err(DeviceError::NotLoaded);
        }
        if let Some(reason) = s.reject_play.clone() {
            return Err(DeviceError::Blocked(reason));
        }
        s.play_calls += 1;
        if s.started_at.is_none() {
            s.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn pause(&mut self) {
        self.lock().freeze();
    }

    fn seek(&mut self, position: Duration) -> Result<(), DeviceError> {
        let mut s = self.lock();
        if s.source.is_none() {
            return Err(DeviceError::NotLoaded);
        }
        let position = match s.duration {
            Some(total) => position.min(total),
            None => position,
        };
        s.offset = position;
        if s.started_at.is_some() {
            s.started_at = Some(Instant::now());
        }
        Ok(())
    }

    fn set_volume(&mut self, volume: f32) {
        let mut s = self.lock();
        s.volume = volume;
        s.peak_volume = s.peak_volume.max(volume);
    }

    fn volume(&self) -> f32 {
        self.lock().volume
    }

    fn position(&self) -> Duration {
        self.lock().position()
    }

    fn duration(&self) -> Option<Duration> {
        self.lock().duration
    }

    fn is_paused(&self) -> bool {
        self.lock().started_at.is_none()
    }

    fn is_finished(&self) -> bool {
        let s = self.lock();
        match (s.source.as_ref(), s.duration) {
            (Some(_), Some(total)) => s.position() >= total,
            _ => false,
        }
    }

    fn release(&mut self) {
        let mut s = self.lock();
        s.freeze();
        s.source = None;
        s.released = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_clock_advances_only_while_playing() {
        let mut dev = NullDevice::with_duration_secs(10.0);
        dev.load("tour://hall").expect("load");
        assert!(dev.is_paused());

        dev.play().expect("play");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(dev.position(), Duration::from_secs(3));

        dev.pause();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(dev.position(), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_finishes_at_duration() {
        let mut dev = NullDevice::with_duration_secs(2.0);
        dev.load("tour://hall").expect("load");
        dev.play().expect("play");
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(dev.is_finished());
        assert_eq!(dev.position(), Duration::from_secs(2));

        dev.seek(Duration::ZERO).expect("seek");
        assert!(!dev.is_finished());
    }

    #[test]
    fn test_play_requires_source_and_can_be_blocked() {
        let mut dev = NullDevice::new(None);
        assert!(matches!(dev.play(), Err(DeviceError::NotLoaded)));

        dev.load("tour://hall").expect("load");
        dev.reject_play("autoplay");
        assert!(matches!(dev.play(), Err(DeviceError::Blocked(_))));
    }
}
