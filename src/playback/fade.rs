use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::engine::Shared;

/// 设备音量的安全范围
pub fn clamp_volume(volume: f32) -> f32 {
    if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeOutcome {
    Completed,
    /// 被新的淡入淡出或会话销毁取代；不是错误
    Cancelled,
}

/// 淡变目标：朝静音走的淡出不会被普通的 set_volume 打断
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FadeKind {
    Volume,
    Silence,
}

/// 固定步数的线性音量斜坡
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRamp {
    from: f32,
    to: f32,
    steps: u32,
    delta: f32,
    step: Duration,
}

impl FadeRamp {
    pub fn new(from: f32, to: f32, duration_ms: u64, step_ms: u64) -> Self {
        let step_ms = step_ms.max(1);
        let steps = u32::try_from((duration_ms / step_ms).max(1)).unwrap_or(u32::MAX);
        Self {
            from,
            to,
            steps,
            delta: (to - from) / steps as f32,
            step: Duration::from_millis(step_ms),
        }
    }

    /// 已在目标音量，无需调度任何步
    pub fn is_noop(&self) -> bool {
        self.delta == 0.0
    }

    pub fn steps(&self) -> u32 {
        self.steps
    }

    pub fn delta(&self) -> f32 {
        self.delta
    }

    /// 第 `step` 步（从 1 开始）应用到设备上的音量；最后一步精确落在目标上
    pub fn volume_at(&self, step: u32) -> f32 {
        if step >= self.steps {
            clamp_volume(self.to)
        } else {
            clamp_volume(self.from + self.delta * step as f32)
        }
    }
}

/// 已登记到会话、尚未开始执行的淡变
pub(super) struct FadePlan {
    pub(super) id: u64,
    pub(super) ramp: FadeRamp,
    pub(super) token: CancellationToken,
}

/// 逐步驱动音量。每一步在持锁后再检查一次取消，避免与新淡变交错写音量。
pub(super) async fn drive(shared: &Shared, plan: FadePlan) -> FadeOutcome {
    let FadePlan { id, ramp, token } = plan;
    if ramp.is_noop() {
        shared.inner.lock().await.finish_fade(id);
        return FadeOutcome::Completed;
    }

    tracing::debug!(
        fade_id = id,
        from = ramp.from,
        to = ramp.to,
        steps = ramp.steps,
        "fade start"
    );
    for i in 1..=ramp.steps {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                tracing::debug!(fade_id = id, step = i, "fade cancelled");
                return FadeOutcome::Cancelled;
            }
            _ = tokio::time::sleep(ramp.step) => {}
        }

        let mut inner = shared.inner.lock().await;
        if token.is_cancelled() {
            tracing::debug!(fade_id = id, step = i, "fade cancelled");
            return FadeOutcome::Cancelled;
        }
        let Some(device) = inner.device.as_mut() else {
            return FadeOutcome::Cancelled;
        };
        device.set_volume(ramp.volume_at(i));
        if i == ramp.steps {
            inner.finish_fade(id);
        }
    }
    FadeOutcome::Completed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ramp_steps_and_delta() {
        let ramp = FadeRamp::new(0.0, 1.0, 1000, 100);
        assert_eq!(ramp.steps(), 10);
        assert!((ramp.delta() - 0.1).abs() < 1e-6);
        assert!((ramp.volume_at(5) - 0.5).abs() < 1e-6);
        assert_eq!(ramp.volume_at(10), 1.0);
    }

    #[test]
    fn test_short_duration_still_has_one_step() {
        let ramp = FadeRamp::new(1.0, 0.0, 30, 100);
        assert_eq!(ramp.steps(), 1);
        assert_eq!(ramp.volume_at(1), 0.0);
    }

    #[test]
    fn test_noop_when_already_at_target() {
        assert!(FadeRamp::new(0.4, 0.4, 2000, 100).is_noop());
        assert!(!FadeRamp::new(0.4, 0.5, 2000, 100).is_noop());
    }

    #[test]
    fn test_samples_are_clamped() {
        // 目标越界（未钳制的 target_volume）时每一步仍在 [0, 1]
        let ramp = FadeRamp::new(0.8, 1.5, 1000, 100);
        for i in 1..=ramp.steps() {
            let v = ramp.volume_at(i);
            assert!((0.0..=1.0).contains(&v), "step {i}: {v}");
        }
        assert_eq!(ramp.volume_at(ramp.steps()), 1.0);
        assert_eq!(clamp_volume(f32::NAN), 0.0);
        assert_eq!(clamp_volume(-0.2), 0.0);
    }
}
