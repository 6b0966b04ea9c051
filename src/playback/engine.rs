use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::config::PlaybackConfig;
use super::device::AudioDevice;
use super::fade::{self, FadeKind, FadeOutcome, FadePlan, FadeRamp, clamp_volume};
use super::messages::{
    DestroyOptions, PauseOptions, PlayOptions, PlaybackEvent, PlaybackStatus, StopOptions,
    Timeline, TransportCommand, VolumeOptions,
};
use crate::error::PlaybackError;
use crate::storage::PositionStore;

/// 淡入起点音量
const NEAR_SILENT: f32 = 0.01;
const EVENT_CAPACITY: usize = 32;
pub const DEFAULT_SKIP_SECS: f64 = 10.0;

struct ActiveFade {
    id: u64,
    kind: FadeKind,
    token: CancellationToken,
}

pub(super) struct Inner {
    /// destroy 完成后为 None
    pub(super) device: Option<Box<dyn AudioDevice>>,
    track_id: Option<String>,
    source_uri: Option<String>,
    status: PlaybackStatus,
    timeline: Timeline,
    target_volume: f32,
    fade: Option<ActiveFade>,
    next_fade_id: u64,
    /// destroy 已开始；之后所有公开操作都按已销毁处理
    destroyed: bool,
}

impl Inner {
    fn is_open(&self) -> bool {
        self.source_uri.is_some()
    }

    fn cancel_fade(&mut self) {
        if let Some(fade) = self.fade.take() {
            tracing::debug!(fade_id = fade.id, "取消进行中的淡变");
            fade.token.cancel();
        }
    }

    fn begin_fade(&mut self, kind: FadeKind, session: &CancellationToken) -> (u64, CancellationToken) {
        self.cancel_fade();
        self.next_fade_id = self.next_fade_id.wrapping_add(1).max(1);
        let token = session.child_token();
        self.fade = Some(ActiveFade {
            id: self.next_fade_id,
            kind,
            token: token.clone(),
        });
        (self.next_fade_id, token)
    }

    pub(super) fn finish_fade(&mut self, id: u64) {
        if self.fade.as_ref().is_some_and(|f| f.id == id) {
            self.fade = None;
        }
    }

    fn usable(&self) -> Result<(), PlaybackError> {
        if self.destroyed {
            Err(PlaybackError::SessionDestroyed)
        } else if !self.is_open() {
            Err(PlaybackError::NoSourceOpen)
        } else {
            Ok(())
        }
    }
}

pub(super) struct Shared {
    pub(super) inner: Mutex<Inner>,
    config: PlaybackConfig,
    positions: PositionStore,
    session: CancellationToken,
    status_tx: watch::Sender<PlaybackStatus>,
    timeline_tx: watch::Sender<Timeline>,
    events_tx: broadcast::Sender<PlaybackEvent>,
}

impl Shared {
    fn set_status(&self, inner: &mut Inner, status: PlaybackStatus) {
        if inner.status != status {
            tracing::info!(
                track_id = inner.track_id.as_deref().unwrap_or(""),
                from = ?inner.status,
                to = ?status,
                "播放状态变更"
            );
        }
        inner.status = status;
        self.status_tx.send_replace(status);
    }

    fn publish_timeline(&self, inner: &Inner) {
        let next = inner.timeline;
        self.timeline_tx.send_if_modified(|t| {
            if *t == next {
                false
            } else {
                *t = next;
                true
            }
        });
    }

    fn emit(&self, event: PlaybackEvent) {
        let _ = self.events_tx.send(event);
    }

    fn persist_position(&self, inner: &Inner, seconds: f64) {
        if !self.config.auto_save {
            return;
        }
        if let Some(track_id) = inner.track_id.as_deref() {
            self.positions.save(track_id, seconds);
        }
    }

    fn prepare_fade(&self, inner: &mut Inner, to: f32, kind: FadeKind) -> Option<FadePlan> {
        let from = inner.device.as_ref()?.volume();
        let ramp = FadeRamp::new(
            from,
            to,
            self.config.fade_duration_ms,
            self.config.fade_step_ms,
        );
        let (id, token) = inner.begin_fade(kind, &self.session);
        Some(FadePlan { id, ramp, token })
    }

    /// stop 的同步部分：转到 Ended 并发出 stop 通知。返回是否真的发生了转换。
    fn begin_stop(&self, inner: &mut Inner) -> bool {
        if inner.status == PlaybackStatus::Ended {
            return false;
        }
        self.set_status(inner, PlaybackStatus::Ended);
        self.emit(PlaybackEvent::Stopped);
        true
    }

    /// stop 收尾：暂停设备、恢复音量、回到 0
    fn complete_stop(&self, inner: &mut Inner) {
        let target = clamp_volume(inner.target_volume);
        let Some(device) = inner.device.as_mut() else {
            return;
        };
        device.pause();
        device.set_volume(target);
        if let Err(e) = device.seek(Duration::ZERO) {
            tracing::warn!(err = %e, "stop 后回到开头失败");
        }
        inner.timeline.current_time = 0.0;
        self.publish_timeline(inner);
        self.persist_position(inner, 0.0);
    }

    async fn stop_tail(&self, plan: FadePlan) -> FadeOutcome {
        let outcome = fade::drive(self, plan).await;
        match outcome {
            FadeOutcome::Completed => {
                let mut inner = self.inner.lock().await;
                self.complete_stop(&mut inner);
            }
            FadeOutcome::Cancelled => {
                tracing::debug!("stop 淡出被取代，跳过收尾");
            }
        }
        outcome
    }

    async fn stop_session(&self, fade_out: bool) {
        let mut inner = self.inner.lock().await;
        self.begin_stop(&mut inner);
        if fade_out {
            let Some(plan) = self.prepare_fade(&mut inner, 0.0, FadeKind::Silence) else {
                return;
            };
            drop(inner);
            self.stop_tail(plan).await;
        } else {
            inner.cancel_fade();
            self.complete_stop(&mut inner);
        }
    }

    fn seek_locked(&self, inner: &mut Inner, seconds: f64) -> Result<(), PlaybackError> {
        let target = if seconds.is_finite() { seconds.max(0.0) } else { 0.0 };
        let Some(device) = inner.device.as_mut() else {
            return Ok(());
        };
        device.seek(Duration::from_secs_f64(target))?;
        inner.timeline.current_time = target;
        self.publish_timeline(inner);
        self.persist_position(inner, target);
        Ok(())
    }

    async fn sample_timeline(self: &Arc<Self>) {
        let mut inner = self.inner.lock().await;
        if inner.destroyed || inner.status != PlaybackStatus::Playing {
            return;
        }
        let Some(device) = inner.device.as_ref() else {
            return;
        };
        let finished = device.is_finished();
        let current = device.position().as_secs_f64();
        let total = device.duration().map(|d| d.as_secs_f64());

        if total.is_some() {
            inner.timeline.total_time = total;
        }
        if current > inner.timeline.current_time {
            inner.timeline.current_time = current;
        }
        self.publish_timeline(&inner);

        if finished {
            self.handle_natural_end(&mut inner);
            return;
        }

        let now = inner.timeline.current_time;
        self.persist_position(&inner, now);

        if self.config.fade_out
            && !self.config.loop_playback
            && let Some(total) = inner.timeline.total_time
            && total - now <= self.config.fade_window_secs()
            && self.begin_stop(&mut inner)
        {
            tracing::info!(current_time = now, total_time = total, "进入淡出窗口，自动停止");
            if let Some(plan) = self.prepare_fade(&mut inner, 0.0, FadeKind::Silence) {
                drop(inner);
                let shared = Arc::clone(self);
                tokio::spawn(async move {
                    let outcome = shared.stop_tail(plan).await;
                    // 与自然结束相同的收尾策略
                    if outcome == FadeOutcome::Completed && !shared.config.keep_device_after_end {
                        PlaybackEngine { shared }
                            .destroy(DestroyOptions {
                                now: true,
                                fade_out: Some(false),
                            })
                            .await;
                    }
                });
            }
        }
    }

    fn handle_natural_end(self: &Arc<Self>, inner: &mut Inner) {
        let looped = self.config.loop_playback;
        tracing::info!(
            track_id = inner.track_id.as_deref().unwrap_or(""),
            looped,
            "曲目播放结束"
        );
        inner.cancel_fade();
        self.persist_position(inner, 0.0);
        self.set_status(inner, PlaybackStatus::Ended);
        self.emit(PlaybackEvent::Ended { looped });

        if looped {
            let target = clamp_volume(inner.target_volume);
            let restarted = inner.device.as_mut().map(|device| {
                device.seek(Duration::ZERO)?;
                device.set_volume(target);
                device.play()
            });
            match restarted {
                Some(Ok(())) => {
                    inner.timeline.current_time = 0.0;
                    self.publish_timeline(inner);
                    self.set_status(inner, PlaybackStatus::Playing);
                }
                Some(Err(e)) => {
                    tracing::warn!(err = %e, "循环重播失败");
                    self.emit(PlaybackEvent::Error(e.to_string()));
                }
                None => {}
            }
            return;
        }

        if let Some(device) = inner.device.as_mut() {
            device.pause();
        }
        if !self.config.keep_device_after_end {
            let engine = PlaybackEngine {
                shared: Arc::clone(self),
            };
            tokio::spawn(async move {
                engine
                    .destroy(DestroyOptions {
                        now: true,
                        fade_out: Some(false),
                    })
                    .await;
            });
        }
    }
}

async fn run_timeline(shared: Weak<Shared>, token: CancellationToken, period: Duration) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            biased;
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        shared.sample_timeline().await;
    }
    tracing::debug!("时间轴采样结束");
}

/// 一个播放会话：绑定一个曲目和一个独占的输出设备。
///
/// Clone 得到的是同一个会话的句柄。所有方法都需要在 tokio runtime 内调用。
#[derive(Clone)]
pub struct PlaybackEngine {
    shared: Arc<Shared>,
}

impl PlaybackEngine {
    pub fn new(
        device: impl AudioDevice + 'static,
        config: PlaybackConfig,
        positions: PositionStore,
    ) -> Self {
        let mut device: Box<dyn AudioDevice> = Box::new(device);
        let target_volume = config.initial_volume;
        device.set_volume(clamp_volume(target_volume));

        let (status_tx, _) = watch::channel(PlaybackStatus::Uninitialized);
        let (timeline_tx, _) = watch::channel(Timeline::default());
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    device: Some(device),
                    track_id: None,
                    source_uri: None,
                    status: PlaybackStatus::Uninitialized,
                    timeline: Timeline::default(),
                    target_volume,
                    fade: None,
                    next_fade_id: 0,
                    destroyed: false,
                }),
                config,
                positions,
                session: CancellationToken::new(),
                status_tx,
                timeline_tx,
                events_tx,
            }),
        }
    }

    pub fn config(&self) -> &PlaybackConfig {
        &self.shared.config
    }

    pub fn status(&self) -> PlaybackStatus {
        *self.shared.status_tx.borrow()
    }

    pub fn timeline(&self) -> Timeline {
        *self.shared.timeline_tx.borrow()
    }

    pub fn progress(&self) -> Option<f64> {
        self.timeline().progress()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<PlaybackStatus> {
        self.shared.status_tx.subscribe()
    }

    pub fn subscribe_timeline(&self) -> watch::Receiver<Timeline> {
        self.shared.timeline_tx.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.shared.events_tx.subscribe()
    }

    /// 未钳制的目标音量
    pub async fn target_volume(&self) -> f32 {
        self.shared.inner.lock().await.target_volume
    }

    pub async fn track_id(&self) -> Option<String> {
        self.shared.inner.lock().await.track_id.clone()
    }

    pub async fn is_destroyed(&self) -> bool {
        self.shared.inner.lock().await.destroyed
    }

    /// 绑定音源。开启 auto_save 且有保存的位置时从该位置继续。
    pub async fn open(&self, track_id: &str, source_uri: &str) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        if shared.config.auto_save {
            // 之前会话排队中的写入要先落盘，否则可能读到旧位置
            shared.positions.flush().await;
        }
        let mut inner = shared.inner.lock().await;
        if inner.destroyed {
            return Err(PlaybackError::SessionDestroyed);
        }
        if let Some(existing) = inner.track_id.as_ref() {
            return Err(PlaybackError::AlreadyOpen {
                track_id: existing.clone(),
            });
        }

        let resume_at = if shared.config.auto_save {
            shared.positions.load(track_id)
        } else {
            None
        };
        let target = clamp_volume(inner.target_volume);
        let Some(device) = inner.device.as_mut() else {
            return Err(PlaybackError::SessionDestroyed);
        };
        device.load(source_uri)?;
        device.set_volume(target);

        let mut current_time = 0.0;
        if let Some(seconds) = resume_at.filter(|s| *s > 0.0) {
            match device.seek(Duration::from_secs_f64(seconds)) {
                Ok(()) => current_time = seconds,
                Err(e) => tracing::warn!(track_id, seconds, err = %e, "恢复播放进度失败，从头播放"),
            }
        }
        let total_time = device.duration().map(|d| d.as_secs_f64());

        inner.track_id = Some(track_id.to_owned());
        inner.source_uri = Some(source_uri.to_owned());
        inner.timeline = Timeline {
            current_time,
            total_time,
        };
        shared.publish_timeline(&inner);
        drop(inner);

        tokio::spawn(run_timeline(
            Arc::downgrade(shared),
            shared.session.clone(),
            Duration::from_millis(shared.config.sample_interval_ms.max(1)),
        ));
        tracing::info!(track_id, source_uri, resume_at = current_time, "会话已打开");
        Ok(())
    }

    pub async fn play(&self, opts: PlayOptions) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        let fade_in = opts.fade_in.unwrap_or(shared.config.fade_in);
        let mut inner = shared.inner.lock().await;
        inner.usable()?;

        match inner.status {
            PlaybackStatus::Playing => return Ok(()),
            PlaybackStatus::Ended if !shared.config.loop_playback => {
                tracing::debug!("会话已结束，忽略 play");
                return Ok(());
            }
            PlaybackStatus::Ended => {
                shared.seek_locked(&mut inner, 0.0)?;
            }
            PlaybackStatus::Uninitialized | PlaybackStatus::Paused => {}
        }

        inner.cancel_fade();
        let target = clamp_volume(inner.target_volume);
        let Some(device) = inner.device.as_mut() else {
            return Err(PlaybackError::SessionDestroyed);
        };
        device.set_volume(if fade_in { NEAR_SILENT.min(target) } else { target });
        if let Err(e) = device.play() {
            tracing::warn!(err = %e, "设备拒绝播放");
            device.set_volume(target);
            return Err(e.into());
        }
        shared.set_status(&mut inner, PlaybackStatus::Playing);

        if fade_in {
            let to = inner.target_volume;
            if let Some(plan) = shared.prepare_fade(&mut inner, to, FadeKind::Volume) {
                drop(inner);
                let shared = Arc::clone(shared);
                tokio::spawn(async move {
                    fade::drive(&shared, plan).await;
                });
            }
        }
        Ok(())
    }

    /// 淡出被后续操作取代时不会暂停设备
    pub async fn pause(&self, opts: PauseOptions) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        let fade_out = opts.fade_out.unwrap_or(shared.config.fade_out);
        let mut inner = shared.inner.lock().await;
        inner.usable()?;
        if inner.status == PlaybackStatus::Ended {
            return Ok(());
        }

        if fade_out
            && let Some(plan) = shared.prepare_fade(&mut inner, 0.0, FadeKind::Silence)
        {
            drop(inner);
            if fade::drive(shared, plan).await == FadeOutcome::Cancelled {
                tracing::debug!("pause 淡出被取代");
                return Ok(());
            }
            inner = shared.inner.lock().await;
            if inner.destroyed {
                return Ok(());
            }
        } else {
            inner.cancel_fade();
        }

        if let Some(device) = inner.device.as_mut() {
            device.pause();
        }
        shared.set_status(&mut inner, PlaybackStatus::Paused);
        Ok(())
    }

    /// 幂等：已经 Ended 时只执行淡出/复位，不再发 stop 通知。销毁后静默忽略。
    pub async fn stop(&self, opts: StopOptions) -> Result<(), PlaybackError> {
        let shared = &self.shared;
        {
            let inner = shared.inner.lock().await;
            if inner.destroyed {
                return Ok(());
            }
            inner.usable()?;
        }
        shared
            .stop_session(opts.fade_out.unwrap_or(shared.config.fade_out))
            .await;
        Ok(())
    }

    /// 不钳制到 [0, total_time]；负数按 0 处理
    pub async fn seek_to(&self, seconds: f64) -> Result<(), PlaybackError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.destroyed {
            return Ok(());
        }
        inner.usable()?;
        if inner.status == PlaybackStatus::Ended {
            return Ok(());
        }
        self.shared.seek_locked(&mut inner, seconds)
    }

    pub async fn back(&self, seconds: f64) -> Result<(), PlaybackError> {
        self.skip(-seconds).await
    }

    pub async fn forward(&self, seconds: f64) -> Result<(), PlaybackError> {
        self.skip(seconds).await
    }

    async fn skip(&self, delta: f64) -> Result<(), PlaybackError> {
        let mut inner = self.shared.inner.lock().await;
        if inner.destroyed {
            return Ok(());
        }
        inner.usable()?;
        if inner.status == PlaybackStatus::Ended {
            return Ok(());
        }
        let mut target = (inner.timeline.current_time + delta).max(0.0);
        if let Some(total) = inner.timeline.total_time {
            target = target.min(total);
        }
        self.shared.seek_locked(&mut inner, target)
    }

    /// 保存未钳制的目标音量，设备上只应用 [0, 1] 内的值。
    /// 不带淡变时不会打断正在进行的淡出（pause/stop）。
    pub async fn set_volume(&self, volume: f32, opts: VolumeOptions) -> Result<(), PlaybackError> {
        {
            let mut inner = self.shared.inner.lock().await;
            if inner.destroyed {
                return Err(PlaybackError::SessionDestroyed);
            }
            inner.target_volume = volume;
            if !opts.fade {
                if inner.fade.as_ref().is_some_and(|f| f.kind == FadeKind::Volume) {
                    inner.cancel_fade();
                }
                if let Some(device) = inner.device.as_mut() {
                    device.set_volume(clamp_volume(volume));
                }
                return Ok(());
            }
        }
        self.fade_to_volume(volume).await?;
        Ok(())
    }

    /// 从当前设备音量线性淡变到 `target`，取代进行中的淡变
    pub async fn fade_to_volume(&self, target: f32) -> Result<FadeOutcome, PlaybackError> {
        let shared = &self.shared;
        let mut inner = shared.inner.lock().await;
        if inner.destroyed {
            return Err(PlaybackError::SessionDestroyed);
        }
        let Some(plan) = shared.prepare_fade(&mut inner, target, FadeKind::Volume) else {
            return Ok(FadeOutcome::Cancelled);
        };
        drop(inner);
        Ok(fade::drive(shared, plan).await)
    }

    /// 尽力而为：近乎静音地 play/pause 一次以解除自动播放限制，失败全部吞掉
    pub async fn preload(&self) {
        let mut inner = self.shared.inner.lock().await;
        if inner.destroyed || !inner.is_open() || inner.status == PlaybackStatus::Playing {
            return;
        }
        let target = clamp_volume(inner.target_volume);
        let Some(device) = inner.device.as_mut() else {
            return;
        };
        device.set_volume(NEAR_SILENT.min(target));
        match device.play() {
            Ok(()) => device.pause(),
            Err(e) => tracing::debug!(err = %e, "preload 失败，忽略"),
        }
        device.set_volume(target);
    }

    /// 释放设备。幂等，重复调用直接返回。
    pub async fn destroy(&self, opts: DestroyOptions) {
        let shared = &self.shared;
        let fade_out = opts.fade_out.unwrap_or(shared.config.fade_out) && !opts.now;
        let needs_stop = {
            let mut inner = shared.inner.lock().await;
            if inner.destroyed {
                return;
            }
            inner.destroyed = true;
            inner.is_open() && inner.status != PlaybackStatus::Ended
        };
        if needs_stop {
            shared.stop_session(fade_out).await;
        }

        if !opts.now {
            let fading = {
                let inner = shared.inner.lock().await;
                inner.fade.is_some() && inner.device.as_ref().is_some_and(|d| !d.is_paused())
            };
            if fading {
                tracing::debug!(
                    wait_ms = shared.config.fade_duration_ms,
                    "等待进行中的淡出完成后再释放设备"
                );
                tokio::time::sleep(Duration::from_millis(shared.config.fade_duration_ms)).await;
            }
        }

        let mut inner = shared.inner.lock().await;
        shared.session.cancel();
        inner.cancel_fade();
        if let Some(mut device) = inner.device.take() {
            device.release();
        }
        shared.emit(PlaybackEvent::Destroyed);
        tracing::info!(
            track_id = inner.track_id.as_deref().unwrap_or(""),
            "会话已销毁"
        );
    }

    /// 外部传输控制入口
    pub async fn handle_command(&self, cmd: TransportCommand) -> Result<(), PlaybackError> {
        match cmd {
            TransportCommand::Play => self.play(PlayOptions::default()).await,
            TransportCommand::Pause => self.pause(PauseOptions::default()).await,
            TransportCommand::Stop => self.stop(StopOptions::default()).await,
            TransportCommand::Back(s) => self.back(s).await,
            TransportCommand::Forward(s) => self.forward(s).await,
            TransportCommand::SeekTo(s) => self.seek_to(s).await,
        }
    }
}
