//! 播放引擎：状态机、淡入淡出、进度持久化，以及可替换的输出设备。

mod config;
mod controls;
mod device;
mod engine;
mod fade;
mod messages;
mod null_device;
mod player;

pub use config::PlaybackConfig;
pub use controls::spawn_transport_bridge;
pub use device::AudioDevice;
pub use engine::{DEFAULT_SKIP_SECS, PlaybackEngine};
pub use fade::{FadeOutcome, FadeRamp, clamp_volume};
pub use messages::{
    DestroyOptions, PauseOptions, PlayOptions, PlaybackEvent, PlaybackStatus, StopOptions,
    Timeline, TransportCommand, VolumeOptions,
};
pub use null_device::NullDevice;
pub use player::RodioDevice;
