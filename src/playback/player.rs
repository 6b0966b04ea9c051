use rodio::mixer::Mixer;
use rodio::{Decoder, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::device::AudioDevice;
use crate::error::DeviceError;

/// 基于 rodio Sink 的真实输出设备。
///
/// OutputStream 不可跨线程移动，由调用方持有；这里只保留连接到其 mixer 的 Sink。
pub struct RodioDevice {
    sink: Sink,
    path: Option<PathBuf>,
    duration: Option<Duration>,
}

impl RodioDevice {
    pub fn new(mixer: &Mixer) -> Self {
        let sink = Sink::connect_new(mixer);
        sink.pause();
        Self {
            sink,
            path: None,
            duration: None,
        }
    }

    fn append_source(&mut self, path: &Path) -> Result<(), DeviceError> {
        let (source, duration) = open_source(path)?;
        self.sink.append(source);
        if duration.is_some() {
            self.duration = duration;
        }
        Ok(())
    }

    /// 音源播放完后 Sink 为空，需要重新挂上才能 seek/play
    fn ensure_source(&mut self) -> Result<(), DeviceError> {
        let Some(path) = self.path.clone() else {
            return Err(DeviceError::NotLoaded);
        };
        if self.sink.empty() {
            tracing::debug!(path = %path.display(), "重新挂载音源");
            self.append_source(&path)?;
        }
        Ok(())
    }
}

impl AudioDevice for RodioDevice {
    fn load(&mut self, source_uri: &str) -> Result<(), DeviceError> {
        let path = uri_to_path(source_uri);
        self.sink.clear();
        self.sink.pause();
        self.duration = None;
        self.append_source(&path)?;
        tracing::debug!(path = %path.display(), duration = ?self.duration, "音源已加载");
        self.path = Some(path);
        Ok(())
    }

    fn play(&mut self) -> Result<(), DeviceError> {
        self.ensure_source()?;
        self.sink.play();
        Ok(())
    }

    fn pause(&mut self) {
        self.sink.pause();
    }

    fn seek(&mut self, position: Duration) -> Result<(), DeviceError> {
        self.ensure_source()?;
        self.sink
            .try_seek(position)
            .map_err(|e| DeviceError::Seek(e.to_string()))
    }

    fn set_volume(&mut self, volume: f32) {
        self.sink.set_volume(volume);
    }

    fn volume(&self) -> f32 {
        self.sink.volume()
    }

    fn position(&self) -> Duration {
        self.sink.get_pos()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.sink.is_paused()
    }

    fn is_finished(&self) -> bool {
        self.path.is_some() && self.sink.empty()
    }

    fn release(&mut self) {
        self.sink.stop();
        self.path = None;
    }
}

fn uri_to_path(source_uri: &str) -> PathBuf {
    PathBuf::from(source_uri.strip_prefix("file://").unwrap_or(source_uri))
}

fn open_source(path: &Path) -> Result<(Decoder<BufReader<File>>, Option<Duration>), DeviceError> {
    let file = File::open(path).map_err(|source| DeviceError::OpenFile {
        path: path.to_path_buf(),
        source,
    })?;
    let decoder = Decoder::new(BufReader::new(file)).map_err(|e| DeviceError::Decode {
        uri: path.display().to_string(),
        message: e.to_string(),
    })?;
    let duration = decoder.total_duration();
    Ok((decoder, duration))
}
