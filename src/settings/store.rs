use crate::playback::PlaybackConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    // 播放会话默认配置
    #[serde(default)]
    pub playback: PlaybackConfig,

    // 日志过滤（为空时走 RUST_LOG / 默认 info）
    #[serde(default)]
    pub log_filter: Option<String>,
}

pub fn load_settings(data_dir: &Path) -> AppSettings {
    let p = settings_path(data_dir);
    let Ok(bytes) = fs::read(&p) else {
        return AppSettings::default();
    };
    match serde_json::from_slice(&bytes) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!(path = %p.display(), err = %e, "设置文件损坏，使用默认设置");
            AppSettings::default()
        }
    }
}

pub fn save_settings(data_dir: &Path, s: &AppSettings) -> std::io::Result<()> {
    fs::create_dir_all(data_dir)?;
    let p = settings_path(data_dir);
    let tmp = p.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(s).map_err(std::io::Error::other)?;
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, &p) {
        let _ = fs::remove_file(&p);
        fs::rename(&tmp, &p).map_err(|_| e)?;
    }
    Ok(())
}

pub fn settings_path(data_dir: &Path) -> PathBuf {
    data_dir.join("settings.json")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let loaded = load_settings(dir.path());
        assert_eq!(loaded, AppSettings::default());
        assert_eq!(loaded.playback.fade_duration_ms, 2000);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(
            settings_path(dir.path()),
            br#"{"playback": {"fade_out": true, "fade_duration_ms": 500}}"#,
        )
        .expect("write");

        let loaded = load_settings(dir.path());
        assert!(loaded.playback.fade_out);
        assert_eq!(loaded.playback.fade_duration_ms, 500);
        assert!(!loaded.playback.auto_save);
        assert_eq!(loaded.playback.fade_step_ms, 100);
        assert_eq!(loaded.log_filter, None);
    }
}
