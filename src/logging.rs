use std::fs;
use std::path::{Path, PathBuf};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_FILE: &str = "tour-player.log";
const DEFAULT_FILTER: &str = "info";

/// 持有到进程退出，drop 时刷新未写完的日志
pub struct LogGuard(#[allow(dead_code)] Option<WorkerGuard>);

#[derive(Debug, Clone, Default)]
pub struct LogConfig {
    pub dir: Option<PathBuf>,
    pub filter: Option<String>,
}

/// 日志目录：显式配置优先，否则 `{data_dir}/logs`；无法创建时退到系统临时目录
pub fn resolve_log_dir(data_dir: &Path, dir: Option<PathBuf>) -> PathBuf {
    let log_dir = dir.unwrap_or_else(|| data_dir.join("logs"));
    match fs::create_dir_all(&log_dir) {
        Ok(()) => log_dir,
        Err(e) => {
            let fallback = std::env::temp_dir().join("tour-player-logs");
            eprintln!(
                "无法创建日志目录 {}: {e}，改用 {}",
                log_dir.display(),
                fallback.display()
            );
            let _ = fs::create_dir_all(&fallback);
            fallback
        }
    }
}

fn build_filter(filter: Option<String>) -> EnvFilter {
    match filter {
        Some(s) if !s.trim().is_empty() => EnvFilter::new(s),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
    }
}

pub fn init(data_dir: &Path, cfg: LogConfig) -> LogGuard {
    let log_dir = resolve_log_dir(data_dir, cfg.dir);

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE);
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_target(true)
        .with_writer(file_writer);

    let subscriber = tracing_subscriber::registry()
        .with(build_filter(cfg.filter))
        .with(file_layer);

    let _ = subscriber.try_init();
    tracing::info!(log_dir = %log_dir.display(), "tracing 已初始化");

    LogGuard(Some(guard))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_dir_under_data_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        let log_dir = resolve_log_dir(dir.path(), None);
        assert_eq!(log_dir, dir.path().join("logs"));
        assert!(log_dir.is_dir());
    }

    #[test]
    fn test_explicit_log_dir_wins() {
        let dir = tempfile::tempdir().expect("tempdir");
        let custom = dir.path().join("custom");
        assert_eq!(resolve_log_dir(dir.path(), Some(custom.clone())), custom);
    }

    #[test]
    fn test_unwritable_log_dir_falls_back_to_temp() {
        let dir = tempfile::tempdir().expect("tempdir");
        // 普通文件下无法再建目录
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"x").expect("write");
        let log_dir = resolve_log_dir(dir.path(), Some(file.join("logs")));
        assert_eq!(log_dir, std::env::temp_dir().join("tour-player-logs"));
    }
}
