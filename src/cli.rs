use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use std::path::PathBuf;

use crate::error::AppError;

#[derive(Debug, Parser)]
#[command(name = "tour-player", version, about = "互动语音导览播放器")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// 覆盖数据目录（默认走系统 data_local_dir）
    #[arg(long, global = true, env = "TOUR_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    /// 覆盖日志目录（默认 `{data_dir}/logs`）
    #[arg(long, global = true, env = "TOUR_LOG_DIR")]
    pub log_dir: Option<PathBuf>,

    /// 覆盖日志过滤（等价于设置 RUST_LOG）
    #[arg(long, global = true, env = "RUST_LOG")]
    pub log_filter: Option<String>,

    /// 不打开声卡，使用虚拟时钟设备
    #[arg(long, global = true, env = "TOUR_NO_AUDIO")]
    pub no_audio: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// 播放一个音源，Ctrl-C 淡出停止
    Play(PlayArgs),

    /// 操作故事定义文件中的章节进度
    Story {
        /// 故事定义（JSON）
        file: PathBuf,

        #[command(subcommand)]
        action: StoryAction,
    },
}

#[derive(Debug, clap::Args)]
pub struct PlayArgs {
    /// 本地路径或 file:// URI
    pub source: String,

    /// 进度持久化使用的曲目 id（默认取音源本身）
    #[arg(long)]
    pub track_id: Option<String>,

    #[arg(long)]
    pub fade_in: bool,

    #[arg(long)]
    pub fade_out: bool,

    #[arg(long = "loop")]
    pub loop_playback: bool,

    #[arg(long)]
    pub auto_save: bool,

    /// 淡入淡出时长（毫秒）
    #[arg(long)]
    pub fade_ms: Option<u64>,

    #[arg(long)]
    pub volume: Option<f32>,

    /// 虚拟设备的曲目时长，仅在 --no-audio 时生效
    #[arg(long)]
    pub duration_secs: Option<f64>,
}

#[derive(Debug, Subcommand)]
pub enum StoryAction {
    /// 打印当前章节和状态
    Show,
    /// 推进到下一章
    Next,
    /// 跳转到指定章节
    Goto { chapter: String },
    /// 合并 key=value 到故事状态（value 按 JSON 解析，失败时当作字符串）
    Set {
        #[arg(required = true)]
        pairs: Vec<String>,
    },
    /// 清空进度，回到初始章节
    Reset,
}

/// `key=value` 列表转成状态补丁；value 先按 JSON 解析，失败时作为字符串
pub fn parse_state_pairs(pairs: &[String]) -> Result<Map<String, Value>, AppError> {
    let mut partial = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            return Err(AppError::Other(format!("参数格式应为 key=value: {pair}")));
        };
        let key = key.trim();
        if key.is_empty() {
            return Err(AppError::Other(format!("缺少 key: {pair}")));
        }
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_owned()));
        partial.insert(key.to_owned(), value);
    }
    Ok(partial)
}
