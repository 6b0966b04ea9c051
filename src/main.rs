use clap::Parser;
use directories::ProjectDirs;
use rodio::{OutputStream, OutputStreamBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tour_player::cli::{Cli, Command, PlayArgs, StoryAction, parse_state_pairs};
use tour_player::error::AppError;
use tour_player::logging;
use tour_player::playback::{
    DestroyOptions, NullDevice, PlayOptions, PlaybackConfig, PlaybackEngine, PlaybackEvent,
    RodioDevice,
};
use tour_player::settings::load_settings;
use tour_player::storage::{JsonFileStore, KeyValueStore, PositionStore};
use tour_player::story::{
    ResolverRegistry, StateUpdate, StoryController, StoryDefinition, StoryEvent,
};

fn default_data_dir() -> PathBuf {
    ProjectDirs::from("dev", "tour", "tour-player")
        .map(|p| p.data_local_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("tour-player"))
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let data_dir = cli.data_dir.clone().unwrap_or_else(default_data_dir);
    let settings = load_settings(&data_dir);

    let _log_guard = logging::init(
        &data_dir,
        logging::LogConfig {
            dir: cli.log_dir.clone(),
            filter: cli.log_filter.clone().or(settings.log_filter.clone()),
        },
    );
    tracing::info!(data_dir = %data_dir.display(), "tour-player 启动");

    let file_store = JsonFileStore::open(&data_dir)?;
    tracing::debug!(path = %file_store.path().display(), "存储已打开");
    let store: Arc<dyn KeyValueStore> = Arc::new(file_store);

    match cli.command {
        Command::Play(args) => run_play(args, settings.playback, store, cli.no_audio).await,
        Command::Story { file, action } => run_story(&file, action, store).await,
    }
}

fn apply_play_overrides(config: &mut PlaybackConfig, args: &PlayArgs) {
    config.fade_in |= args.fade_in;
    config.fade_out |= args.fade_out;
    config.loop_playback |= args.loop_playback;
    config.auto_save |= args.auto_save;
    if let Some(ms) = args.fade_ms {
        config.fade_duration_ms = ms;
    }
    if let Some(v) = args.volume {
        config.initial_volume = v;
    }
}

async fn run_play(
    args: PlayArgs,
    mut config: PlaybackConfig,
    store: Arc<dyn KeyValueStore>,
    no_audio: bool,
) -> Result<(), AppError> {
    apply_play_overrides(&mut config, &args);
    let positions = PositionStore::spawn(store);
    let track_id = args.track_id.clone().unwrap_or_else(|| args.source.clone());

    // 输出流要活到会话结束
    let mut _output: Option<OutputStream> = None;
    let engine = if no_audio {
        let duration = args.duration_secs.filter(|s| s.is_finite() && *s > 0.0);
        let device = match duration {
            Some(secs) => NullDevice::with_duration_secs(secs),
            None => NullDevice::new(None),
        };
        tracing::info!(?duration, "使用虚拟输出设备");
        PlaybackEngine::new(device, config, positions.clone())
    } else {
        let stream = OutputStreamBuilder::open_default_stream()
            .map_err(|e| AppError::Other(format!("初始化音频输出失败: {e}")))?;
        let device = RodioDevice::new(stream.mixer());
        _output = Some(stream);
        PlaybackEngine::new(device, config, positions.clone())
    };

    let mut status_rx = engine.subscribe_status();
    let mut events = engine.subscribe_events();
    engine.open(&track_id, &args.source).await?;
    engine.play(PlayOptions::default()).await?;
    println!("正在播放 {track_id}（Ctrl-C 停止）");

    loop {
        tokio::select! {
            changed = status_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let status = *status_rx.borrow_and_update();
                let timeline = engine.timeline();
                match timeline.total_time {
                    Some(total) => println!("{status:?} {:.1}s / {total:.1}s", timeline.current_time),
                    None => println!("{status:?} {:.1}s", timeline.current_time),
                }
            }
            event = events.recv() => match event {
                Ok(PlaybackEvent::Destroyed) | Err(RecvError::Closed) => break,
                // 保留设备时会话不会自行销毁；淡出窗口触发的 Stopped 也意味着播放已结束
                Ok(PlaybackEvent::Ended { looped: false } | PlaybackEvent::Stopped)
                    if engine.config().keep_device_after_end =>
                {
                    engine.destroy(DestroyOptions::default()).await;
                    break;
                }
                Ok(PlaybackEvent::Error(msg)) => eprintln!("播放错误: {msg}"),
                Ok(event) => tracing::debug!(?event, "播放事件"),
                Err(RecvError::Lagged(skipped)) => tracing::warn!(skipped, "播放事件积压"),
            },
            _ = tokio::signal::ctrl_c() => {
                println!("淡出停止…");
                engine.destroy(DestroyOptions { now: false, fade_out: Some(true) }).await;
                break;
            }
        }
    }

    positions.flush().await;
    tracing::info!(track_id = %track_id, "播放结束");
    Ok(())
}

async fn run_story(
    file: &Path,
    action: StoryAction,
    store: Arc<dyn KeyValueStore>,
) -> Result<(), AppError> {
    let story = StoryDefinition::load(file)?.into_story(&ResolverRegistry::new())?;
    let controller = StoryController::new(story, store)?;
    let mut events = controller.subscribe_events();
    let list_chapters = matches!(action, StoryAction::Show);

    match action {
        StoryAction::Show => {}
        StoryAction::Next => controller.next_chapter().await?,
        StoryAction::Goto { chapter } => controller.set_chapter(&chapter).await?,
        StoryAction::Set { pairs } => {
            let partial = parse_state_pairs(&pairs)?;
            controller.update_state(StateUpdate::Merge(partial)).await?;
        }
        StoryAction::Reset => controller.reset_story().await?,
    }

    while let Ok(event) = events.try_recv() {
        match event {
            StoryEvent::ChapterChanged { from, to } => println!("{from} -> {to}"),
            StoryEvent::Ended { chapter } => println!("故事已在 {chapter} 结束"),
            StoryEvent::Reset => println!("进度已重置"),
        }
    }

    let state = controller.state();
    let chapter = controller.story().chapter(&state.current_chapter);
    match chapter.and_then(|c| c.title.as_deref()) {
        Some(title) => println!("当前章节: {} ({title})", state.current_chapter),
        None => println!("当前章节: {}", state.current_chapter),
    }
    if let Some(track) = chapter.and_then(|c| c.track.as_deref()) {
        println!("音轨: {track}");
    }
    for (key, value) in &state.data {
        println!("  {key} = {value}");
    }
    if list_chapters {
        println!("全部章节: {}", controller.story().chapter_ids().join(", "));
    }
    Ok(())
}
