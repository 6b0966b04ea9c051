use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::engine::PlaybackEngine;
use super::messages::TransportCommand;

/// 把外部传输控制（系统媒体控件等）的命令转发给会话。
///
/// 通道关闭或会话销毁后退出；单条命令失败只记日志。
pub fn spawn_transport_bridge(
    engine: PlaybackEngine,
    mut rx: mpsc::Receiver<TransportCommand>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(cmd) = rx.recv().await {
            if engine.is_destroyed().await {
                tracing::debug!(?cmd, "会话已销毁，传输控制桥退出");
                break;
            }
            tracing::debug!(?cmd, "收到传输控制命令");
            match engine.handle_command(cmd).await {
                Ok(()) => {}
                Err(e) if e.is_usage_error() => {
                    tracing::debug!(?cmd, err = %e, "当前状态不接受该命令");
                }
                Err(e) => tracing::warn!(?cmd, err = %e, "传输控制命令执行失败"),
            }
        }
    })
}
