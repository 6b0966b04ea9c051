use super::kv::KeyValueStore;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

const KEY_PREFIX: &str = "progress-";
const WRITE_QUEUE: usize = 64;

#[derive(Debug)]
enum WriteRequest {
    Save { key: String, seconds: f64 },
    Flush(oneshot::Sender<()>),
}

/// 按曲目保存播放位置（秒）。
///
/// 写入是 fire-and-forget 的：请求进入写入 actor 的队列后立即返回，
/// actor 按顺序落盘，同一批次内同一个 key 只写最后一个值。失败只记日志，不重试。
#[derive(Clone)]
pub struct PositionStore {
    store: Arc<dyn KeyValueStore>,
    tx: mpsc::Sender<WriteRequest>,
}

impl PositionStore {
    /// 启动写入 actor；必须在 tokio runtime 内调用
    pub fn spawn(store: Arc<dyn KeyValueStore>) -> Self {
        let (tx, rx) = mpsc::channel(WRITE_QUEUE);
        tokio::spawn(run_writer(Arc::clone(&store), rx));
        Self { store, tx }
    }

    pub fn key(track_id: &str) -> String {
        format!("{KEY_PREFIX}{track_id}")
    }

    /// 读取保存的位置；不存在、读取失败或不是有效数字都返回 None
    pub fn load(&self, track_id: &str) -> Option<f64> {
        let key = Self::key(track_id);
        let value = match self.store.get(&key) {
            Ok(v) => v?,
            Err(e) => {
                tracing::warn!(track_id, err = %e, "读取播放进度失败，从头播放");
                return None;
            }
        };
        match value.as_f64() {
            Some(seconds) if seconds.is_finite() && seconds >= 0.0 => Some(seconds),
            _ => {
                tracing::warn!(track_id, value = %value, "播放进度不是有效数字，忽略");
                None
            }
        }
    }

    pub fn save(&self, track_id: &str, seconds: f64) {
        let req = WriteRequest::Save {
            key: Self::key(track_id),
            seconds,
        };
        if let Err(e) = self.tx.try_send(req) {
            tracing::warn!(track_id, seconds, err = %e, "播放进度写入队列不可用，丢弃");
        }
    }

    /// 等待此前提交的写入全部落盘
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriteRequest::Flush(done_tx)).await.is_ok() {
            let _ = done_rx.await;
        }
    }
}

async fn run_writer(store: Arc<dyn KeyValueStore>, mut rx: mpsc::Receiver<WriteRequest>) {
    while let Some(first) = rx.recv().await {
        let mut batch: Vec<(String, f64)> = Vec::new();
        let mut flushes = Vec::new();

        let mut next = Some(first);
        while let Some(req) = next {
            match req {
                WriteRequest::Save { key, seconds } => {
                    match batch.iter_mut().find(|(k, _)| *k == key) {
                        Some(slot) => slot.1 = seconds,
                        None => batch.push((key, seconds)),
                    }
                }
                WriteRequest::Flush(done) => flushes.push(done),
            }
            next = rx.try_recv().ok();
        }

        if !batch.is_empty() {
            // 文件存储是同步 IO，放到阻塞线程池
            let store = Arc::clone(&store);
            if let Err(e) = tokio::task::spawn_blocking(move || write_batch(store.as_ref(), batch)).await {
                tracing::warn!(err = %e, "播放进度写入任务异常退出");
            }
        }
        for done in flushes {
            let _ = done.send(());
        }
    }
    tracing::debug!("播放进度写入 actor 退出");
}

fn write_batch(store: &dyn KeyValueStore, batch: Vec<(String, f64)>) {
    for (key, seconds) in batch {
        let Some(value) = serde_json::Number::from_f64(seconds).map(Value::Number) else {
            tracing::warn!(key = %key, seconds, "播放进度不是有限数，跳过");
            continue;
        };
        if let Err(e) = store.set(&key, value) {
            tracing::warn!(key = %key, err = %e, "保存播放进度失败");
        }
    }
}
