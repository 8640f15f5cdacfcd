// 状态观察者
//
// 编排器在自身状态变化时同步回调观察者（不缓冲、不重排）。
// 观察者只能观察，不能影响上传流程；回调中的 panic 会被捕获并记录

use crate::uploader::chunk::ChunkStatus;
use crate::uploader::throttle::ProgressThrottler;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// 状态回调
///
/// 所有方法都有空实现，按需覆盖
pub trait StatusObserver: Send + Sync {
    /// 阶段性提示信息
    fn on_progress(&self, _message: &str) {}

    /// 分片切分完成后调用一次
    fn on_total_chunks(&self, _total: usize) {}

    /// 每次分片状态变化
    fn on_chunk_status_change(&self, _index: usize, _status: ChunkStatus) {}

    /// 一轮调度结束且存在可重试的失败分片（每轮最多一次）
    fn on_retryable_failure(&self) {}
}

/// 不做任何处理
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StatusObserver for NoopObserver {}

/// 调用观察者回调，panic 时只记录日志
pub(crate) fn notify(hook: &'static str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        error!("观察者回调 {} 发生 panic，已忽略", hook);
    }
}

/// 上传事件
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum UploadEvent {
    /// 提示信息
    Progress { message: String },
    /// 分片总数
    TotalChunks { total: usize },
    /// 分片状态变化
    ChunkStatusChanged { index: usize, status: ChunkStatus },
    /// 存在可重试的失败分片
    RetryableFailure,
}

/// 把回调转成事件，通过 channel 发给其他任务
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<UploadEvent>,
}

impl ChannelObserver {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, event: UploadEvent) {
        // 接收端已关闭时直接丢弃
        let _ = self.tx.send(event);
    }
}

impl StatusObserver for ChannelObserver {
    fn on_progress(&self, message: &str) {
        self.send(UploadEvent::Progress {
            message: message.to_string(),
        });
    }

    fn on_total_chunks(&self, total: usize) {
        self.send(UploadEvent::TotalChunks { total });
    }

    fn on_chunk_status_change(&self, index: usize, status: ChunkStatus) {
        self.send(UploadEvent::ChunkStatusChanged { index, status });
    }

    fn on_retryable_failure(&self) {
        self.send(UploadEvent::RetryableFailure);
    }
}

/// 把上传进度输出到日志（命令行使用）
#[derive(Debug, Default)]
pub struct TracingObserver {
    total: AtomicUsize,
    succeeded: AtomicUsize,
    throttler: ProgressThrottler,
}

impl TracingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded.load(Ordering::SeqCst)
    }
}

impl StatusObserver for TracingObserver {
    fn on_progress(&self, message: &str) {
        info!("{}", message);
    }

    fn on_total_chunks(&self, total: usize) {
        self.total.store(total, Ordering::SeqCst);
        self.succeeded.store(0, Ordering::SeqCst);
        self.throttler.reset();
        info!("共 {} 个分片", total);
    }

    fn on_chunk_status_change(&self, index: usize, status: ChunkStatus) {
        match status {
            ChunkStatus::Success => {
                let done = self.succeeded.fetch_add(1, Ordering::SeqCst) + 1;
                let total = self.total.load(Ordering::SeqCst).max(1);
                let last = done >= total;
                if (last && self.throttler.force_emit()) || self.throttler.should_emit() {
                    info!(
                        "上传进度: {}/{} ({:.1}%)",
                        done,
                        total,
                        done as f64 * 100.0 / total as f64
                    );
                }
            }
            ChunkStatus::Error => warn!("[分片#{}] ✗ 上传失败", index),
            ChunkStatus::Pending | ChunkStatus::Sending => {}
        }
    }

    fn on_retryable_failure(&self) {
        warn!("部分分片上传失败，可以重试");
    }
}
