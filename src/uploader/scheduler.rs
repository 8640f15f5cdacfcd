// 分片调度循环
//
// start() 和 retry() 共用：给定一组分片索引，用固定数量的 worker
// 从同一个 FIFO 队列中取分片上传，直到队列为空且所有 worker 空闲
//
// - 每个分片只会被一个 worker 取出（出队即转移所有权）
// - 同一时刻处于 sending 的分片数不超过 worker 数
// - 分片失败只记录在分片状态上，不会中断其他 worker
// - 传输通道故障（TransportFault）或 worker 异常会立即中止整轮

use crate::error::UploadError;
use crate::uploader::chunk::{ChunkStatus, ChunkTable};
use crate::uploader::observer::{notify, StatusObserver};
use crate::uploader::source::ChunkSource;
use crate::uploader::transport::{ChunkOutcome, ChunkTransport, TransportFault};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// 无法获取硬件并发数时使用的默认 worker 数
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// 硬件并发数提示
pub fn available_parallelism_hint() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_WORKER_COUNT)
}

/// 计算 worker 数
///
/// W = min(配置值, 硬件并发数)，未配置时取硬件并发数，且至少为 1
pub fn resolve_worker_count(configured: Option<usize>) -> usize {
    resolve_worker_count_with_hint(configured, available_parallelism_hint())
}

fn resolve_worker_count_with_hint(configured: Option<usize>, hint: usize) -> usize {
    let hint = hint.max(1);
    configured.map_or(hint, |n| n.min(hint)).max(1)
}

/// 一轮调度所需的共享状态
struct Round {
    session_id: String,
    queue: Mutex<VecDeque<usize>>,
    /// 本轮是否出现过失败分片
    has_failed: AtomicBool,
    table: Arc<Mutex<ChunkTable>>,
    source: Arc<dyn ChunkSource>,
    transport: Arc<dyn ChunkTransport>,
    observer: Arc<dyn StatusObserver>,
}

impl Round {
    fn next_task(&self) -> Option<usize> {
        self.queue.lock().pop_front()
    }

    /// pending → sending，返回分片字节范围
    fn begin(&self, index: usize) -> Option<std::ops::Range<u64>> {
        let mut table = self.table.lock();
        if !table.mark_sending(index) {
            return None;
        }
        let range = table.get(index).map(|c| c.descriptor.range.clone());
        notify("on_chunk_status_change", || {
            self.observer
                .on_chunk_status_change(index, ChunkStatus::Sending)
        });
        range
    }

    /// sending → success / error
    fn finish(&self, index: usize, outcome: ChunkOutcome) {
        let mut table = self.table.lock();
        let status = match outcome {
            ChunkOutcome::Success => {
                table.mark_success(index);
                ChunkStatus::Success
            }
            ChunkOutcome::Error(reason) => {
                warn!("[分片#{}] 上传失败: {}", index, reason);
                table.mark_error(index, reason);
                self.has_failed.store(true, Ordering::SeqCst);
                ChunkStatus::Error
            }
        };
        notify("on_chunk_status_change", || {
            self.observer.on_chunk_status_change(index, status)
        });
    }
}

/// 单个 worker：取分片 → 读数据 → 传输 → 记录结果，直到队列为空
async fn worker_loop(worker_id: usize, round: Arc<Round>) -> Result<usize, TransportFault> {
    let mut dispatched = 0usize;

    while let Some(index) = round.next_task() {
        let range = match round.begin(index) {
            Some(range) => range,
            None => continue,
        };
        dispatched += 1;

        debug!(
            "[worker#{}][分片#{}] 开始上传 (范围: {}..{})",
            worker_id, index, range.start, range.end
        );

        let outcome = match round.source.read_range(range).await {
            Ok(data) => {
                round
                    .transport
                    .upload(&round.session_id, index, data)
                    .await?
            }
            Err(e) => ChunkOutcome::Error(format!("读取分片数据失败: {:#}", e)),
        };

        if outcome.is_success() {
            debug!("[worker#{}][分片#{}] ✓ 上传成功", worker_id, index);
        }
        round.finish(index, outcome);
    }

    debug!(
        "[worker#{}] 队列已空，退出 (本轮处理 {} 个分片)",
        worker_id, dispatched
    );
    Ok(dispatched)
}

/// 分片调度器
pub(crate) struct Dispatcher {
    pub session_id: String,
    pub table: Arc<Mutex<ChunkTable>>,
    pub source: Arc<dyn ChunkSource>,
    pub transport: Arc<dyn ChunkTransport>,
    pub observer: Arc<dyn StatusObserver>,
    pub worker_count: usize,
}

impl Dispatcher {
    /// 调度一轮
    ///
    /// # 参数
    /// * `tasks` - 本轮要上传的分片索引（升序，均处于 pending）
    ///
    /// # 返回
    /// 全部成功返回 Ok；存在失败分片返回 ChunksFailed；
    /// 传输通道故障返回 TransportFault
    pub(crate) async fn run(self, tasks: Vec<usize>) -> Result<(), UploadError> {
        if tasks.is_empty() {
            debug!("没有待上传的分片，跳过调度");
            return Ok(());
        }

        let worker_count = self.worker_count.max(1).min(tasks.len());
        let started = Instant::now();

        info!(
            "[调度] 开始上传 {} 个分片，worker 数: {}",
            tasks.len(),
            worker_count
        );

        let round = Arc::new(Round {
            session_id: self.session_id,
            queue: Mutex::new(tasks.iter().copied().collect()),
            has_failed: AtomicBool::new(false),
            table: self.table,
            source: self.source,
            transport: self.transport,
            observer: self.observer,
        });

        let mut join_set = JoinSet::new();
        for worker_id in 1..=worker_count {
            join_set.spawn(worker_loop(worker_id, round.clone()));
        }

        while let Some(result) = join_set.join_next().await {
            let fault = match result {
                Ok(Ok(_)) => continue,
                Ok(Err(fault)) => fault.message,
                Err(e) => format!("worker 异常退出: {}", e),
            };

            error!("[调度] 传输通道故障，中止本轮: {}", fault);
            join_set.shutdown().await;
            abort_in_flight(&round, &tasks, &fault);
            return Err(UploadError::TransportFault(fault));
        }

        // 所有 worker 均已退出，队列为空
        let failed = if round.has_failed.load(Ordering::SeqCst) {
            round.table.lock().indices_with(ChunkStatus::Error)
        } else {
            Vec::new()
        };

        if failed.is_empty() {
            info!(
                "[调度] 本轮 {} 个分片全部上传成功，耗时 {:.2}s",
                tasks.len(),
                started.elapsed().as_secs_f64()
            );
            return Ok(());
        }

        warn!(
            "[调度] 本轮结束，{} 个分片失败: {:?}",
            failed.len(),
            failed
        );
        notify("on_retryable_failure", || {
            round.observer.on_retryable_failure()
        });
        Err(UploadError::ChunksFailed { indices: failed })
    }
}

/// 中止后把仍处于 sending 的分片标记为 error，避免状态悬空
fn abort_in_flight(round: &Round, tasks: &[usize], reason: &str) {
    let mut table = round.table.lock();
    for &index in tasks {
        if table.status(index) == Some(ChunkStatus::Sending)
            && table.mark_error(index, format!("传输中止: {}", reason))
        {
            notify("on_chunk_status_change", || {
                round
                    .observer
                    .on_chunk_status_change(index, ChunkStatus::Error)
            });
        }
    }
}
