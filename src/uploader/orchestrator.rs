// 上传编排器
//
// 一次编排对应一个文件的一次上传：
//   start()  计算校验和 → 初始化会话 → 切分 → 调度全部分片
//   retry()  复用同一会话，只重传处于 error 状态的分片
//
// 生命周期：Idle → Running → Settled（可 retry）/ Aborted（终态）

use crate::error::UploadError;
use crate::uploader::chunk::{Chunk, ChunkStatus, ChunkTable};
use crate::uploader::digest::DigestProvider;
use crate::uploader::observer::{notify, NoopObserver, StatusObserver};
use crate::uploader::scheduler::{resolve_worker_count, Dispatcher};
use crate::uploader::session::{validate_file_name, InitRequest, SessionInitiator, UploadSession};
use crate::uploader::source::ChunkSource;
use crate::uploader::transport::ChunkTransport;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{error, info, warn};

/// 编排器所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrchestratorPhase {
    /// 尚未调用 start()
    Idle,
    /// start() 或 retry() 正在执行
    Running,
    /// 一轮调度已结束（全部成功或存在可重试的失败分片）
    Settled,
    /// 出现不可恢复的错误，不再接受 retry()
    Aborted,
}

impl OrchestratorPhase {
    fn after(result: &Result<String, UploadError>) -> Self {
        match result {
            Ok(_) | Err(UploadError::ChunksFailed { .. }) => OrchestratorPhase::Settled,
            Err(_) => OrchestratorPhase::Aborted,
        }
    }
}

/// 执行期间持有；离开作用域时写回阶段
///
/// 调用方中途丢弃 future 时阶段落到 Aborted
struct RunGuard<'a> {
    phase: &'a Mutex<OrchestratorPhase>,
    outcome: Option<OrchestratorPhase>,
}

impl<'a> RunGuard<'a> {
    fn complete(&mut self, result: &Result<String, UploadError>) {
        self.outcome = Some(OrchestratorPhase::after(result));
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        *self.phase.lock() = self.outcome.unwrap_or(OrchestratorPhase::Aborted);
    }
}

/// 编排器构建器
pub struct UploadOrchestratorBuilder {
    source: Arc<dyn ChunkSource>,
    digest: Arc<dyn DigestProvider>,
    initiator: Arc<dyn SessionInitiator>,
    transport: Arc<dyn ChunkTransport>,
    observer: Arc<dyn StatusObserver>,
    worker_count: Option<usize>,
}

impl UploadOrchestratorBuilder {
    pub fn observer(mut self, observer: Arc<dyn StatusObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// 期望的 worker 数（会被硬件并发数截断，且至少为 1）
    pub fn worker_count(mut self, worker_count: Option<usize>) -> Self {
        self.worker_count = worker_count;
        self
    }

    pub fn build(self) -> UploadOrchestrator {
        let worker_count = resolve_worker_count(self.worker_count);
        UploadOrchestrator {
            source: self.source,
            digest: self.digest,
            initiator: self.initiator,
            transport: self.transport,
            observer: self.observer,
            worker_count,
            phase: Mutex::new(OrchestratorPhase::Idle),
            session: OnceLock::new(),
            table: Arc::new(Mutex::new(ChunkTable::default())),
        }
    }
}

/// 分片上传编排器
pub struct UploadOrchestrator {
    source: Arc<dyn ChunkSource>,
    digest: Arc<dyn DigestProvider>,
    initiator: Arc<dyn SessionInitiator>,
    transport: Arc<dyn ChunkTransport>,
    observer: Arc<dyn StatusObserver>,
    worker_count: usize,
    phase: Mutex<OrchestratorPhase>,
    /// 握手成功后写入一次
    session: OnceLock<UploadSession>,
    table: Arc<Mutex<ChunkTable>>,
}

impl UploadOrchestrator {
    pub fn builder(
        source: Arc<dyn ChunkSource>,
        digest: Arc<dyn DigestProvider>,
        initiator: Arc<dyn SessionInitiator>,
        transport: Arc<dyn ChunkTransport>,
    ) -> UploadOrchestratorBuilder {
        UploadOrchestratorBuilder {
            source,
            digest,
            initiator,
            transport,
            observer: Arc::new(NoopObserver),
            worker_count: None,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    pub fn phase(&self) -> OrchestratorPhase {
        *self.phase.lock()
    }

    /// 当前会话（握手成功后才有值）
    pub fn session(&self) -> Option<&UploadSession> {
        self.session.get()
    }

    /// 分片状态快照
    pub fn chunk_snapshot(&self) -> Vec<Chunk> {
        self.table.lock().snapshot()
    }

    /// 开始上传
    ///
    /// 只能调用一次。全部分片成功时返回会话 ID；
    /// 存在失败分片时返回 `ChunksFailed`，可以随后调用 `retry()`
    pub async fn start(&self) -> Result<String, UploadError> {
        {
            let mut phase = self.phase.lock();
            if *phase != OrchestratorPhase::Idle {
                return Err(UploadError::Lifecycle(
                    "start() 只能调用一次".to_string(),
                ));
            }
            *phase = OrchestratorPhase::Running;
        }

        let mut guard = RunGuard {
            phase: &self.phase,
            outcome: None,
        };
        let result = self.run_start().await;
        guard.complete(&result);

        if let Err(e) = &result {
            if !e.is_retryable() {
                error!("上传失败: {}", e);
            }
        }
        result
    }

    /// 重传失败分片
    ///
    /// 复用 start() 建立的会话，只调度处于 error 状态的分片；
    /// 没有失败分片时直接返回会话 ID
    pub async fn retry(&self) -> Result<String, UploadError> {
        {
            let mut phase = self.phase.lock();
            match *phase {
                OrchestratorPhase::Idle => {
                    return Err(UploadError::Lifecycle(
                        "retry() 必须在 start() 之后调用".to_string(),
                    ))
                }
                OrchestratorPhase::Running => {
                    return Err(UploadError::Lifecycle(
                        "上一轮上传仍在进行中".to_string(),
                    ))
                }
                OrchestratorPhase::Aborted => {
                    return Err(UploadError::Lifecycle(
                        "上传已中止，无法重试".to_string(),
                    ))
                }
                OrchestratorPhase::Settled => *phase = OrchestratorPhase::Running,
            }
        }

        let mut guard = RunGuard {
            phase: &self.phase,
            outcome: None,
        };
        let result = self.run_retry().await;
        guard.complete(&result);
        result
    }

    fn progress(&self, message: &str) {
        notify("on_progress", || self.observer.on_progress(message));
    }

    fn dispatcher(&self, session_id: &str) -> Dispatcher {
        Dispatcher {
            session_id: session_id.to_string(),
            table: self.table.clone(),
            source: self.source.clone(),
            transport: self.transport.clone(),
            observer: self.observer.clone(),
            worker_count: self.worker_count,
        }
    }

    async fn run_start(&self) -> Result<String, UploadError> {
        let filename = self.source.name().to_string();
        let file_size = self.source.len();
        validate_file_name(&filename)?;

        info!(
            "开始上传: 文件={}, 大小={} bytes, worker 数={}",
            filename, file_size, self.worker_count
        );

        // 1. 校验和
        self.progress("正在计算文件校验和...");
        let checksum = self
            .digest
            .digest(self.source.as_ref())
            .await
            .map_err(|e| UploadError::Digest(format!("{:#}", e)))?;
        self.progress("文件校验和计算完成");

        // 2. 握手
        self.progress("正在初始化上传会话...");
        let request = InitRequest {
            filename,
            file_size,
            checksum,
        };
        let grant = self
            .initiator
            .initiate(&request)
            .await
            .map_err(|e| UploadError::SessionInit(format!("{:#}", e)))?;
        grant.validate(file_size)?;

        // 3. 切分
        let table = ChunkTable::from_partition(file_size, grant.chunk_size)?;
        let total = table.len();
        let session = UploadSession::new(request, grant);
        let session_id = session.session_id.clone();

        info!(
            "上传会话已建立: upload_id={}, 分片大小={}, 分片数={}",
            session_id, session.chunk_size, total
        );

        if self.session.set(session).is_err() {
            return Err(UploadError::Lifecycle("会话已存在".to_string()));
        }
        *self.table.lock() = table;

        notify("on_total_chunks", || self.observer.on_total_chunks(total));
        self.progress("开始上传分片...");

        // 4. 调度全部分片
        self.dispatcher(&session_id).run((0..total).collect()).await?;

        self.progress("上传完成");
        info!("✓ 上传完成: upload_id={}", session_id);
        Ok(session_id)
    }

    async fn run_retry(&self) -> Result<String, UploadError> {
        let session_id = match self.session.get() {
            Some(session) => session.session_id.clone(),
            None => {
                return Err(UploadError::Lifecycle(
                    "上传会话尚未建立".to_string(),
                ))
            }
        };

        let failed = {
            let mut table = self.table.lock();
            let failed = table.indices_with(ChunkStatus::Error);
            if failed.is_empty() {
                info!("没有失败的分片，无需重试: upload_id={}", session_id);
                return Ok(session_id);
            }

            warn!("重试 {} 个失败分片: {:?}", failed.len(), failed);
            let message = format!("正在重试 {} 个失败分片...", failed.len());
            notify("on_progress", || self.observer.on_progress(&message));

            for &index in &failed {
                if table.reset_to_pending(index) {
                    notify("on_chunk_status_change", || {
                        self.observer
                            .on_chunk_status_change(index, ChunkStatus::Pending)
                    });
                }
            }
            failed
        };

        self.dispatcher(&session_id).run(failed).await?;

        self.progress("上传完成");
        info!("✓ 重试完成，全部分片已上传: upload_id={}", session_id);
        Ok(session_id)
    }
}
