// 上传分片管理
//
// 分片在会话握手之后按服务端给出的 chunk_size 切分，
// 索引从 0 开始递增，整个会话期间（包括 retry）保持不变
//
// 分片状态机：
// - pending → sending：被某个 worker 取出
// - sending → success / error：传输调用返回
// - error → pending：retry 重置
// - success 为终态

use crate::error::UploadError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Range;
use tracing::{info, warn};

/// 分片状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    /// 等待发送
    Pending,
    /// 发送中
    Sending,
    /// 发送成功
    Success,
    /// 发送失败（可重试）
    Error,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Sending => "sending",
            ChunkStatus::Success => "success",
            ChunkStatus::Error => "error",
        }
    }

    /// 是否为一轮调度结束时允许的状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, ChunkStatus::Success | ChunkStatus::Error)
    }
}

impl fmt::Display for ChunkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分片描述（索引 + 字节范围）
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkDescriptor {
    /// 分片索引
    pub index: usize,
    /// 字节范围 [start, end)
    pub range: Range<u64>,
}

impl ChunkDescriptor {
    pub fn new(index: usize, range: Range<u64>) -> Self {
        Self { index, range }
    }

    /// 分片大小
    pub fn len(&self) -> u64 {
        self.range.end - self.range.start
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 计算分片数量：ceil(file_size / chunk_size)
pub fn expected_chunk_count(file_size: u64, chunk_size: u64) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    file_size.div_ceil(chunk_size)
}

/// 切分文件
///
/// # 参数
/// * `file_size` - 文件大小
/// * `chunk_size` - 分片大小（必须大于 0）
///
/// # 返回
/// 按索引升序排列、首尾相接且不重叠、覆盖 [0, file_size) 的分片列表
pub fn partition(file_size: u64, chunk_size: u64) -> Result<Vec<ChunkDescriptor>, UploadError> {
    if chunk_size == 0 {
        return Err(UploadError::Configuration(
            "分片大小必须大于 0".to_string(),
        ));
    }

    let mut chunks = Vec::with_capacity(expected_chunk_count(file_size, chunk_size) as usize);
    let mut offset = 0u64;
    let mut index = 0usize;

    while offset < file_size {
        let end = offset.saturating_add(chunk_size).min(file_size);
        chunks.push(ChunkDescriptor::new(index, offset..end));
        offset = end;
        index += 1;
    }

    Ok(chunks)
}

/// 分片记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub descriptor: ChunkDescriptor,
    pub status: ChunkStatus,
    /// 已发起的传输次数（每次 pending → sending 加一）
    pub attempts: u32,
    /// 最近一次失败原因
    pub last_error: Option<String>,
}

impl Chunk {
    pub fn new(descriptor: ChunkDescriptor) -> Self {
        Self {
            descriptor,
            status: ChunkStatus::Pending,
            attempts: 0,
            last_error: None,
        }
    }

    pub fn index(&self) -> usize {
        self.descriptor.index
    }

    pub fn size(&self) -> u64 {
        self.descriptor.len()
    }
}

/// 分片表
///
/// 按索引存放所有分片记录，只有调度循环会修改它；
/// 外部观察者只能拿到 `snapshot()` 的拷贝
#[derive(Debug, Default)]
pub struct ChunkTable {
    chunks: Vec<Chunk>,
    total_size: u64,
}

impl ChunkTable {
    pub fn new(descriptors: Vec<ChunkDescriptor>) -> Self {
        let total_size = descriptors.iter().map(|d| d.len()).sum();
        let chunks: Vec<Chunk> = descriptors.into_iter().map(Chunk::new).collect();

        info!(
            "创建分片表: 文件大小={} bytes, 分片数量={}",
            total_size,
            chunks.len()
        );

        Self { chunks, total_size }
    }

    /// 切分文件并创建分片表
    pub fn from_partition(file_size: u64, chunk_size: u64) -> Result<Self, UploadError> {
        Ok(Self::new(partition(file_size, chunk_size)?))
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Chunk> {
        self.chunks.get(index)
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn status(&self, index: usize) -> Option<ChunkStatus> {
        self.chunks.get(index).map(|c| c.status)
    }

    /// pending → sending
    pub fn mark_sending(&mut self, index: usize) -> bool {
        let ok = self.transition(index, ChunkStatus::Pending, ChunkStatus::Sending);
        if ok {
            self.chunks[index].attempts += 1;
        }
        ok
    }

    /// sending → success
    pub fn mark_success(&mut self, index: usize) -> bool {
        let ok = self.transition(index, ChunkStatus::Sending, ChunkStatus::Success);
        if ok {
            self.chunks[index].last_error = None;
        }
        ok
    }

    /// sending → error
    pub fn mark_error(&mut self, index: usize, reason: impl Into<String>) -> bool {
        let ok = self.transition(index, ChunkStatus::Sending, ChunkStatus::Error);
        if ok {
            self.chunks[index].last_error = Some(reason.into());
        }
        ok
    }

    /// error → pending（retry 时调用）
    pub fn reset_to_pending(&mut self, index: usize) -> bool {
        self.transition(index, ChunkStatus::Error, ChunkStatus::Pending)
    }

    fn transition(&mut self, index: usize, from: ChunkStatus, to: ChunkStatus) -> bool {
        match self.chunks.get_mut(index) {
            Some(chunk) if chunk.status == from => {
                chunk.status = to;
                true
            }
            Some(chunk) => {
                warn!(
                    "非法的分片状态转换: #{} {} -> {}（当前 {}）",
                    index, from, to, chunk.status
                );
                false
            }
            None => {
                warn!("分片索引越界: #{} (共 {} 个)", index, self.chunks.len());
                false
            }
        }
    }

    /// 处于指定状态的分片索引（升序）
    pub fn indices_with(&self, status: ChunkStatus) -> Vec<usize> {
        self.chunks
            .iter()
            .filter(|c| c.status == status)
            .map(|c| c.index())
            .collect()
    }

    pub fn count(&self, status: ChunkStatus) -> usize {
        self.chunks.iter().filter(|c| c.status == status).count()
    }

    /// 已上传成功的字节数
    pub fn uploaded_bytes(&self) -> u64 {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Success)
            .map(|c| c.size())
            .sum()
    }

    /// 上传进度（百分比）
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return if self.is_completed() { 100.0 } else { 0.0 };
        }
        (self.uploaded_bytes() as f64 / self.total_size as f64) * 100.0
    }

    /// 是否全部成功
    pub fn is_completed(&self) -> bool {
        self.chunks.iter().all(|c| c.status == ChunkStatus::Success)
    }

    pub fn snapshot(&self) -> Vec<Chunk> {
        self.chunks.clone()
    }
}
