// 分片传输
//
// 单个分片的字节传输由外部实现；调度循环只关心两种结果：
// - ChunkOutcome：分片级别的成功/失败（失败可 retry）
// - TransportFault：传输通道本身故障，整轮立即中止

use async_trait::async_trait;
use thiserror::Error;

/// 单个分片的传输结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Success,
    /// 失败原因
    Error(String),
}

impl ChunkOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ChunkOutcome::Success)
    }
}

/// 传输通道故障（不可通过 retry 恢复）
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportFault {
    pub message: String,
}

impl TransportFault {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// 分片传输
///
/// 必须支持对不同分片索引的并发调用；每次调用最终都要返回
/// `ChunkOutcome` 或 `TransportFault` 之一
#[async_trait]
pub trait ChunkTransport: Send + Sync {
    async fn upload(
        &self,
        session_id: &str,
        index: usize,
        data: Vec<u8>,
    ) -> Result<ChunkOutcome, TransportFault>;
}
