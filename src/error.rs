// 上传错误类型
//
// 分片级别的失败只体现在分片状态上（可通过 retry 恢复），
// 这里只描述会终止 start()/retry() 的错误

use thiserror::Error;

/// 上传流程错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    /// 参数非法（分片大小为 0、文件名非法等），不可重试
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 生命周期调用顺序错误（重复 start、start 之前 retry、并发 retry 等）
    #[error("生命周期错误: {0}")]
    Lifecycle(String),

    /// 计算文件校验和失败，不可重试
    #[error("计算校验和失败: {0}")]
    Digest(String),

    /// 会话初始化失败（携带服务端返回的信息），不可重试
    #[error("初始化上传会话失败: {0}")]
    SessionInit(String),

    /// 本轮结束后仍有分片处于 error 状态，可通过 retry() 重传
    #[error("{} 个分片上传失败: {:?}", .indices.len(), .indices)]
    ChunksFailed { indices: Vec<usize> },

    /// 传输通道本身故障，整轮中止，不可通过 retry() 恢复
    #[error("传输通道故障: {0}")]
    TransportFault(String),
}

impl UploadError {
    /// 是否可以通过 retry() 恢复
    pub fn is_retryable(&self) -> bool {
        matches!(self, UploadError::ChunksFailed { .. })
    }

    /// 失败分片索引（仅 ChunksFailed 有值）
    pub fn failed_indices(&self) -> &[usize] {
        match self {
            UploadError::ChunksFailed { indices } => indices,
            _ => &[],
        }
    }
}
