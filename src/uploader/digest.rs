// 文件校验和
//
// 服务端用 SHA-256（小写十六进制）校验合并后的文件，
// 会话初始化前需要先算出整个文件的校验和

use crate::uploader::source::ChunkSource;
use anyhow::Result;
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;

/// 计算校验和时每次读取的窗口大小: 4MB
pub const DIGEST_WINDOW_SIZE: u64 = 4 * 1024 * 1024;

/// 校验和计算
#[async_trait]
pub trait DigestProvider: Send + Sync {
    /// 计算整个文件的校验和
    async fn digest(&self, source: &dyn ChunkSource) -> Result<String>;
}

/// 计算字节数组的 SHA-256（小写十六进制）
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// SHA-256 校验和
///
/// 按窗口顺序读取，避免一次性把整个文件读进内存
#[derive(Debug, Clone)]
pub struct Sha256Digest {
    window_size: u64,
}

impl Sha256Digest {
    pub fn new() -> Self {
        Self::with_window_size(DIGEST_WINDOW_SIZE)
    }

    pub fn with_window_size(window_size: u64) -> Self {
        Self {
            window_size: window_size.max(1),
        }
    }
}

impl Default for Sha256Digest {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DigestProvider for Sha256Digest {
    async fn digest(&self, source: &dyn ChunkSource) -> Result<String> {
        let total = source.len();
        let mut hasher = Sha256::new();
        let mut offset = 0u64;

        while offset < total {
            let end = offset.saturating_add(self.window_size).min(total);
            let window = source.read_range(offset..end).await?;
            hasher.update(&window);
            offset = end;
        }

        let checksum = hex::encode(hasher.finalize());
        debug!(
            "校验和计算完成: name={}, size={}, sha256={}",
            source.name(),
            total,
            checksum
        );

        Ok(checksum)
    }
}
