// 分片数据来源
//
// 调度循环只通过 ChunkSource 读取分片字节，
// 文件读取放在阻塞线程池中执行，避免占用异步 worker

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::io::{Read, Seek, SeekFrom};
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

/// 待上传文件的字节来源
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// 文件名（用于会话初始化）
    fn name(&self) -> &str;

    /// 文件总大小
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 读取 [start, end) 范围内的字节
    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>>;
}

/// 本地文件
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    name: String,
    size: u64,
}

impl FileSource {
    /// 打开本地文件（只读取元数据，实际数据按需读取）
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("无法读取文件元数据: {:?}", path))?;

        if !metadata.is_file() {
            anyhow::bail!("不是普通文件: {:?}", path);
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .with_context(|| format!("无法获取文件名: {:?}", path))?;

        Ok(Self {
            path,
            name,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.size
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        let path = self.path.clone();
        let start = range.start;
        let size = range.end.saturating_sub(range.start) as usize;

        let buffer = tokio::task::spawn_blocking(move || -> Result<Vec<u8>> {
            let mut file =
                std::fs::File::open(&path).with_context(|| format!("无法打开文件: {:?}", path))?;
            file.seek(SeekFrom::Start(start)).context("文件定位失败")?;

            let mut buffer = vec![0u8; size];
            file.read_exact(&mut buffer).context("读取分片数据失败")?;
            Ok(buffer)
        })
        .await
        .context("读取分片任务执行失败")??;

        debug!(
            "读取数据: {:?} bytes={}-{}, 大小={} bytes",
            self.path,
            range.start,
            range.end.saturating_sub(1),
            buffer.len()
        );

        Ok(buffer)
    }
}

/// 内存数据（测试及小文件场景）
#[derive(Debug, Clone)]
pub struct MemorySource {
    name: String,
    data: Arc<[u8]>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            data: data.into(),
        }
    }
}

#[async_trait]
impl ChunkSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    async fn read_range(&self, range: Range<u64>) -> Result<Vec<u8>> {
        let start = range.start as usize;
        let end = range.end as usize;
        self.data
            .get(start..end)
            .map(|bytes| bytes.to_vec())
            .with_context(|| format!("读取范围越界: {}..{} (共 {} bytes)", start, end, self.data.len()))
    }
}
