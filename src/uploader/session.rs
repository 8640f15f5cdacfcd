// 上传会话
//
// 会话由服务端在握手时分配：session_id + 固定分片大小 + 分片总数，
// 之后所有 retry 都复用同一个会话

use crate::error::UploadError;
use crate::uploader::chunk::expected_chunk_count;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 会话初始化请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitRequest {
    /// 文件名
    pub filename: String,
    /// 文件大小
    pub file_size: u64,
    /// 整个文件的 SHA-256
    pub checksum: String,
}

/// 服务端分配的会话参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionGrant {
    pub session_id: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

impl SessionGrant {
    /// 校验握手结果是否自洽
    ///
    /// 会话 ID 不能为空，分片大小大于 0，且 total_chunks == ceil(file_size / chunk_size)
    pub fn validate(&self, file_size: u64) -> Result<(), UploadError> {
        if self.session_id.trim().is_empty() {
            return Err(UploadError::SessionInit(
                "服务端未返回上传 ID".to_string(),
            ));
        }
        if self.chunk_size == 0 {
            return Err(UploadError::SessionInit(
                "服务端返回的分片大小为 0".to_string(),
            ));
        }

        let expected = expected_chunk_count(file_size, self.chunk_size);
        if self.total_chunks != expected {
            return Err(UploadError::SessionInit(format!(
                "分片数量不一致: 服务端={}, 期望={} (文件大小={}, 分片大小={})",
                self.total_chunks, expected, file_size, self.chunk_size
            )));
        }

        Ok(())
    }
}

/// 已建立的上传会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadSession {
    pub session_id: String,
    pub filename: String,
    pub file_size: u64,
    pub checksum: String,
    pub chunk_size: u64,
    pub total_chunks: u64,
}

impl UploadSession {
    pub fn new(request: InitRequest, grant: SessionGrant) -> Self {
        Self {
            session_id: grant.session_id,
            filename: request.filename,
            file_size: request.file_size,
            checksum: request.checksum,
            chunk_size: grant.chunk_size,
            total_chunks: grant.total_chunks,
        }
    }
}

/// 会话初始化（握手）
#[async_trait]
pub trait SessionInitiator: Send + Sync {
    /// 失败时返回的错误信息会原样带入 `UploadError::SessionInit`
    async fn initiate(&self, request: &InitRequest) -> Result<SessionGrant>;
}

/// 校验上传文件名
///
/// 不允许空文件名、路径分隔符和 NUL 字符
pub fn validate_file_name(name: &str) -> Result<(), UploadError> {
    if name.trim().is_empty() {
        return Err(UploadError::Configuration("文件名不能为空".to_string()));
    }
    if name.contains('/') || name.contains('\\') || name.contains('\0') {
        return Err(UploadError::Configuration(format!(
            "文件名包含非法字符: {:?}",
            name
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grant(session_id: &str, chunk_size: u64, total_chunks: u64) -> SessionGrant {
        SessionGrant {
            session_id: session_id.to_string(),
            chunk_size,
            total_chunks,
        }
    }

    #[test]
    fn test_grant_validation() {
        assert!(grant("abc", 300, 4).validate(1000).is_ok());
        assert!(grant("abc", 300, 0).validate(0).is_ok());

        assert!(matches!(
            grant("", 300, 4).validate(1000),
            Err(UploadError::SessionInit(_))
        ));
        assert!(matches!(
            grant("abc", 0, 4).validate(1000),
            Err(UploadError::SessionInit(_))
        ));
        assert!(matches!(
            grant("abc", 300, 3).validate(1000),
            Err(UploadError::SessionInit(_))
        ));
    }

    #[test]
    fn test_validate_file_name() {
        assert!(validate_file_name("report.pdf").is_ok());
        assert!(validate_file_name("中文 文件.bin").is_ok());

        assert!(validate_file_name("").is_err());
        assert!(validate_file_name("   ").is_err());
        assert!(validate_file_name("a/b.txt").is_err());
        assert!(validate_file_name("a\\b.txt").is_err());
        assert!(validate_file_name("a\0b").is_err());
    }

    #[test]
    fn test_init_request_wire_format() {
        let request = InitRequest {
            filename: "a.bin".to_string(),
            file_size: 1000,
            checksum: "deadbeef".to_string(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["filename"], "a.bin");
        assert_eq!(json["fileSize"], 1000);
        assert_eq!(json["checksum"], "deadbeef");
    }
}
