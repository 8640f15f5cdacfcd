// 上传服务 API 数据类型

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 初始化上传会话响应
///
/// 响应示例:
/// ```json
/// {
///   "uploadId": "2c4f8a3e-...",
///   "totalChunks": 4,
///   "chunkSize": 300,
///   "fileSize": 1000,
///   "filename": "report.pdf",
///   "checksum": "9f86d081..."
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitResponse {
    /// 上传ID（会话标识）
    pub upload_id: String,

    /// 分片总数
    pub total_chunks: u64,

    /// 服务端决定的分片大小
    pub chunk_size: u64,

    /// 文件大小
    #[serde(default)]
    pub file_size: u64,

    /// 文件名
    #[serde(default)]
    pub filename: String,

    /// 服务端记录的校验和
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// 上传分片响应（`{"status": "ok", "uploadId": "..."}`）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkAck {
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub upload_id: String,
}

impl ChunkAck {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// 单次请求的错误类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadErrorKind {
    /// 网络错误（可重试）
    Network,
    /// 超时（可重试）
    Timeout,
    /// 服务器错误（可重试）
    ServerError,
    /// 限流（可重试，需要更长等待时间）
    RateLimited,
    /// 参数错误（不可重试）
    BadRequest,
    /// 认证失败或权限不足（不可重试）
    Forbidden,
    /// 会话不存在（不可重试）
    NotFound,
    /// 未知错误
    Unknown,
}

impl UploadErrorKind {
    /// 是否可重试
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            UploadErrorKind::Network
                | UploadErrorKind::Timeout
                | UploadErrorKind::ServerError
                | UploadErrorKind::RateLimited
        )
    }

    /// 从 HTTP 状态码转换
    pub fn from_status(status: StatusCode) -> Self {
        match status.as_u16() {
            408 => UploadErrorKind::Timeout,
            429 => UploadErrorKind::RateLimited,
            401 | 403 => UploadErrorKind::Forbidden,
            404 | 410 => UploadErrorKind::NotFound,
            400 | 409 | 413 | 415 | 422 => UploadErrorKind::BadRequest,
            500..=599 => UploadErrorKind::ServerError,
            _ => UploadErrorKind::Unknown,
        }
    }

    /// 从请求发送错误转换
    pub fn from_reqwest_error(error: &reqwest::Error) -> Self {
        if error.is_timeout() {
            return UploadErrorKind::Timeout;
        }
        if error.is_connect() || error.is_request() || error.is_body() {
            return UploadErrorKind::Network;
        }
        if let Some(status) = error.status() {
            return Self::from_status(status);
        }

        let error_str = error.to_string().to_lowercase();
        if error_str.contains("timeout") || error_str.contains("timed out") {
            UploadErrorKind::Timeout
        } else if error_str.contains("connection")
            || error_str.contains("network")
            || error_str.contains("dns")
        {
            UploadErrorKind::Network
        } else {
            UploadErrorKind::Unknown
        }
    }
}

impl fmt::Display for UploadErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UploadErrorKind::Network => "网络错误",
            UploadErrorKind::Timeout => "超时",
            UploadErrorKind::ServerError => "服务器错误",
            UploadErrorKind::RateLimited => "限流",
            UploadErrorKind::BadRequest => "参数错误",
            UploadErrorKind::Forbidden => "权限不足",
            UploadErrorKind::NotFound => "会话不存在",
            UploadErrorKind::Unknown => "未知错误",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_response_ignores_unknown_fields() {
        let json = r#"{
            "uploadId": "abc",
            "totalChunks": 4,
            "chunkSize": 300,
            "fileSize": 1000,
            "filename": "a.bin",
            "bitsetBytes": "AAA=",
            "missingChunkNumbers": null
        }"#;
        let resp: InitResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.upload_id, "abc");
        assert_eq!(resp.total_chunks, 4);
        assert_eq!(resp.chunk_size, 300);
        assert_eq!(resp.checksum, None);
    }

    #[test]
    fn test_init_response_rejects_negative_sizes() {
        let json = r#"{"uploadId": "abc", "totalChunks": -1, "chunkSize": 300}"#;
        assert!(serde_json::from_str::<InitResponse>(json).is_err());
    }

    #[test]
    fn test_chunk_ack() {
        let ack: ChunkAck = serde_json::from_str(r#"{"status":"ok","uploadId":"u1"}"#).unwrap();
        assert!(ack.is_ok());
        assert_eq!(ack.upload_id, "u1");
        assert!(!ChunkAck::default().is_ok());
    }

    #[test]
    fn test_error_kind_from_status() {
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::INTERNAL_SERVER_ERROR),
            UploadErrorKind::ServerError
        );
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::TOO_MANY_REQUESTS),
            UploadErrorKind::RateLimited
        );
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::UNAUTHORIZED),
            UploadErrorKind::Forbidden
        );
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::NOT_FOUND),
            UploadErrorKind::NotFound
        );
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::BAD_REQUEST),
            UploadErrorKind::BadRequest
        );
        assert_eq!(
            UploadErrorKind::from_status(StatusCode::IM_A_TEAPOT),
            UploadErrorKind::Unknown
        );
    }

    #[test]
    fn test_retriable_kinds() {
        assert!(UploadErrorKind::Network.is_retriable());
        assert!(UploadErrorKind::Timeout.is_retriable());
        assert!(UploadErrorKind::ServerError.is_retriable());
        assert!(UploadErrorKind::RateLimited.is_retriable());

        assert!(!UploadErrorKind::BadRequest.is_retriable());
        assert!(!UploadErrorKind::Forbidden.is_retriable());
        assert!(!UploadErrorKind::NotFound.is_retriable());
        assert!(!UploadErrorKind::Unknown.is_retriable());
    }
}
