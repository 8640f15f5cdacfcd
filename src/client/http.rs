// 上传服务 HTTP 客户端
//
// 协议:
//   POST   {base}/init               JSON 握手，返回 uploadId / chunkSize / totalChunks
//   POST   {base}/chunk              multipart: uploadId, chunkNumber, file
//   GET    {base}/{uploadId}/status  查询会话状态
//   DELETE {base}/{uploadId}         放弃会话
//
// 所有请求使用 Basic 认证

use crate::client::types::{ChunkAck, InitResponse, UploadErrorKind};
use crate::config::AppConfig;
use crate::uploader::session::{InitRequest, SessionGrant, SessionInitiator};
use crate::uploader::transport::{ChunkOutcome, ChunkTransport, TransportFault};
use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{multipart, Client, Request, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

// =====================================================
// 重试配置
// =====================================================

/// 默认最大重试次数
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// 默认请求超时（秒）
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;

/// 初始退避延迟（毫秒）
const INITIAL_BACKOFF_MS: u64 = 100;

/// 最大退避延迟（毫秒）
const MAX_BACKOFF_MS: u64 = 5000;

/// 限流时的额外等待时间（毫秒）
const RATE_LIMIT_BACKOFF_MS: u64 = 10000;

/// 计算指数退避延迟
///
/// # 延迟序列
/// - retry_count=0: 100ms
/// - retry_count=1: 200ms
/// - retry_count=2: 400ms
/// - retry_count=3: 800ms
/// - 最大: 5000ms（限流时至少 10000ms）
pub fn calculate_backoff_delay(retry_count: u32, error_kind: UploadErrorKind) -> u64 {
    let base_delay = INITIAL_BACKOFF_MS.saturating_mul(2u64.saturating_pow(retry_count));
    let delay = base_delay.min(MAX_BACKOFF_MS);

    // 限流时使用更长的等待时间
    if error_kind == UploadErrorKind::RateLimited {
        delay.max(RATE_LIMIT_BACKOFF_MS)
    } else {
        delay
    }
}

/// 日志中只显示前 8 个字符（按字符截断，ID 可能含多字节字符）
fn log_prefix(value: &str) -> &str {
    value
        .char_indices()
        .nth(8)
        .map_or(value, |(end, _)| &value[..end])
}

/// 客户端参数
#[derive(Debug, Clone)]
pub struct HttpClientOptions {
    /// 服务地址（如 `http://localhost:8080/api/upload`）
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// 单次请求超时
    pub timeout: Duration,
    /// 单个分片的最大重试次数（不含首次）
    pub max_retries: u32,
}

impl HttpClientOptions {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            username: String::new(),
            password: String::new(),
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            base_url: config.server.upload_url.clone(),
            username: config.server.username.clone(),
            password: config.server.password.clone(),
            timeout: Duration::from_secs(config.upload.request_timeout_secs.max(1)),
            max_retries: config.upload.max_retries,
        }
    }
}

/// 单次分片请求的失败
struct AttemptFailure {
    kind: UploadErrorKind,
    message: String,
}

/// 上传服务客户端
#[derive(Clone)]
pub struct HttpUploadClient {
    client: Client,
    base_url: String,
    username: String,
    password: String,
    max_retries: u32,
}

impl HttpUploadClient {
    /// 创建客户端
    ///
    /// 地址只做首尾整理，非法地址在发送请求时报告为传输通道故障
    pub fn new(options: HttpClientOptions) -> Result<Self> {
        let client = Client::builder()
            .timeout(options.timeout)
            .build()
            .context("创建 HTTP 客户端失败")?;

        let base_url = options.base_url.trim().trim_end_matches('/').to_string();

        info!(
            "初始化上传客户端: url={}, 用户={}, 超时={:?}, 最大重试={}",
            base_url,
            if options.username.is_empty() {
                "(未设置)"
            } else {
                options.username.as_str()
            },
            options.timeout,
            options.max_retries
        );

        Ok(Self {
            client,
            base_url,
            username: options.username,
            password: options.password,
            max_retries: options.max_retries,
        })
    }

    /// 从配置创建，并校验服务地址
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let options = HttpClientOptions::from_config(config);
        reqwest::Url::parse(options.base_url.trim())
            .with_context(|| format!("上传服务地址无效: {:?}", options.base_url))?;
        Self::new(options)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn authorized(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder.basic_auth(&self.username, Some(&self.password))
    }

    /// 初始化上传会话
    ///
    /// 非 2xx 响应时错误信息为服务端返回的原文
    pub async fn init_session(&self, request: &InitRequest) -> Result<InitResponse> {
        info!(
            "初始化上传会话: 文件={}, 大小={}, checksum={}...",
            request.filename,
            request.file_size,
            log_prefix(&request.checksum)
        );

        let response = self
            .authorized(self.client.post(self.endpoint("init")))
            .json(request)
            .send()
            .await
            .context("初始化上传会话请求发送失败")?;

        let status = response.status();
        let response_text = response.text().await.context("读取初始化响应失败")?;

        debug!("初始化响应: status={}, body={}", status, response_text);

        if !status.is_success() {
            error!("初始化上传会话失败: status={}, body={}", status, response_text);
            if response_text.trim().is_empty() {
                anyhow::bail!("HTTP {}", status);
            }
            anyhow::bail!("{}", response_text);
        }

        let init: InitResponse = serde_json::from_str(&response_text).with_context(|| {
            format!(
                "解析初始化响应失败: status={}, body={}",
                status, response_text
            )
        })?;

        info!(
            "上传会话已创建: upload_id={}, 分片大小={}, 分片数={}",
            init.upload_id, init.chunk_size, init.total_chunks
        );

        Ok(init)
    }

    fn build_chunk_request(
        &self,
        upload_id: &str,
        index: usize,
        data: Vec<u8>,
    ) -> std::result::Result<Request, TransportFault> {
        let part = multipart::Part::bytes(data)
            .file_name("chunk.bin")
            .mime_str("application/octet-stream")
            .map_err(|e| TransportFault::new(format!("构建分片请求失败: {}", e)))?;

        let form = multipart::Form::new()
            .text("uploadId", upload_id.to_string())
            .text("chunkNumber", index.to_string())
            .part("file", part);

        self.authorized(self.client.post(self.endpoint("chunk")))
            .multipart(form)
            .build()
            .map_err(|e| TransportFault::new(format!("构建分片请求失败: {}", e)))
    }

    async fn send_chunk_once(
        &self,
        request: Request,
        index: usize,
    ) -> std::result::Result<(), AttemptFailure> {
        let response = match self.client.execute(request).await {
            Ok(response) => response,
            Err(e) => {
                return Err(AttemptFailure {
                    kind: UploadErrorKind::from_reqwest_error(&e),
                    message: format!("上传分片请求发送失败: {}", e),
                })
            }
        };

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();

        debug!(
            "上传分片响应: part={}, status={}, body={}",
            index, status, response_text
        );

        if status.is_success() {
            if let Ok(ack) = serde_json::from_str::<ChunkAck>(&response_text) {
                if !ack.is_ok() {
                    warn!("[分片#{}] 响应状态异常: {:?}", index, ack.status);
                }
            }
            return Ok(());
        }

        Err(AttemptFailure {
            kind: UploadErrorKind::from_status(status),
            message: if response_text.trim().is_empty() {
                format!("HTTP {}", status)
            } else {
                response_text
            },
        })
    }

    /// 上传单个分片（带重试）
    ///
    /// 可重试的错误按指数退避重试，最多 `max_retries` 次；
    /// 最终失败返回 `ChunkOutcome::Error`，请求无法构建时返回 `TransportFault`
    pub async fn upload_chunk(
        &self,
        upload_id: &str,
        index: usize,
        data: Vec<u8>,
    ) -> std::result::Result<ChunkOutcome, TransportFault> {
        debug!(
            "上传分片: uploadid={}..., part={}, size={}",
            log_prefix(upload_id),
            index,
            data.len()
        );

        let mut retries = 0u32;
        loop {
            let request = self.build_chunk_request(upload_id, index, data.clone())?;

            let failure = match self.send_chunk_once(request, index).await {
                Ok(()) => return Ok(ChunkOutcome::Success),
                Err(failure) => failure,
            };

            if !failure.kind.is_retriable() || retries >= self.max_retries {
                error!(
                    "[分片#{}] 上传失败: 类型={}, 已重试 {} 次, 错误={}",
                    index, failure.kind, retries, failure.message
                );
                return Ok(ChunkOutcome::Error(failure.message));
            }

            let delay = calculate_backoff_delay(retries, failure.kind);
            retries += 1;
            warn!(
                "[分片#{}] {}，{}ms 后第 {} 次重试: {}",
                index, failure.kind, delay, retries, failure.message
            );
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    /// 查询会话状态（服务端返回的描述文本）
    pub async fn session_status(&self, upload_id: &str) -> Result<String> {
        let response = self
            .authorized(
                self.client
                    .get(self.endpoint(&format!("{}/status", upload_id))),
            )
            .send()
            .await
            .context("查询会话状态请求发送失败")?;

        let status = response.status();
        let response_text = response.text().await.context("读取会话状态响应失败")?;
        if !status.is_success() {
            anyhow::bail!("查询会话状态失败: HTTP {} {}", status, response_text);
        }
        Ok(response_text)
    }

    /// 放弃上传会话（服务端删除已接收的分片）
    ///
    /// 会话已不存在时视为成功
    pub async fn abort_session(&self, upload_id: &str) -> Result<()> {
        info!("放弃上传会话: upload_id={}", upload_id);

        let response = self
            .authorized(self.client.delete(self.endpoint(upload_id)))
            .send()
            .await
            .context("放弃上传会话请求发送失败")?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        if status == StatusCode::NOT_FOUND {
            warn!("上传会话不存在，无需放弃: upload_id={}", upload_id);
            return Ok(());
        }

        let response_text = response.text().await.unwrap_or_default();
        anyhow::bail!("放弃上传会话失败: HTTP {} {}", status, response_text)
    }
}

#[async_trait]
impl SessionInitiator for HttpUploadClient {
    async fn initiate(&self, request: &InitRequest) -> Result<SessionGrant> {
        let init = self.init_session(request).await?;
        Ok(SessionGrant {
            session_id: init.upload_id,
            chunk_size: init.chunk_size,
            total_chunks: init.total_chunks,
        })
    }
}

#[async_trait]
impl ChunkTransport for HttpUploadClient {
    async fn upload(
        &self,
        session_id: &str,
        index: usize,
        data: Vec<u8>,
    ) -> std::result::Result<ChunkOutcome, TransportFault> {
        self.upload_chunk(session_id, index, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UploadError;
    use crate::uploader::digest::{sha256_hex, Sha256Digest};
    use crate::uploader::orchestrator::UploadOrchestrator;
    use crate::uploader::source::MemorySource;
    use axum::extract::{Multipart, Path, State};
    use axum::http::{HeaderMap, StatusCode as AxumStatus};
    use axum::response::{IntoResponse, Response};
    use axum::routing::{delete, get, post};
    use axum::{Json, Router};
    use parking_lot::Mutex;
    use serde_json::{json, Value};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    const CHUNK_SIZE: u64 = 300;

    #[derive(Debug, Clone)]
    struct ReceivedChunk {
        upload_id: String,
        chunk_number: usize,
        file_name: Option<String>,
        content_type: Option<String>,
        data: Vec<u8>,
    }

    /// 模拟上传服务
    #[derive(Default)]
    struct FakeServer {
        inits: Mutex<Vec<Value>>,
        auth_headers: Mutex<Vec<String>>,
        chunks: Mutex<Vec<ReceivedChunk>>,
        chunk_attempts: AtomicUsize,
        /// 分片号 → (状态码, 剩余失败次数)
        failing_chunks: Mutex<HashMap<usize, (u16, usize)>>,
        reject_init: Mutex<Option<String>>,
        /// 下发的会话 ID，未设置时为 "u-123"
        issued_id: Mutex<Option<String>>,
        deleted: Mutex<Vec<String>>,
    }

    async fn init_handler(
        State(server): State<Arc<FakeServer>>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Response {
        if let Some(auth) = headers.get("authorization").and_then(|v| v.to_str().ok()) {
            server.auth_headers.lock().push(auth.to_string());
        }
        server.inits.lock().push(body.clone());

        if let Some(message) = server.reject_init.lock().clone() {
            return (AxumStatus::BAD_REQUEST, message).into_response();
        }

        let file_size = body["fileSize"].as_u64().unwrap_or(0);
        let upload_id = server
            .issued_id
            .lock()
            .clone()
            .unwrap_or_else(|| "u-123".to_string());
        Json(json!({
            "uploadId": upload_id,
            "totalChunks": file_size.div_ceil(CHUNK_SIZE),
            "chunkSize": CHUNK_SIZE,
            "fileSize": file_size,
            "filename": body["filename"],
            "bitsetBytes": null
        }))
        .into_response()
    }

    async fn chunk_handler(
        State(server): State<Arc<FakeServer>>,
        mut multipart: Multipart,
    ) -> Response {
        server.chunk_attempts.fetch_add(1, Ordering::SeqCst);

        let mut chunk = ReceivedChunk {
            upload_id: String::new(),
            chunk_number: usize::MAX,
            file_name: None,
            content_type: None,
            data: Vec::new(),
        };
        while let Some(field) = multipart.next_field().await.unwrap() {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "uploadId" => chunk.upload_id = field.text().await.unwrap(),
                "chunkNumber" => chunk.chunk_number = field.text().await.unwrap().parse().unwrap(),
                "file" => {
                    chunk.file_name = field.file_name().map(str::to_string);
                    chunk.content_type = field.content_type().map(str::to_string);
                    chunk.data = field.bytes().await.unwrap().to_vec();
                }
                _ => {}
            }
        }

        {
            let mut failing = server.failing_chunks.lock();
            if let Some((status, remaining)) = failing.get_mut(&chunk.chunk_number) {
                if *remaining > 0 {
                    *remaining -= 1;
                    let status = AxumStatus::from_u16(*status).unwrap();
                    return (status, format!("chunk {} rejected", chunk.chunk_number))
                        .into_response();
                }
            }
        }

        let upload_id = chunk.upload_id.clone();
        server.chunks.lock().push(chunk);
        Json(json!({"status": "ok", "uploadId": upload_id})).into_response()
    }

    async fn status_handler(Path(upload_id): Path<String>) -> String {
        format!("The uploading file is in progress for the request: {}", upload_id)
    }

    async fn delete_handler(
        State(server): State<Arc<FakeServer>>,
        Path(upload_id): Path<String>,
    ) -> AxumStatus {
        if upload_id == "u-123" {
            server.deleted.lock().push(upload_id);
            AxumStatus::NO_CONTENT
        } else {
            AxumStatus::NOT_FOUND
        }
    }

    async fn spawn_server(server: Arc<FakeServer>) -> String {
        let router = Router::new()
            .route("/api/upload/init", post(init_handler))
            .route("/api/upload/chunk", post(chunk_handler))
            .route("/api/upload/:upload_id/status", get(status_handler))
            .route("/api/upload/:upload_id", delete(delete_handler))
            .with_state(server);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}/api/upload/", addr)
    }

    fn client(base_url: &str, max_retries: u32) -> HttpUploadClient {
        HttpUploadClient::new(HttpClientOptions {
            base_url: base_url.to_string(),
            username: "alice".to_string(),
            password: "secret".to_string(),
            timeout: Duration::from_secs(10),
            max_retries,
        })
        .unwrap()
    }

    fn payload(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(calculate_backoff_delay(0, UploadErrorKind::Network), 100);
        assert_eq!(calculate_backoff_delay(1, UploadErrorKind::Network), 200);
        assert_eq!(calculate_backoff_delay(2, UploadErrorKind::Network), 400);
        assert_eq!(calculate_backoff_delay(3, UploadErrorKind::Network), 800);
        assert_eq!(calculate_backoff_delay(10, UploadErrorKind::Network), 5000);
        assert_eq!(calculate_backoff_delay(64, UploadErrorKind::Network), 5000);
        assert_eq!(calculate_backoff_delay(0, UploadErrorKind::RateLimited), 10000);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = AppConfig::default();
        config.server.upload_url = "http://localhost:8080/api/upload".to_string();
        config.upload.request_timeout_secs = 5;
        config.upload.max_retries = 7;

        let options = HttpClientOptions::from_config(&config);
        assert_eq!(options.timeout, Duration::from_secs(5));
        assert_eq!(options.max_retries, 7);

        let client = HttpUploadClient::from_config(&config).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080/api/upload");

        config.server.upload_url = "not a url".to_string();
        assert!(HttpUploadClient::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_init_sends_documented_fields() {
        let server = Arc::new(FakeServer::default());
        let base = spawn_server(server.clone()).await;
        let client = client(&base, 0);

        let request = InitRequest {
            filename: "report.pdf".to_string(),
            file_size: 1000,
            checksum: sha256_hex(b"x"),
        };
        let grant = client.initiate(&request).await.unwrap();
        assert_eq!(
            grant,
            SessionGrant {
                session_id: "u-123".to_string(),
                chunk_size: 300,
                total_chunks: 4,
            }
        );

        let inits = server.inits.lock();
        assert_eq!(inits[0]["filename"], "report.pdf");
        assert_eq!(inits[0]["fileSize"], 1000);
        assert_eq!(inits[0]["checksum"], sha256_hex(b"x"));
        assert_eq!(
            server.auth_headers.lock()[0],
            "Basic YWxpY2U6c2VjcmV0"
        );
    }

    #[tokio::test]
    async fn test_init_rejection_carries_server_text() {
        let server = Arc::new(FakeServer::default());
        *server.reject_init.lock() = Some("File already uploaded".to_string());
        let base = spawn_server(server.clone()).await;

        let request = InitRequest {
            filename: "a.bin".to_string(),
            file_size: 10,
            checksum: sha256_hex(b"a"),
        };
        let err = client(&base, 0).initiate(&request).await.unwrap_err();
        assert_eq!(err.to_string(), "File already uploaded");
    }

    #[tokio::test]
    async fn test_chunk_sends_documented_fields() {
        let server = Arc::new(FakeServer::default());
        let base = spawn_server(server.clone()).await;

        let outcome = client(&base, 0)
            .upload("u-123", 2, b"hello".to_vec())
            .await
            .unwrap();
        assert_eq!(outcome, ChunkOutcome::Success);

        let chunks = server.chunks.lock();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].upload_id, "u-123");
        assert_eq!(chunks[0].chunk_number, 2);
        assert_eq!(chunks[0].file_name.as_deref(), Some("chunk.bin"));
        assert_eq!(
            chunks[0].content_type.as_deref(),
            Some("application/octet-stream")
        );
        assert_eq!(chunks[0].data, b"hello");
    }

    #[tokio::test]
    async fn test_server_error_is_retried_then_reported() {
        let server = Arc::new(FakeServer::default());
        server.failing_chunks.lock().insert(0, (500, usize::MAX));
        let base = spawn_server(server.clone()).await;

        let outcome = client(&base, 2)
            .upload("u-123", 0, b"data".to_vec())
            .await
            .unwrap();

        assert_eq!(outcome, ChunkOutcome::Error("chunk 0 rejected".to_string()));
        assert_eq!(server.chunk_attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_transient_server_error_recovers() {
        let server = Arc::new(FakeServer::default());
        server.failing_chunks.lock().insert(1, (503, 1));
        let base = spawn_server(server.clone()).await;

        let outcome = client(&base, 2)
            .upload("u-123", 1, b"data".to_vec())
            .await
            .unwrap();

        assert!(outcome.is_success());
        assert_eq!(server.chunk_attempts.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_request_is_not_retried() {
        let server = Arc::new(FakeServer::default());
        server.failing_chunks.lock().insert(0, (400, usize::MAX));
        let base = spawn_server(server.clone()).await;

        let outcome = client(&base, 5)
            .upload("u-123", 0, b"data".to_vec())
            .await
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(server.chunk_attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unbuildable_request_is_transport_fault() {
        let fault = client("not a url", 0)
            .upload("u-123", 0, b"data".to_vec())
            .await
            .unwrap_err();
        assert!(fault.message.contains("构建分片请求失败"));
    }

    #[test]
    fn test_log_prefix_respects_char_boundaries() {
        assert_eq!(log_prefix("u-123"), "u-123");
        assert_eq!(log_prefix("0123456789abcdef"), "01234567");
        assert_eq!(log_prefix("上传会话-0001"), "上传会话-000");
        assert_eq!(log_prefix(""), "");
    }

    #[tokio::test]
    async fn test_non_ascii_upload_id_with_debug_logging() {
        // 调试级别下才会格式化日志参数
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .with_test_writer()
            .finish();
        let _default = tracing::subscriber::set_default(subscriber);

        let server = Arc::new(FakeServer::default());
        *server.issued_id.lock() = Some("上传会话-0001".to_string());
        let base = spawn_server(server.clone()).await;

        let data = payload(700);
        let http = Arc::new(client(&base, 0));
        let orch = UploadOrchestrator::builder(
            Arc::new(MemorySource::new("报告.pdf", data)),
            Arc::new(Sha256Digest::new()),
            http.clone(),
            http,
        )
        .worker_count(Some(2))
        .build();

        assert_eq!(orch.start().await.unwrap(), "上传会话-0001");
        assert_eq!(orch.phase(), crate::uploader::OrchestratorPhase::Settled);

        let chunks = server.chunks.lock().clone();
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.upload_id == "上传会话-0001"));
    }

    #[tokio::test]
    async fn test_status_and_abort() {
        let server = Arc::new(FakeServer::default());
        let base = spawn_server(server.clone()).await;
        let client = client(&base, 0);

        let status = client.session_status("u-123").await.unwrap();
        assert!(status.contains("u-123"));

        client.abort_session("u-123").await.unwrap();
        client.abort_session("missing").await.unwrap();
        assert_eq!(server.deleted.lock().as_slice(), ["u-123".to_string()]);
    }

    #[tokio::test]
    async fn test_end_to_end_upload_with_retry() {
        let server = Arc::new(FakeServer::default());
        // 分片 2 第一次返回 400（不在客户端内重试）
        server.failing_chunks.lock().insert(2, (400, 1));
        let base = spawn_server(server.clone()).await;

        let data = payload(1000);
        let http = Arc::new(client(&base, 0));
        let orch = UploadOrchestrator::builder(
            Arc::new(MemorySource::new("report.pdf", data.clone())),
            Arc::new(Sha256Digest::new()),
            http.clone(),
            http,
        )
        .worker_count(Some(2))
        .build();

        assert_eq!(
            orch.start().await.unwrap_err(),
            UploadError::ChunksFailed { indices: vec![2] }
        );
        assert_eq!(orch.retry().await.unwrap(), "u-123");

        // 服务端按分片号重组后与原文件一致
        let mut chunks = server.chunks.lock().clone();
        chunks.sort_by_key(|c| c.chunk_number);
        assert_eq!(
            chunks.iter().map(|c| c.chunk_number).collect::<Vec<_>>(),
            vec![0, 1, 2, 3]
        );
        let reassembled: Vec<u8> = chunks.into_iter().flat_map(|c| c.data).collect();
        assert_eq!(reassembled, data);
        assert_eq!(server.inits.lock()[0]["checksum"], sha256_hex(&data));
    }
}
