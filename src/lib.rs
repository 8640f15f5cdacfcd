// Chunked Upload Library
// 分片上传客户端核心库

// 错误类型
pub mod error;

// 配置管理模块
pub mod config;

// 日志系统
pub mod logging;

// HTTP 上传客户端
pub mod client;

// 分片上传模块
pub mod uploader;

// 导出常用类型
pub use client::{HttpUploadClient, UploadErrorKind};
pub use config::AppConfig;
pub use error::UploadError;
pub use uploader::{
    ChunkSource, ChunkStatus, ChunkTransport, DigestProvider, FileSource, OrchestratorPhase,
    SessionInitiator, StatusObserver, UploadOrchestrator,
};
