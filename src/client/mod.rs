// 上传服务客户端模块

pub mod http;
pub mod types;

pub use http::{calculate_backoff_delay, HttpClientOptions, HttpUploadClient};
pub use types::{ChunkAck, InitResponse, UploadErrorKind};
