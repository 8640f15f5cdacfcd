// 分片上传模块
//
// - 按服务端分配的分片大小切分文件
// - 固定数量的 worker 共享 FIFO 队列并发上传
// - 分片失败不影响其他分片，retry() 只重传失败分片
// - 传输层、校验和、握手都通过 trait 注入

pub mod chunk;
pub mod digest;
pub mod observer;
pub mod orchestrator;
pub mod scheduler;
pub mod session;
pub mod source;
pub mod throttle;
pub mod transport;

pub use chunk::{expected_chunk_count, partition, Chunk, ChunkDescriptor, ChunkStatus, ChunkTable};
pub use digest::{sha256_hex, DigestProvider, Sha256Digest, DIGEST_WINDOW_SIZE};
pub use observer::{ChannelObserver, NoopObserver, StatusObserver, TracingObserver, UploadEvent};
pub use orchestrator::{OrchestratorPhase, UploadOrchestrator, UploadOrchestratorBuilder};
pub use scheduler::{available_parallelism_hint, resolve_worker_count, DEFAULT_WORKER_COUNT};
pub use session::{validate_file_name, InitRequest, SessionGrant, SessionInitiator, UploadSession};
pub use source::{ChunkSource, FileSource, MemorySource};
pub use throttle::ProgressThrottler;
pub use transport::{ChunkOutcome, ChunkTransport, TransportFault};
