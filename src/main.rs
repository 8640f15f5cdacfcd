use anyhow::Context;
use chunked_upload::{
    client::HttpUploadClient,
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    logging,
    uploader::{FileSource, Sha256Digest, TracingObserver, UploadOrchestrator},
    UploadError,
};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};

/// 命令行参数（覆盖配置文件中的同名配置）
#[derive(Parser, Debug)]
#[command(name = "chunked-upload", version, about = "分片并发上传文件")]
struct Cli {
    /// 待上传的文件
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// 上传服务地址
    #[arg(long, value_name = "URL")]
    upload_url: Option<String>,

    /// Basic 认证用户名
    #[arg(short, long)]
    username: Option<String>,

    /// Basic 认证密码
    #[arg(short, long)]
    password: Option<String>,

    /// 并发 worker 数
    #[arg(short, long, value_name = "N")]
    workers: Option<usize>,

    /// 单个分片请求的最大重试次数
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// 上传结束后自动重传失败分片的轮数
    #[arg(long, value_name = "N")]
    retry_rounds: Option<u32>,

    /// 配置文件路径（默认 config/app.toml，默认路径下文件不存在时使用内置配置）
    #[arg(short, long, value_name = "PATH")]
    config: Option<String>,
}

impl Cli {
    fn apply_to(&self, config: &mut AppConfig) {
        if let Some(url) = &self.upload_url {
            config.server.upload_url = url.clone();
        }
        if let Some(username) = &self.username {
            config.server.username = username.clone();
        }
        if let Some(password) = &self.password {
            config.server.password = password.clone();
        }
        if self.workers.is_some() {
            config.upload.worker_count = self.workers;
        }
        if let Some(max_retries) = self.max_retries {
            config.upload.max_retries = max_retries;
        }
        if let Some(retry_rounds) = self.retry_rounds {
            config.upload.retry_rounds = retry_rounds;
        }
    }
}

/// 上传，失败分片按配置自动重传若干轮
async fn upload_with_retry_rounds(
    orchestrator: &UploadOrchestrator,
    retry_rounds: u32,
) -> Result<String, UploadError> {
    let mut result = orchestrator.start().await;

    let mut round = 0;
    while round < retry_rounds {
        match &result {
            Err(e) if e.is_retryable() => {
                round += 1;
                warn!(
                    "第 {}/{} 轮重传，失败分片: {:?}",
                    round,
                    retry_rounds,
                    e.failed_indices()
                );
                result = orchestrator.retry().await;
            }
            _ => break,
        }
    }

    result
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 显式指定的配置文件必须存在
    let loaded = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)
            .await
            .with_context(|| format!("加载配置文件失败: {}", path)),
        None => AppConfig::load_or_default(DEFAULT_CONFIG_PATH).await,
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(e) => {
            // 配置不可用时按默认日志配置输出错误
            let _log_guard = logging::init_logging(&AppConfig::default().log);
            error!("配置加载失败: {:#}", e);
            return Err(e);
        }
    };
    cli.apply_to(&mut config);

    // 🔥 初始化日志系统（必须保持 _log_guard 存活）
    let _log_guard = logging::init_logging(&config.log);

    config.validate().context("配置无效")?;

    info!("========================================");
    info!("  chunked-upload v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");

    let source = FileSource::open(&cli.file)
        .await
        .with_context(|| format!("无法打开待上传文件: {:?}", cli.file))?;
    let client = Arc::new(HttpUploadClient::from_config(&config)?);

    let orchestrator = UploadOrchestrator::builder(
        Arc::new(source),
        Arc::new(Sha256Digest::new()),
        client.clone(),
        client.clone(),
    )
    .observer(Arc::new(TracingObserver::new()))
    .worker_count(config.upload.worker_count)
    .build();

    match upload_with_retry_rounds(&orchestrator, config.upload.retry_rounds).await {
        Ok(upload_id) => {
            info!("✓ 文件上传成功: upload_id={}", upload_id);
            println!("{}", upload_id);
            Ok(())
        }
        Err(e) => {
            error!("文件上传失败: {}", e);

            // 不可恢复的错误：通知服务端放弃会话
            if !e.is_retryable() {
                if let Some(session) = orchestrator.session() {
                    if let Err(abort_err) = client.abort_session(&session.session_id).await {
                        warn!("放弃上传会话失败: {:#}", abort_err);
                    }
                }
            }

            Err(e.into())
        }
    }
}
