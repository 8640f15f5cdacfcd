// 配置管理模块

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

/// 默认配置文件路径
pub const DEFAULT_CONFIG_PATH: &str = "config/app.toml";

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传服务配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 上传服务地址（如 http://localhost:8080/api/upload）
    #[serde(default = "default_upload_url")]
    pub upload_url: String,
    /// Basic 认证用户名
    #[serde(default)]
    pub username: String,
    /// Basic 认证密码
    #[serde(default)]
    pub password: String,
}

fn default_upload_url() -> String {
    "http://localhost:8080/api/upload".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            upload_url: default_upload_url(),
            username: String::new(),
            password: String::new(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 并发 worker 数（不填则使用 CPU 核数，且不会超过 CPU 核数）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker_count: Option<usize>,
    /// 单个分片请求失败后的重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 单次请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 上传结束后自动重传失败分片的轮数（0 表示不自动重传）
    #[serde(default)]
    pub retry_rounds: u32,
}

fn default_max_retries() -> u32 {
    2
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            worker_count: None,
            max_retries: default_max_retries(),
            request_timeout_secs: default_request_timeout_secs(),
            retry_rounds: 0,
        }
    }
}

impl AppConfig {
    /// 检查配置是否可用
    pub fn validate(&self) -> Result<()> {
        if self.server.upload_url.trim().is_empty() {
            anyhow::bail!("上传服务地址不能为空");
        }
        if self.upload.worker_count == Some(0) {
            anyhow::bail!("worker_count 必须大于 0");
        }
        if self.upload.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs 必须大于 0");
        }
        Ok(())
    }

    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config.validate().context("配置文件校验失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.validate().context("保存配置失败")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);

        Ok(())
    }

    /// 加载配置，仅在文件不存在时使用默认配置
    ///
    /// 文件存在但无法解析或校验失败时返回错误
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if !fs::try_exists(path).await.unwrap_or(false) {
            tracing::info!("配置文件不存在，使用默认配置: {}", path);
            return Ok(Self::default());
        }

        let config = Self::load_from_file(path)
            .await
            .with_context(|| format!("加载配置文件失败: {}", path))?;
        tracing::info!("配置文件加载成功: {}", path);
        Ok(config)
    }
}
