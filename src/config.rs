use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::features::export::ExportSettings;

/// Cloudflare API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudflareConfig {
    /// API 基地址
    #[serde(default = "CloudflareConfig::default_base_url")]
    pub base_url: String,
    /// 单次请求超时（秒）
    #[serde(default = "CloudflareConfig::default_timeout")]
    pub timeout_secs: u64,
    /// User-Agent
    #[serde(default = "CloudflareConfig::default_user_agent")]
    pub user_agent: String,
}

impl CloudflareConfig {
    fn default_base_url() -> String {
        "https://api.cloudflare.com/client/v4".to_string()
    }
    fn default_timeout() -> u64 {
        30
    }
    fn default_user_agent() -> String {
        format!("kv-export/{}", env!("CARGO_PKG_VERSION"))
    }

    /// 获取请求超时时间
    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for CloudflareConfig {
    fn default() -> Self {
        Self {
            base_url: Self::default_base_url(),
            timeout_secs: Self::default_timeout(),
            user_agent: Self::default_user_agent(),
        }
    }
}

/// 导出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// 每页键数量（API 上限 1000）
    #[serde(default = "ExportConfig::default_page_limit")]
    pub page_limit: u32,
    /// 每批并发读取的键数量
    #[serde(default = "ExportConfig::default_batch_size")]
    pub batch_size: usize,
    /// 冷却前允许的请求数
    #[serde(default = "ExportConfig::default_request_budget")]
    pub request_budget: u32,
    /// 冷却时长（秒）
    #[serde(default = "ExportConfig::default_cooldown")]
    pub cooldown_secs: u64,
}

impl ExportConfig {
    fn default_page_limit() -> u32 {
        1000
    }
    fn default_batch_size() -> usize {
        100
    }
    fn default_request_budget() -> u32 {
        1200
    }
    fn default_cooldown() -> u64 {
        5 * 60
    }

    /// 转换为导出协调器参数
    pub fn to_settings(&self) -> ExportSettings {
        ExportSettings {
            page_limit: self.page_limit,
            batch_size: self.batch_size,
            request_budget: self.request_budget,
            cooldown: Duration::from_secs(self.cooldown_secs),
        }
    }
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            page_limit: Self::default_page_limit(),
            batch_size: Self::default_batch_size(),
            request_budget: Self::default_request_budget(),
            cooldown_secs: Self::default_cooldown(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别（RUST_LOG 未设置时生效）
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
    /// 日志格式：full|compact
    #[serde(default = "LoggingConfig::default_format")]
    pub format: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "kv_export=info".to_string()
    }
    fn default_format() -> String {
        "full".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
            format: Self::default_format(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub cloudflare: CloudflareConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    ///
    /// 配置文件可缺省；API 令牌不从配置文件读取。
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::get_config_path())
    }

    /// 从指定路径加载配置（文件不存在时仅使用默认值与环境变量）
    pub fn load_from(config_path: PathBuf) -> Result<Self, ConfigError> {
        let path = config_path
            .to_str()
            .ok_or_else(|| ConfigError::Message(format!("配置路径不是合法 UTF-8: {config_path:?}")))?;

        let builder = ConfigBuilder::builder()
            .add_source(File::with_name(path).required(false))
            // 支持环境变量覆盖，例如：APP_EXPORT__BATCH_SIZE=50
            .add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        builder.try_deserialize()
    }

    /// 获取配置文件路径
    fn get_config_path() -> PathBuf {
        PathBuf::from("config.toml")
    }
}
