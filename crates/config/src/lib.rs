//! 统一配置中心
//!
//! 提供聊天服务的全局配置管理，包括：
//! - 服务监听地址
//! - 数据库连接
//! - 广播中心与连接心跳参数
//! - 历史消息保留策略
//!
//! 加载顺序：默认值 -> `APP_CONFIG_FILE` 指定的文件 -> `APP_*` 环境变量（`__` 分隔层级）。

use std::time::Duration;

use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[serde(default)]
    #[validate(nested)]
    pub database: DatabaseConfig,
    #[serde(default)]
    #[validate(nested)]
    pub hub: HubConfig,
    #[serde(default)]
    #[validate(nested)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// 数据库配置；未配置 url 时使用内存存储
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    #[validate(url)]
    pub url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
    #[validate(range(min = 1))]
    pub connect_attempts: u32,
    pub connect_backoff_ms: u64,
}

/// 广播中心与单连接泵的参数
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_heartbeat"))]
pub struct HubConfig {
    /// 每个连接的出站队列容量，满了即驱逐该连接
    #[validate(range(min = 1))]
    pub queue_capacity: usize,
    /// 广播中心命令队列容量
    #[validate(range(min = 1))]
    pub command_capacity: usize,
    #[validate(range(min = 1))]
    pub ping_interval_secs: u64,
    #[validate(range(min = 1))]
    pub pong_wait_secs: u64,
    #[validate(range(min = 1))]
    pub write_wait_secs: u64,
    #[validate(range(min = 1))]
    pub max_message_bytes: usize,
}

/// 历史消息保留策略
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RetentionConfig {
    pub enabled: bool,
    #[validate(range(min = 1))]
    pub max_age_secs: u64,
    #[validate(range(min = 1))]
    pub sweep_interval_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    pub level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 8080,
            },
            database: DatabaseConfig::default(),
            hub: HubConfig::default(),
            retention: RetentionConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            connect_attempts: 5,
            connect_backoff_ms: 500,
        }
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            command_capacity: 1024,
            ping_interval_secs: 54,
            pong_wait_secs: 60,
            write_wait_secs: 10,
            max_message_bytes: 512 * 1024,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_age_secs: 24 * 60 * 60,
            sweep_interval_secs: 60,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl HubConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    pub fn pong_wait(&self) -> Duration {
        Duration::from_secs(self.pong_wait_secs)
    }

    pub fn write_wait(&self) -> Duration {
        Duration::from_secs(self.write_wait_secs)
    }
}

impl RetentionConfig {
    pub fn max_age(&self) -> Duration {
        Duration::from_secs(self.max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl DatabaseConfig {
    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }
}

// ping 必须早于读超时到期，否则健康连接也会被判定为失联
fn validate_heartbeat(hub: &HubConfig) -> Result<(), ValidationError> {
    if hub.ping_interval_secs >= hub.pong_wait_secs {
        return Err(ValidationError::new("ping_interval_must_be_shorter_than_pong_wait"));
    }
    Ok(())
}

impl AppConfig {
    /// 按 默认值 -> 可选文件 -> 环境变量 的优先级加载配置
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var("APP_CONFIG_FILE") {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig = fig.merge(Env::prefixed("APP_").split("__"));

        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 用于日志输出的脱敏表示
    pub fn sanitize(&self) -> String {
        let mut redacted = self.clone();
        if let Some(url) = redacted.database.url.as_mut() {
            if let Some(at) = url.rfind('@') {
                let scheme_end = url.find("://").map(|i| i + 3).unwrap_or(0);
                url.replace_range(scheme_end..at, "[REDACTED]");
            }
        }
        format!("{:?}", redacted)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}
