//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `CHATROOM_CONFIG_FILE` 指定的文件（TOML/YAML/JSON）
//! → `CHATROOM_` 前缀的环境变量（`__` 分隔嵌套字段，例如 `CHATROOM_SERVER__PORT`）。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CONFIG_FILE_ENV: &str = "CHATROOM_CONFIG_FILE";
pub const ENV_PREFIX: &str = "CHATROOM_";

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub storage: StorageConfig,
    #[validate(nested)]
    pub jwt: JwtConfig,
    #[validate(nested)]
    pub chat: ChatConfig,
    #[validate(nested)]
    pub security: SecurityConfig,
}

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

/// 存储配置。`memory` 后端不使用 `database_url`。
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub database_url: Option<String>,
    #[validate(range(min = 1))]
    pub max_connections: u32,
}

/// JWT配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct JwtConfig {
    #[validate(length(min = 32, message = "JWT secret must be at least 32 characters long"))]
    pub secret: String,
    #[validate(range(min = 1))]
    pub expiration_hours: i64,
}

/// 聊天核心参数
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ChatConfig {
    #[validate(range(min = 1, max = 500))]
    pub history_page_size: u32,
    #[validate(range(min = 1))]
    pub classifier_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub delivery_timeout_ms: u64,
    #[validate(range(min = 1))]
    pub outbound_buffer: usize,
    /// 情感词典文件（JSON，单词 → 分值），缺省使用内置词典
    #[serde(default)]
    pub lexicon_path: Option<String>,
}

impl ChatConfig {
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }

    pub fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct SecurityConfig {
    #[validate(range(min = 4, max = 31))]
    pub bcrypt_cost: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".into(),
                port: 4040,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                database_url: None,
                max_connections: 5,
            },
            jwt: JwtConfig {
                secret: "dev-secret-key-not-for-production-use-minimum-32-chars".into(),
                expiration_hours: 24,
            },
            chat: ChatConfig {
                history_page_size: 20,
                classifier_timeout_ms: 500,
                delivery_timeout_ms: 1000,
                outbound_buffer: 64,
                lexicon_path: None,
            },
            security: SecurityConfig { bcrypt_cost: 12 },
        }
    }
}

impl AppConfig {
    fn defaults() -> Figment {
        Figment::new().merge(Serialized::defaults(AppConfig::default()))
    }

    /// 默认值 → 可选配置文件 → 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        let mut fig = Self::defaults();
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig = fig.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 从 TOML/YAML/JSON 字符串解析，缺省字段取默认值
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim_start();
        let fig = if trimmed.starts_with('{') {
            Self::defaults().merge(Json::string(s))
        } else if trimmed.starts_with('[') || s.contains('=') {
            Self::defaults().merge(Toml::string(s))
        } else {
            Self::defaults().merge(Yaml::string(s))
        };
        let cfg: AppConfig = fig.extract().map_err(Box::new)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// 字段级校验之外的跨字段检查
    pub fn validate(&self) -> Result<(), ConfigError> {
        Validate::validate(self)?;
        if self.storage.backend == StorageBackend::Postgres
            && self
                .storage
                .database_url
                .as_deref()
                .map_or(true, |url| url.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "storage.database_url is required for the postgres backend".into(),
            ));
        }
        Ok(())
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 日志用的脱敏表示
    pub fn sanitize(&self) -> String {
        let mut copy = self.clone();
        copy.jwt.secret = "[REDACTED]".into();
        if copy.storage.database_url.is_some() {
            copy.storage.database_url = Some("postgres://[REDACTED]".into());
        }
        format!("{copy:?}")
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("invalid configuration: {0}")]
    Validation(#[from] validator::ValidationErrors),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
