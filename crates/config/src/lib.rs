//! crewdesk-config - 配置加载库

use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use secrecy::Secret;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;


#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] figment::Error),
}

/// 服务器配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

/// 会话令牌配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    pub secret: Secret<String>,
    #[serde(default = "default_expires_in")]
    pub expires_in: i64,
    #[serde(default = "default_issuer")]
    pub issuer: String,
    #[serde(default = "default_audience")]
    pub audience: String,
}

fn default_expires_in() -> i64 {
    3600
}

fn default_issuer() -> String {
    "crewdesk".to_string()
}

fn default_audience() -> String {
    "crewdesk-web".to_string()
}

/// 遥测配置
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

/// 策略存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct PolicyConfig {
    /// 策略文档路径
    #[serde(default = "default_policy_path")]
    pub path: String,
    /// 启动加载的最大尝试次数，耗尽后视为策略不可用
    #[serde(default = "default_load_attempts")]
    pub load_attempts: u32,
}

fn default_policy_path() -> String {
    "policy.json".to_string()
}

fn default_load_attempts() -> u32 {
    3
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            path: default_policy_path(),
            load_attempts: default_load_attempts(),
        }
    }
}

/// 用户目录条目（登录校验用）
#[derive(Debug, Clone, Deserialize)]
pub struct AuthUserConfig {
    pub id: Uuid,
    pub email: String,
    /// argon2 PHC 格式哈希
    pub password_hash: Secret<String>,
    /// 服务端指定的角色，客户端永远不能自选
    pub role: String,
}

/// 认证配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub users: Vec<AuthUserConfig>,
}

/// 应用配置
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_app_name")]
    pub app_name: String,
    #[serde(default = "default_app_env")]
    pub app_env: String,
    pub server: ServerConfig,
    pub session: SessionConfig,
    #[serde(default)]
    pub telemetry: Option<TelemetryConfig>,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub auth: AuthConfig,
}

fn default_app_name() -> String {
    "crewdesk".to_string()
}

fn default_app_env() -> String {
    "development".to_string()
}

impl AppConfig {
    /// 从 TOML 文件和 CREWDESK_ 前缀的环境变量加载配置
    ///
    /// 环境变量覆盖文件值，嵌套键用双下划线分隔
    /// （如 CREWDESK_SESSION__SECRET）。
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let config = Figment::new()
            .merge(Toml::file(path))
            .merge(Env::prefixed("CREWDESK_").split("__"))
            .extract()?;
        Ok(config)
    }

    pub fn is_production(&self) -> bool {
        self.app_env == "production"
    }

    pub fn log_level(&self) -> &str {
        self.telemetry
            .as_ref()
            .map(|t| t.log_level.as_str())
            .unwrap_or("info")
    }
}
