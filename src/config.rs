use serde::{Deserialize, Serialize};
use std::fs;
use std::time::Duration;
use thiserror::Error;

use crate::messaging::{ConsumerConfig, StreamTopology};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config yaml: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("JWT secret is not configured")]
    MissingJwtSecret,

    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AppConfig {
    pub log_level: String,
    pub log_dir: String,
    pub log_file: String,
    pub use_json: bool,
    pub rotation: String,
    #[serde(default)]
    pub server: ServerConfig,
    /// PostgreSQL connection URL. Without it the ledger runs in memory.
    #[serde(default)]
    pub postgres_url: Option<String>,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub ledger: LedgerConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub algorithm: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: String::new(),
            algorithm: "HS256".to_string(),
        }
    }
}

/// Token distribution channel (Redis Streams)
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct BrokerConfig {
    pub enabled: bool,
    pub url: String,
    pub stream: String,
    pub group: String,
    pub consumer: String,
    pub dead_letter_stream: String,
    pub routing_key: String,
    pub batch_size: usize,
    pub block_ms: u64,
    pub startup_attempts: u32,
    pub initial_backoff_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "redis://127.0.0.1:6379".to_string(),
            stream: "auth_tokens_exchange".to_string(),
            group: "account_auth_queue".to_string(),
            consumer: "account-service".to_string(),
            dead_letter_stream: "account_auth_queue.dlq".to_string(),
            routing_key: "auth.token".to_string(),
            batch_size: 10,
            block_ms: 1000,
            startup_attempts: 5,
            initial_backoff_secs: 5,
            max_backoff_secs: 60,
        }
    }
}

impl BrokerConfig {
    pub fn topology(&self) -> StreamTopology {
        StreamTopology {
            stream: self.stream.clone(),
            group: self.group.clone(),
            consumer: self.consumer.clone(),
            dead_letter_stream: self.dead_letter_stream.clone(),
        }
    }

    pub fn consumer_config(&self) -> ConsumerConfig {
        ConsumerConfig {
            routing_key: self.routing_key.clone(),
            batch_size: self.batch_size.max(1),
            block: Duration::from_millis(self.block_ms),
            startup_attempts: self.startup_attempts,
            initial_backoff: Duration::from_secs(self.initial_backoff_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct LedgerConfig {
    /// Upper bound on one atomic unit
    pub op_timeout_ms: u64,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            op_timeout_ms: 10_000,
        }
    }
}

impl LedgerConfig {
    pub fn op_timeout(&self) -> Duration {
        Duration::from_millis(self.op_timeout_ms)
    }
}

impl AppConfig {
    /// Load `config/{env}.yaml` and apply environment overrides.
    pub fn load(env: &str) -> Result<Self, ConfigError> {
        let config_path = format!("config/{}.yaml", env);
        let content = fs::read_to_string(&config_path).map_err(|source| ConfigError::Read {
            path: config_path.clone(),
            source,
        })?;
        let mut config = Self::from_yaml(&content)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(content)?)
    }

    /// `DATABASE_URL`, `REDIS_URL` and `JWT_SECRET` win over the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.postgres_url = Some(url);
        }
        if let Some(url) = lookup("REDIS_URL").filter(|v| !v.is_empty()) {
            self.broker.url = url;
        }
        if let Some(secret) = lookup("JWT_SECRET").filter(|v| !v.is_empty()) {
            self.auth.jwt_secret = secret;
        }
    }
}
