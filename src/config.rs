use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;
use tracing::info;
use validator::Validate;

const DEFAULT_LOG_LEVEL: &str = "info";
const DEFAULT_ENV: &str = "development";
const DEFAULT_PORT: u16 = 8080;
const CONFIG_DIR: &str = "config";

/// Application configuration with validation.
///
/// Loaded from `config/default.toml`, an optional per-environment file and
/// `FARMDIRECT_*` environment variables, in that order of precedence.
#[derive(Clone, Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Database connection URL
    pub database_url: String,

    /// Server host address
    #[serde(default = "default_host")]
    pub host: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Application environment
    #[serde(default = "default_environment")]
    pub environment: String,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log in JSON format (structured logging)
    #[serde(default)]
    pub log_json: bool,

    /// JWT signing secret
    #[validate(length(min = 32))]
    pub jwt_secret: String,

    /// JWT expiration in seconds
    #[serde(default = "default_jwt_expiration")]
    pub jwt_expiration_secs: u64,

    /// Flat delivery fee added to every non-empty cart
    #[serde(default = "default_delivery_fee")]
    pub delivery_fee: Decimal,

    /// Payment gateway base URL
    #[serde(default = "default_gateway_base_url")]
    pub gateway_base_url: String,

    /// Shared secret for gateway requests and webhook signatures
    #[serde(default)]
    pub gateway_secret: String,

    /// Per-request timeout towards the gateway, in seconds
    #[serde(default = "default_gateway_timeout")]
    pub gateway_request_timeout_secs: u64,

    /// Bounded retries for gateway initiation calls
    #[serde(default = "default_gateway_max_retries")]
    pub gateway_max_retries: u32,

    /// Initial backoff between gateway retries, in milliseconds (doubles
    /// per retry)
    #[serde(default = "default_retry_backoff_ms")]
    pub gateway_retry_backoff_ms: u64,

    /// Deadline for payment verification, measured from the moment an
    /// attempt is initiated. Past it the attempt expires and the order
    /// fails.
    #[serde(default = "default_verification_timeout")]
    pub payment_verification_timeout_secs: i64,

    /// Initial backoff between verification polls, in milliseconds
    #[serde(default = "default_retry_backoff_ms")]
    pub payment_verify_backoff_ms: u64,

    /// Whether to run database migrations on startup
    #[serde(default)]
    pub auto_migrate: bool,

    /// Maximum number of database connections
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,

    /// Minimum number of database connections
    #[serde(default = "default_db_min_connections")]
    pub db_min_connections: u32,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_environment() -> String {
    DEFAULT_ENV.to_string()
}
fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}
fn default_jwt_expiration() -> u64 {
    3600
}
fn default_delivery_fee() -> Decimal {
    Decimal::from(200)
}
fn default_gateway_base_url() -> String {
    "http://localhost:9090".to_string()
}
fn default_gateway_timeout() -> u64 {
    10
}
fn default_gateway_max_retries() -> u32 {
    3
}
fn default_retry_backoff_ms() -> u64 {
    200
}
fn default_verification_timeout() -> i64 {
    300
}
fn default_db_max_connections() -> u32 {
    10
}
fn default_db_min_connections() -> u32 {
    1
}

impl AppConfig {
    /// Programmatic constructor used by tests and tooling.
    pub fn new(database_url: String, jwt_secret: String, host: String, port: u16) -> Self {
        Self {
            database_url,
            host,
            port,
            environment: "test".to_string(),
            log_level: default_log_level(),
            log_json: false,
            jwt_secret,
            jwt_expiration_secs: default_jwt_expiration(),
            delivery_fee: default_delivery_fee(),
            gateway_base_url: default_gateway_base_url(),
            gateway_secret: "test_gateway_secret".to_string(),
            gateway_request_timeout_secs: default_gateway_timeout(),
            gateway_max_retries: default_gateway_max_retries(),
            gateway_retry_backoff_ms: 10,
            payment_verification_timeout_secs: default_verification_timeout(),
            payment_verify_backoff_ms: 10,
            auto_migrate: true,
            db_max_connections: 1,
            db_min_connections: 1,
        }
    }

    pub fn verification_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.payment_verification_timeout_secs)
    }

    pub fn verify_backoff(&self) -> Duration {
        Duration::from_millis(self.payment_verify_backoff_ms)
    }

    pub fn gateway_retry_backoff(&self) -> Duration {
        Duration::from_millis(self.gateway_retry_backoff_ms)
    }

    pub fn gateway_request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_request_timeout_secs)
    }
}

/// Load and validate the application configuration.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    let environment = env::var("FARMDIRECT_ENV").unwrap_or_else(|_| DEFAULT_ENV.to_string());

    let cfg: AppConfig = Config::builder()
        .add_source(File::with_name(&format!("{CONFIG_DIR}/default")).required(false))
        .add_source(File::with_name(&format!("{CONFIG_DIR}/{environment}")).required(false))
        .add_source(Environment::with_prefix("FARMDIRECT").separator("__"))
        .build()?
        .try_deserialize()?;

    cfg.validate()
        .map_err(|e| ConfigError::Message(format!("invalid configuration: {e}")))?;

    info!(environment = %cfg.environment, "configuration loaded");
    Ok(cfg)
}

/// Initialise the tracing subscriber from the configured level and format.
pub fn init_tracing(log_level: &str, json: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn test_config() -> AppConfig {
        AppConfig::new(
            "sqlite::memory:".to_string(),
            "a_test_secret_that_is_long_enough_to_pass".to_string(),
            "127.0.0.1".to_string(),
            0,
        )
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = test_config();
        assert_eq!(cfg.delivery_fee, dec!(200));
        assert_eq!(cfg.payment_verification_timeout_secs, 300);
        assert!(cfg.gateway_max_retries >= 1);
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let mut cfg = test_config();
        cfg.jwt_secret = "short".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duration_helpers() {
        let cfg = test_config();
        assert_eq!(cfg.verification_timeout(), chrono::Duration::seconds(300));
        assert_eq!(cfg.verify_backoff(), Duration::from_millis(10));
    }
}
