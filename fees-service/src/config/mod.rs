use std::env;
use std::fmt::Display;
use std::str::FromStr;

use dotenvy::dotenv;
use secrecy::Secret;
use serde::Deserialize;

use service_core::error::AppError;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub service_name: String,
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub processor: CardProcessorConfig,
    pub payments: PaymentsConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    Postgres,
}

#[derive(Deserialize, Clone, Debug)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    /// Required when the backend is postgres.
    pub database_url: Option<Secret<String>>,
    pub max_connections: u32,
    pub min_connections: u32,
}

#[derive(Deserialize, Clone, Debug)]
pub struct CardProcessorConfig {
    pub key_id: String,
    pub key_secret: Secret<String>,
    pub webhook_secret: Secret<String>,
    pub api_base_url: String,
    pub request_timeout_secs: u64,
}

#[derive(Deserialize, Clone, Debug)]
pub struct PaymentsConfig {
    pub currency: String,
    pub schedule_cache_ttl_secs: u64,
    pub aggregate_debounce_ms: u64,
    pub gateway_timeout_secs: u64,
    pub feed_capacity: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();

        let host = env_or("FEES_SERVICE_HOST", "0.0.0.0");
        let port = parse_env("FEES_SERVICE_PORT", 3007)?;

        let backend = match env_or("FEES_STORE_BACKEND", "memory").as_str() {
            "memory" => StoreBackend::Memory,
            "postgres" => StoreBackend::Postgres,
            other => {
                return Err(AppError::ConfigError(anyhow::anyhow!(
                    "FEES_STORE_BACKEND must be 'memory' or 'postgres', got '{}'",
                    other
                )))
            }
        };
        let database_url = env::var("FEES_DATABASE_URL").ok().map(Secret::new);
        if backend == StoreBackend::Postgres && database_url.is_none() {
            return Err(AppError::ConfigError(anyhow::anyhow!(
                "FEES_DATABASE_URL must be set when FEES_STORE_BACKEND is 'postgres'"
            )));
        }

        Ok(Self {
            service_name: "fees-service".to_string(),
            server: ServerConfig { host, port },
            store: StoreConfig {
                backend,
                database_url,
                max_connections: parse_env("FEES_DATABASE_MAX_CONNECTIONS", 10)?,
                min_connections: parse_env("FEES_DATABASE_MIN_CONNECTIONS", 1)?,
            },
            processor: CardProcessorConfig {
                key_id: env_or("CARD_PROCESSOR_KEY_ID", ""),
                key_secret: Secret::new(env_or("CARD_PROCESSOR_KEY_SECRET", "")),
                webhook_secret: Secret::new(env_or("CARD_PROCESSOR_WEBHOOK_SECRET", "dev-secret")),
                api_base_url: env_or("CARD_PROCESSOR_API_BASE_URL", "https://api.processor.test/v1"),
                request_timeout_secs: parse_env("CARD_PROCESSOR_TIMEOUT_SECS", 10)?,
            },
            payments: PaymentsConfig {
                currency: env_or("FEES_CURRENCY", "PHP"),
                schedule_cache_ttl_secs: parse_env("FEES_SCHEDULE_CACHE_TTL_SECS", 300)?,
                aggregate_debounce_ms: parse_env("FEES_AGGREGATE_DEBOUNCE_MS", 250)?,
                gateway_timeout_secs: parse_env("FEES_GATEWAY_TIMEOUT_SECS", 10)?,
                feed_capacity: parse_env("FEES_FEED_CAPACITY", 256)?,
            },
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| AppError::ConfigError(anyhow::anyhow!("invalid {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}
