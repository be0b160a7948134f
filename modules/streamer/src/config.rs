use std::env;
use std::time::Duration;

use crate::consumer::ConsumerConfig;

#[derive(Debug, Clone)]
pub enum BusType {
    Nats,
    InMemory,
}

impl BusType {
    pub fn from_env() -> Self {
        match env::var("BUS_TYPE")
            .unwrap_or_else(|_| "inmemory".to_string())
            .to_lowercase()
            .as_str()
        {
            "nats" => BusType::Nats,
            "inmemory" => BusType::InMemory,
            _ => {
                tracing::warn!("Unknown BUS_TYPE, defaulting to inmemory");
                BusType::InMemory
            }
        }
    }
}

#[derive(Debug, Clone)]
pub enum CacheType {
    Redis,
    Noop,
}

impl CacheType {
    pub fn from_env() -> Self {
        match env::var("CACHE_TYPE")
            .unwrap_or_else(|_| "noop".to_string())
            .to_lowercase()
            .as_str()
        {
            "redis" => CacheType::Redis,
            "noop" => CacheType::Noop,
            _ => {
                tracing::warn!("Unknown CACHE_TYPE, defaulting to noop");
                CacheType::Noop
            }
        }
    }
}

/// Consumer service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: BusType,
    pub cache_type: CacheType,
    pub database_url: String,
    pub nats_url: Option<String>,
    pub redis_url: Option<String>,
    pub consumer: ConsumerConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = BusType::from_env();
        let cache_type = CacheType::from_env();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let nats_url = match bus_type {
            BusType::Nats => Some(
                env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            ),
            BusType::InMemory => None,
        };

        let redis_url = match cache_type {
            CacheType::Redis => Some(
                env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            ),
            CacheType::Noop => None,
        };

        let batch_size: usize = parse_var("CONSUMER_BATCH_SIZE", "100")?;
        let linger_ms: u64 = parse_var("CONSUMER_BATCH_LINGER_MS", "250")?;

        Ok(Self {
            bus_type,
            cache_type,
            database_url,
            nats_url,
            redis_url,
            consumer: ConsumerConfig {
                batch_size,
                linger: Duration::from_millis(linger_ms),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: &str) -> Result<T, String> {
    env::var(name)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .map_err(|_| format!("{} must be a number", name))
}
