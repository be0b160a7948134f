use std::env;
use std::time::Duration;

use crate::events::RelayConfig;

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

/// Relay service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub bus_type: BusType,
    pub database_url: String,
    pub nats_url: Option<String>,
    pub relay: RelayConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let bus_type = BusType::from_env();
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        let nats_url = match bus_type {
            BusType::Nats => Some(
                env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string()),
            ),
            BusType::InMemory => None,
        };

        let batch_size: i64 = parse_var("RELAY_BATCH_SIZE", "100")?;
        let max_retries: i32 = parse_var("RELAY_MAX_RETRIES", "5")?;
        let pending_secs: u64 = parse_var("RELAY_PENDING_INTERVAL_SECS", "5")?;
        let failed_secs: u64 = parse_var("RELAY_FAILED_INTERVAL_SECS", "60")?;

        Ok(Self {
            bus_type,
            database_url,
            nats_url,
            relay: RelayConfig {
                batch_size,
                max_retries,
                pending_interval: Duration::from_secs(pending_secs),
                failed_retry_interval: Duration::from_secs(failed_secs),
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
