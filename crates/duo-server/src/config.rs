use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};

use duo_gateway::GatewayConfig;
use duo_gateway::store::RetryPolicy;

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub gateway: GatewayConfig,
}

impl ServerConfig {
    /// Read `DUO_*` variables from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Unset variables fall back to defaults; set but malformed numbers are errors.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = GatewayConfig::default();

        let gateway = GatewayConfig {
            outbox_capacity: parse_or(&lookup, "DUO_OUTBOX_CAPACITY", defaults.outbox_capacity)?,
            heartbeat_interval: Duration::from_secs(parse_or(
                &lookup,
                "DUO_HEARTBEAT_SECS",
                defaults.heartbeat_interval.as_secs(),
            )?),
            retry: RetryPolicy {
                max_attempts: parse_or(&lookup, "DUO_STORE_RETRY_ATTEMPTS", defaults.retry.max_attempts)?,
                base_delay: Duration::from_millis(parse_or(
                    &lookup,
                    "DUO_STORE_RETRY_BASE_MS",
                    defaults.retry.base_delay.as_millis() as u64,
                )?),
            },
            welcome_message: lookup("DUO_WELCOME_MESSAGE").unwrap_or(defaults.welcome_message),
        };

        if gateway.heartbeat_interval.is_zero() {
            anyhow::bail!("DUO_HEARTBEAT_SECS must be at least 1");
        }

        Ok(Self {
            host: lookup("DUO_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "DUO_PORT", 3000)?,
            db_path: PathBuf::from(lookup("DUO_DB_PATH").unwrap_or_else(|| "duo.db".into())),
            gateway,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = from(&[]).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.db_path, PathBuf::from("duo.db"));
        assert_eq!(config.gateway.outbox_capacity, 256);
        assert_eq!(config.gateway.heartbeat_interval, Duration::from_secs(15));
        assert_eq!(config.gateway.retry.max_attempts, 3);
        assert_eq!(config.gateway.retry.base_delay, Duration::from_millis(25));
        assert_eq!(config.gateway.welcome_message, "Connected to Duo chat server");
    }

    #[test]
    fn overrides_are_applied() {
        let config = from(&[
            ("DUO_PORT", "8080"),
            ("DUO_OUTBOX_CAPACITY", "16"),
            ("DUO_STORE_RETRY_ATTEMPTS", "5"),
            ("DUO_WELCOME_MESSAGE", "hi"),
        ])
        .unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.gateway.outbox_capacity, 16);
        assert_eq!(config.gateway.retry.max_attempts, 5);
        assert_eq!(config.gateway.welcome_message, "hi");
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = from(&[("DUO_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("DUO_PORT"));
        assert!(from(&[("DUO_HEARTBEAT_SECS", "0")]).is_err());
        assert!(from(&[("DUO_OUTBOX_CAPACITY", "-1")]).is_err());
    }
}
