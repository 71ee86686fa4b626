//! Server configuration from environment variables.

use std::net::SocketAddr;
use std::str::FromStr;
use thiserror::Error;
use tictac_core::ArenaConfig;

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// `SERVER_ADDR`
    pub addr: SocketAddr,
    /// `SHARD_COUNT` and `OBSERVER_BUFFER`
    pub arena: ArenaConfig,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = ArenaConfig::default();
        let addr = lookup("SERVER_ADDR").unwrap_or_else(|| DEFAULT_ADDR.to_string());

        Ok(Self {
            addr: parse_value("SERVER_ADDR", addr)?,
            arena: ArenaConfig {
                shard_count: parse_var(&lookup, "SHARD_COUNT")?.unwrap_or(defaults.shard_count),
                observer_buffer: parse_var(&lookup, "OBSERVER_BUFFER")?
                    .unwrap_or(defaults.observer_buffer),
            },
        })
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    lookup(key).map(|value| parse_value(key, value)).transpose()
}

fn parse_value<T: FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid {
            key,
            value: value.clone(),
        })
}
