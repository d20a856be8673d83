//! Server configuration read from the environment

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value}")]
    InvalidValue { name: &'static str, value: String },
}

/// Which task table backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageKind {
    Sqlite,
    File,
    Memory,
}

impl FromStr for StorageKind {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Self::Sqlite),
            "file" | "json" => Ok(Self::File),
            "memory" => Ok(Self::Memory),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub data_dir: PathBuf,
    pub storage: StorageKind,
    pub host: IpAddr,
    pub port: u16,
    pub seed: bool,
    pub cors_any: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tb-data"),
            storage: StorageKind::Sqlite,
            host: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 8081,
            seed: true,
            cors_any: true,
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
    parse: impl Fn(&str) -> Option<T>,
) -> Result<T, ConfigError> {
    match lookup(name) {
        Some(value) if !value.trim().is_empty() => {
            parse(&value).ok_or(ConfigError::InvalidValue { name, value })
        }
        _ => Ok(default),
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from any variable source; unset or blank variables
    /// keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            data_dir: lookup("TB_DATA_DIR")
                .filter(|dir| !dir.trim().is_empty())
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            storage: parse_var(&lookup, "TB_STORAGE", defaults.storage, |raw| raw.parse().ok())?,
            host: parse_var(&lookup, "TB_HOST", defaults.host, |raw| raw.trim().parse().ok())?,
            port: parse_var(&lookup, "TB_PORT", defaults.port, |raw| raw.trim().parse().ok())?,
            seed: parse_var(&lookup, "TB_SEED", defaults.seed, parse_flag)?,
            cors_any: parse_var(&lookup, "TB_CORS_ANY", defaults.cors_any, parse_flag)?,
        })
    }

    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }
}
