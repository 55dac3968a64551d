//! Shared configuration types and helpers for integration tests.

use anyhow::{Result, anyhow};
use jubako::{JubakoResult, Schema};
use serde::Deserialize;

#[derive(Debug, Default, Deserialize, PartialEq, Eq, Schema)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    #[default]
    Info,
    Warn,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Schema)]
pub struct Server {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, PartialEq, Eq, Schema)]
pub struct Database {
    #[serde(default)]
    #[jubako(env = "DATABASE_URL")]
    pub url: String,
    #[serde(default)]
    #[jubako(sensitive, env = "DATABASE_PASSWORD")]
    pub password: String,
}

#[derive(Debug, Deserialize, PartialEq, Eq, Schema)]
pub struct AppConfig {
    pub server: Server,
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub log_level: Level,
}

/// Convert a shared jubako error into `anyhow` for `?` in tests.
pub fn to_anyhow<T>(result: JubakoResult<T>) -> Result<T> {
    result.map_err(|err| anyhow!(err.to_string()))
}
