use std::collections::BTreeMap;

use serde::Deserialize;

use chbridge_api::{QuerySettings, SettingValue};

use crate::error::EngineError;
use crate::insert::InsertOptions;

/// Native-protocol port of managed-cloud services (TLS only).
pub const SECURE_PORT: u16 = 9440;
pub const DEFAULT_PORT: u16 = 9000;

const CLOUD_HOST_SUFFIXES: [&str; 3] = [
    ".clickhouse.cloud",
    ".clickhouse-staging.com",
    ".clickhouse-dev.com",
];

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BridgeConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Per-query server settings, applied on top of the session defaults.
    #[serde(default)]
    pub settings: BTreeMap<String, SettingValue>,

    #[serde(default)]
    pub insert: InsertConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    /// Unset: picked from the host name, see [`ConnectionConfig::port`].
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
}

fn default_host() -> String {
    "localhost".into()
}

fn default_database() -> String {
    "default".into()
}

fn default_user() -> String {
    "default".into()
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: None,
            database: default_database(),
            user: default_user(),
            password: String::new(),
        }
    }
}

impl ConnectionConfig {
    pub fn is_cloud_host(&self) -> bool {
        CLOUD_HOST_SUFFIXES.iter().any(|s| self.host.ends_with(s))
    }

    /// Configured port, else the secure port for cloud hosts, else the default.
    pub fn port(&self) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.is_cloud_host() => SECURE_PORT,
            None => DEFAULT_PORT,
        }
    }

    /// TLS is used whenever the effective port is the secure one.
    pub fn secure(&self) -> bool {
        self.port() == SECURE_PORT
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InsertConfig {
    /// Flush automatically once this many rows are pending.
    #[serde(default)]
    pub max_block_rows: Option<usize>,
}

impl BridgeConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, EngineError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| EngineError::Config(format!("{path}: {e}")))?;
        Self::parse(&content).map_err(|e| e.with_context(path))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| EngineError::Config(e.to_string()))?;
        if config.insert.max_block_rows == Some(0) {
            return Err(EngineError::Config("insert.max_block_rows must be positive".into()));
        }
        Ok(config)
    }

    /// Session defaults with the `[settings]` table applied.
    pub fn query_settings(&self) -> QuerySettings {
        let mut settings = QuerySettings::default();
        settings.merge(self.settings.clone());
        settings
    }

    pub fn insert_options(&self) -> InsertOptions {
        InsertOptions {
            max_block_rows: self.insert.max_block_rows,
        }
    }
}
