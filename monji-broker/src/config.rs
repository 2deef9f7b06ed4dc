use std::fmt;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use zeroize::Zeroizing;

pub const ENV_CONFIG_PATH: &str = "MONJI_CONFIG";
pub const ENV_BIND_ADDRESS: &str = "MONJI__BIND_ADDRESS";
pub const ENV_DATABASE_URL: &str = "MONJI_DATABASE_URL";
pub const ENV_ENCRYPTION_KEY: &str = "MONJI_ENCRYPTION_KEY";
pub const ENV_JWT_SECRET: &str = "MONJI_JWT_SECRET";
pub const ENV_RESOURCE_TIMEOUT: &str = "MONJI_RESOURCE_TIMEOUT_SECS";

pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";
pub const DEFAULT_DATABASE_URL: &str = "sqlite://monji.db?mode=rwc";
pub const DEFAULT_RESOURCE_TIMEOUT_SECS: u64 = 10;

/// `database_url` value that selects the in-process store.
pub const MEMORY_DATABASE: &str = "memory";

/// Fully resolved broker settings.
#[derive(Clone)]
pub struct BrokerConfig {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub encryption_key: Zeroizing<String>,
    pub jwt_secret: Zeroizing<String>,
    pub resource_timeout: Duration,
}

impl fmt::Debug for BrokerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BrokerConfig")
            .field("bind_address", &self.bind_address)
            .field("database_url", &self.database_url)
            .field("encryption_key", &"<redacted>")
            .field("jwt_secret", &"<redacted>")
            .field("resource_timeout", &self.resource_timeout)
            .finish()
    }
}

/// Values supplied on the command line; they win over every other layer.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub bind_address: Option<String>,
    pub database_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    bind_address: Option<String>,
    database_url: Option<String>,
    encryption_key: Option<String>,
    jwt_secret: Option<String>,
    resource_timeout_secs: Option<u64>,
}

impl FileConfig {
    fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => serde_json::from_str(&raw)
                .with_context(|| format!("invalid json in {}", path.display())),
            _ => toml::from_str(&raw).with_context(|| format!("invalid toml in {}", path.display())),
        }
    }
}

impl BrokerConfig {
    /// Resolve from the process environment: defaults, then the config
    /// file, then environment variables, then CLI flags.
    pub fn resolve(overrides: &CliOverrides) -> Result<Self> {
        Self::resolve_with(overrides, |key| std::env::var(key).ok())
    }

    pub fn resolve_with<F>(overrides: &CliOverrides, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = |key: &str| env(key).filter(|value| !value.trim().is_empty());

        let config_path = overrides
            .config_path
            .clone()
            .or_else(|| env(ENV_CONFIG_PATH).map(PathBuf::from));
        let file = match &config_path {
            Some(path) => FileConfig::load(path)?,
            None => FileConfig::default(),
        };

        let bind = overrides
            .bind_address
            .clone()
            .or_else(|| env(ENV_BIND_ADDRESS))
            .or(file.bind_address)
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.into());
        let bind_address = bind
            .parse()
            .with_context(|| format!("invalid bind address `{bind}`"))?;

        let database_url = overrides
            .database_url
            .clone()
            .or_else(|| env(ENV_DATABASE_URL))
            .or(file.database_url)
            .unwrap_or_else(|| DEFAULT_DATABASE_URL.into());

        let encryption_key = env(ENV_ENCRYPTION_KEY)
            .or(file.encryption_key)
            .map(Zeroizing::new)
            .ok_or_else(|| anyhow!("{ENV_ENCRYPTION_KEY} is required"))?;
        let jwt_secret = env(ENV_JWT_SECRET)
            .or(file.jwt_secret)
            .map(Zeroizing::new)
            .ok_or_else(|| anyhow!("{ENV_JWT_SECRET} is required"))?;

        let timeout_secs = match env(ENV_RESOURCE_TIMEOUT) {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{ENV_RESOURCE_TIMEOUT} must be whole seconds"))?,
            None => file
                .resource_timeout_secs
                .unwrap_or(DEFAULT_RESOURCE_TIMEOUT_SECS),
        };
        if timeout_secs == 0 {
            bail!("resource timeout must be at least one second");
        }

        Ok(Self {
            bind_address,
            database_url,
            encryption_key,
            jwt_secret,
            resource_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn uses_memory_store(&self) -> bool {
        self.database_url == MEMORY_DATABASE
    }
}
